use std::path::Path;

use rayon::prelude::*;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    document::{DocumentMeta, Match, StoreStats},
    error::{Error, Result},
};

const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");
const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

const DIMENSION_KEY: &str = "dimension";

/// Header size: 4 bytes for the vector dimension.
const HEADER_SIZE: usize = 4;

/// Vector index over document records, keyed by string id.
///
/// Binary format per entry:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE embedding values
/// - remainder: metadata JSON
///
/// The dimension is pinned by the first upsert; later upserts and queries
/// with a different vector length fail with `DimensionMismatch`.
pub struct KnowledgeStore {
    db: Database,
}

/// The store half of the retrieval pipeline: upsert-by-id plus top-k cosine
/// query. Split out as a trait so the engine can run against stubs in tests.
pub trait VectorStore {
    /// Insert or overwrite the record under `id`. Atomic per call.
    fn upsert(&self, id: &str, vector: &[f32], meta: &DocumentMeta)
    -> Result<()>;

    /// Return up to `k` matches ordered by descending cosine similarity.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Match>>;

    fn stats(&self) -> Result<StoreStats>;
}

impl<S: VectorStore + ?Sized> VectorStore for Box<S> {
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        meta: &DocumentMeta,
    ) -> Result<()> {
        (**self).upsert(id, vector, meta)
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Match>> {
        (**self).query(vector, k)
    }

    fn stats(&self) -> Result<StoreStats> {
        (**self).stats()
    }
}

impl KnowledgeStore {
    /// Open or create a knowledge store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    fn dimension(&self) -> Result<Option<usize>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(DIMENSION_KEY)?.map(|v| v.value() as usize))
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if let Some(expected) = self.dimension()?
            && expected != actual
        {
            return Err(Error::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    fn decode(id: &str, bytes: &[u8]) -> Option<(Vec<f32>, DocumentMeta)> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let dimension =
            u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
        let vector_end = HEADER_SIZE + dimension * 4;
        if bytes.len() < vector_end {
            return None;
        }

        let vector: Vec<f32> =
            bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..vector_end]);
        let meta: DocumentMeta =
            match serde_json::from_slice(&bytes[vector_end..]) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping undecodable record");
                    return None;
                }
            };

        Some((vector, meta))
    }
}

impl VectorStore for KnowledgeStore {
    fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        meta: &DocumentMeta,
    ) -> Result<()> {
        self.check_dimension(vector.len())?;

        let meta_bytes = serde_json::to_vec(meta)?;
        let mut bytes =
            Vec::with_capacity(HEADER_SIZE + vector.len() * 4 + meta_bytes.len());
        bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(vector));
        bytes.extend_from_slice(&meta_bytes);

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.insert(id, bytes.as_slice())?;

            let mut meta_table = txn.open_table(META)?;
            meta_table.insert(DIMENSION_KEY, vector.len() as u32)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Match>> {
        self.check_dimension(vector.len())?;

        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;

        let mut records: Vec<(String, Vec<u8>)> = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            records.push((key.value().to_string(), value.value().to_vec()));
        }

        let mut matches: Vec<Match> = records
            .par_iter()
            .filter_map(|(id, bytes)| {
                let (stored, meta) = Self::decode(id, bytes)?;
                Some(Match {
                    id: id.clone(),
                    score: cosine_similarity(vector, &stored),
                    meta,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }

    fn stats(&self) -> Result<StoreStats> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let count = table.len()? as usize;
        drop(table);

        let meta_table = txn.open_table(META)?;
        let dimension =
            meta_table.get(DIMENSION_KEY)?.map(|v| v.value() as usize);

        Ok(StoreStats { count, dimension })
    }
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore").finish_non_exhaustive()
    }
}

/// Cosine similarity between two vectors, in [-1, 1].
///
/// Mismatched lengths and zero vectors score 0 rather than erroring; the
/// store checks dimensions before this runs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
