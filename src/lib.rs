//! campusq - a retrieval-based Q&A assistant for campus announcements.
//!
//! campusq stores institutional announcements as dense sentence embeddings
//! and answers free-text questions by extractive synthesis: the closest
//! stored excerpts above a similarity threshold are concatenated verbatim,
//! never paraphrased by a generative model. Admins ingest announcements and
//! manage accounts; everyone else asks questions.
//!
//! # Quick start
//!
//! ```no_run
//! use campusq::{DataDir, Engine, KnowledgeStore, SentenceEncoder};
//! use campusq::encoder::DEFAULT_MODEL_ID;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let encoder = SentenceEncoder::load(DEFAULT_MODEL_ID).unwrap();
//! let store = KnowledgeStore::open(&data_dir.knowledge_db()).unwrap();
//!
//! let mut engine = Engine::new(encoder, store);
//! println!("{}", engine.answer("When do midterms start?").unwrap());
//! ```

pub mod accounts;
pub mod cli;
pub mod data_dir;
pub mod document;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod store;

pub use accounts::{AccountsDb, Role, User};
pub use data_dir::DataDir;
pub use document::{Category, DocumentMeta, Match, StoreStats};
pub use encoder::{SentenceEncoder, TextEncoder};
pub use engine::{Engine, IngestRequest, RetrievalPolicy, LEAD_IN, REFUSAL};
pub use error::{Error, Result};
pub use store::{KnowledgeStore, VectorStore};
