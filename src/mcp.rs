use std::sync::{Arc, Mutex};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    encoder::TextEncoder,
    engine::{Engine, IngestRequest, REFUSAL},
    error,
    store::VectorStore,
};

/// Type-erased engine so the server can run against the production model in
/// `main` and against stubs in tests.
pub type DynEngine =
    Engine<Box<dyn TextEncoder + Send>, Box<dyn VectorStore + Send>>;

struct CampusqState {
    engine: Mutex<DynEngine>,
}

#[derive(Clone)]
pub struct CampusqMcpServer {
    state: Arc<CampusqState>,
    tool_router: ToolRouter<Self>,
}

impl CampusqMcpServer {
    pub fn new(engine: DynEngine) -> Self {
        Self {
            state: Arc::new(CampusqState {
                engine: Mutex::new(engine),
            }),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl CampusqMcpServer {
    /// Answer a question from the stored campus announcements.
    #[tool(
        name = "campus_ask",
        description = "Answer a question from stored campus announcements. Returns verbatim excerpts of the closest matches, or a refusal when nothing relevant is stored."
    )]
    pub async fn campus_ask(
        &self,
        params: Parameters<AskParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let query = params.0.query;

        let mut engine = self.state.engine.lock().map_err(|_| {
            rmcp::ErrorData::internal_error("engine lock poisoned", None)
        })?;
        let answer = engine
            .answer(&query)
            .map_err(|e| mcp_error("answer failed", e))?;

        let refused = answer == REFUSAL;
        let structured = json!({
            "query": query,
            "answer": answer,
            "refused": refused,
        });

        let mut result = CallToolResult::success(vec![Content::text(answer)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Add one announcement to the knowledge base.
    #[tool(
        name = "campus_ingest",
        description = "Add an announcement to the knowledge base. Category must be one of: Placements, Events, Academics, Exams, Clubs, Announcements, Other."
    )]
    pub async fn campus_ingest(
        &self,
        params: Parameters<IngestParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let category = params
            .category
            .parse()
            .map_err(|e| mcp_error("invalid category", e))?;

        let request = IngestRequest {
            content: params.content,
            category,
            title: params.title.unwrap_or_default(),
            department: params.department,
            date: params.date,
        };

        let mut engine = self.state.engine.lock().map_err(|_| {
            rmcp::ErrorData::internal_error("engine lock poisoned", None)
        })?;
        let success = engine.ingest(&request);

        let summary = if success {
            format!("Ingested '{}' into {}", request.title, request.category)
        } else {
            "Ingest failed; see server logs".to_string()
        };

        let mut result = if success {
            CallToolResult::success(vec![Content::text(summary)])
        } else {
            CallToolResult::error(vec![Content::text(summary)])
        };
        result.structured_content = Some(json!({ "success": success }));
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for CampusqMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = Implementation::new(
            "campusq",
            env!("CARGO_PKG_VERSION"),
        )
        .with_title("campusq MCP");
        info.instructions = Some(
            "Use campus_ask to answer questions about campus announcements. Use campus_ingest to add new announcements."
                .to_string(),
        );
        info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AskParams {
    /// The question to answer.
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestParams {
    /// Announcement body text.
    pub content: String,
    /// One of: Placements, Events, Academics, Exams, Clubs, Announcements,
    /// Other.
    pub category: String,
    /// Short label shown alongside the content in answers.
    pub title: Option<String>,
    /// Department the announcement applies to.
    pub department: Option<String>,
    /// Date the announcement refers to.
    pub date: Option<String>,
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(engine: DynEngine) -> error::Result<()> {
    let server = CampusqMcpServer::new(engine);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Result, store::KnowledgeStore};

    /// Deterministic keyword encoder: each axis lights up when its keyword
    /// appears in the text.
    struct KeywordEncoder;

    impl TextEncoder for KeywordEncoder {
        fn encode(&mut self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            let axes = ["midterm", "placement", "club"];
            let mut v: Vec<f32> = axes
                .iter()
                .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
                .collect();
            if v.iter().all(|x| *x == 0.0) {
                v[2] = 1.0;
            }
            Ok(v)
        }
    }

    fn test_server() -> (tempfile::TempDir, CampusqMcpServer) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            KnowledgeStore::open(&tmp.path().join("knowledge.redb")).unwrap();
        let engine: DynEngine =
            Engine::new(Box::new(KeywordEncoder), Box::new(store));
        (tmp, CampusqMcpServer::new(engine))
    }

    #[tokio::test]
    async fn ingest_then_ask_round_trip() {
        let (_tmp, server) = test_server();

        let ingest = server
            .campus_ingest(Parameters(IngestParams {
                content: "Midterms start March 3rd.".into(),
                category: "Exams".into(),
                title: Some("Midterm Schedule".into()),
                department: None,
                date: None,
            }))
            .await
            .unwrap();
        assert_eq!(ingest.is_error, Some(false));

        let ask = server
            .campus_ask(Parameters(AskParams {
                query: "When do midterms start?".into(),
            }))
            .await
            .unwrap();

        let structured = ask.structured_content.expect("structured");
        assert_eq!(
            structured.get("refused").and_then(|v| v.as_bool()),
            Some(false)
        );
        let answer = structured
            .get("answer")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        assert!(answer.contains("Midterm Schedule"));
        assert!(answer.contains("Midterms start March 3rd."));
    }

    #[tokio::test]
    async fn ask_refuses_on_empty_store() {
        let (_tmp, server) = test_server();

        let ask = server
            .campus_ask(Parameters(AskParams {
                query: "When do midterms start?".into(),
            }))
            .await
            .unwrap();

        let structured = ask.structured_content.expect("structured");
        assert_eq!(
            structured.get("refused").and_then(|v| v.as_bool()),
            Some(true)
        );
        assert_eq!(
            structured.get("answer").and_then(|v| v.as_str()),
            Some(REFUSAL)
        );
    }

    #[tokio::test]
    async fn ingest_rejects_unknown_category() {
        let (_tmp, server) = test_server();

        let result = server
            .campus_ingest(Parameters(IngestParams {
                content: "body".into(),
                category: "Sports".into(),
                title: None,
                department: None,
                date: None,
            }))
            .await;
        assert!(result.is_err());
    }
}
