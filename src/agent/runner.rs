//! Orchestrator with a bounded tool-calling loop.

use super::{ToolDeclaration, ToolRegistry, MAX_TOOL_ROUNDS};
use crate::error::{LecternError, Result};
use crate::model::{ModelClient, ModelRequest, ModelResponse, ToolResult, Turn};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Drives the request/execute/respond loop for one query at a time.
///
/// Holds no per-query state, so one instance can serve concurrent queries.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    system_prompt: String,
    max_rounds: usize,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ModelClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            max_rounds: MAX_TOOL_ROUNDS,
        }
    }

    /// Set the number of tool rounds before the forced text-only invocation.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Answer `query`, letting the model call tools from `registry`.
    ///
    /// Tool failures are folded into the conversation; only model errors are
    /// returned. An exhausted round budget yields whatever text the final
    /// invocation produced, possibly an empty string.
    #[instrument(skip_all, fields(query_len = query.len(), tools = declarations.len()))]
    pub async fn run(
        &self,
        query: &str,
        prior_context: Option<&str>,
        declarations: &[ToolDeclaration],
        registry: Option<&ToolRegistry>,
    ) -> Result<String> {
        let system = match prior_context {
            Some(context) => format!(
                "{}\n\nPrevious conversation:\n{}",
                self.system_prompt, context
            ),
            None => self.system_prompt.clone(),
        };

        let mut turns = vec![Turn::user(query)];
        let mut response = self
            .model
            .invoke(ModelRequest::new(&system, &turns, declarations))
            .await?;

        let Some(registry) = registry else {
            return Ok(response.extract_text());
        };

        let mut rounds = 0;
        loop {
            if !response.requests_tools() {
                debug!("Model answered after {} tool rounds", rounds);
                return Ok(response.extract_text());
            }

            let results = execute_invocations(&response, registry).await;
            if results.is_empty() {
                warn!("No tool produced a result; returning model text as is");
                return Ok(response.extract_text());
            }

            turns.push(Turn::Assistant {
                blocks: response.content,
            });
            turns.push(Turn::ToolResults { results });
            rounds += 1;
            debug!("Completed tool round {}/{}", rounds, self.max_rounds);

            if rounds >= self.max_rounds {
                let last = self
                    .model
                    .invoke(ModelRequest::new(&system, &turns, &[]))
                    .await?;
                if last.requests_tools() {
                    warn!("Tool round limit reached and model still requested tools");
                }
                return Ok(last.extract_text());
            }

            response = self
                .model
                .invoke(ModelRequest::new(&system, &turns, declarations))
                .await?;
        }
    }
}

/// Run every requested invocation in order.
///
/// Unknown tools and malformed requests produce no result.
async fn execute_invocations(response: &ModelResponse, registry: &ToolRegistry) -> Vec<ToolResult> {
    let mut results = Vec::new();

    for invocation in response.tool_invocations() {
        let Some(input) = invocation.input.as_object().filter(|_| invocation.is_well_formed()) else {
            warn!("Skipping malformed tool request {:?}", invocation.name);
            continue;
        };

        info!("Calling tool {} ({})", invocation.name, invocation.input);
        match registry.execute(&invocation.name, input).await {
            Ok(content) => results.push(ToolResult::success(&invocation.id, content)),
            Err(LecternError::ToolNotFound(name)) => {
                warn!("Skipping request for unregistered tool {}", name);
            }
            Err(e) => {
                warn!("Tool {} failed: {}", invocation.name, e);
                results.push(ToolResult::failure(&invocation.id, e));
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{
        required_str, CourseOutlineTool, CourseSearchTool, Source, SourceLog, Tool, ToolInput,
    };
    use crate::model::{ContentBlock, StopReason, ToolInvocation};
    use crate::testing::{FakeCatalog, ScriptedModel};
    use crate::vector_store::{ChunkMetadata, CourseOutline, OutlineLesson, SearchResults};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new(
                "echo",
                "Echo the text back",
                json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            )
        }

        async fn execute(&self, input: &ToolInput, sources: &SourceLog) -> Result<String> {
            let text = required_str(input, "text")?;
            sources.record(vec![Source::new(text, None)]);
            Ok(format!("echo: {}", text))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new("broken", "Always fails", json!({"type": "object", "properties": {}}))
        }

        async fn execute(&self, _input: &ToolInput, _sources: &SourceLog) -> Result<String> {
            Err(LecternError::ToolFailed("Database connection failed".to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(BrokenTool);
        registry
    }

    fn echo(id: &str, text: &str) -> ToolInvocation {
        ToolInvocation::new(id, "echo", json!({ "text": text }))
    }

    fn tool_results(turn: &Turn) -> &[ToolResult] {
        match turn {
            Turn::ToolResults { results } => results,
            other => panic!("expected tool results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_direct_answer_without_tools() {
        let model = Arc::new(ScriptedModel::new(vec![ModelResponse::text("Paris.")]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        let answer = orchestrator
            .run("Capital of France?", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "Paris.");
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].turns, vec![Turn::user("Capital of France?")]);
        assert_eq!(calls[0].system, "system");
    }

    #[tokio::test]
    async fn test_single_round() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![echo("t1", "hello")]),
            ModelResponse::text("Done."),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        let answer = orchestrator
            .run("Say hello", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "Done.");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].turns.len(), 3);
        assert_eq!(calls[1].tools, vec!["echo", "broken"]);
        assert_eq!(
            tool_results(&calls[1].turns[2]),
            &[ToolResult::success("t1", "echo: hello")]
        );
        assert_eq!(registry.last_sources(), vec![Source::new("hello", None)]);
    }

    #[tokio::test]
    async fn test_round_limit_forces_text_only_call() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![echo("t1", "a")]),
            ModelResponse::tool_use(vec![echo("t2", "b")]),
            ModelResponse::tool_use(vec![echo("t3", "c")]),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        let answer = orchestrator
            .run("Keep going", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "");
        let calls = model.calls();
        assert_eq!(calls.len(), MAX_TOOL_ROUNDS + 1);
        assert!(!calls[0].tools.is_empty());
        assert!(!calls[1].tools.is_empty());
        assert!(calls[2].tools.is_empty());
        assert_eq!(calls[2].turns.len(), 5);
        // the third request was never executed
        assert_eq!(registry.last_sources(), vec![Source::new("b", None)]);
    }

    #[tokio::test]
    async fn test_custom_round_limit() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![echo("t1", "a")]),
            ModelResponse::text("Only one round."),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system").with_max_rounds(1);
        let registry = registry();

        let answer = orchestrator
            .run("q", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "Only one round.");
        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_error_becomes_diagnostic_result() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![ToolInvocation::new("t1", "broken", json!({}))]),
            ModelResponse::text("Sorry, the search is unavailable."),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        let answer = orchestrator
            .run("q", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "Sorry, the search is unavailable.");
        let calls = model.calls();
        let results = tool_results(&calls[1].turns[2]);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].content.contains("Database connection failed"));
        assert!(results[0].content.starts_with("Tool execution failed: "));
    }

    #[tokio::test]
    async fn test_missing_argument_is_reported_to_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![ToolInvocation::new("t1", "echo", json!({}))]),
            ModelResponse::text("ok"),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        orchestrator
            .run("q", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        let results = tool_results(&model.calls()[1].turns[2]).to_vec();
        assert!(results[0].is_error);
        assert!(results[0].content.contains("Missing 'text' argument"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_skipped() {
        let model = Arc::new(ScriptedModel::new(vec![ModelResponse {
            stop_reason: StopReason::ToolUse,
            content: vec![
                ContentBlock::text("Let me check."),
                ContentBlock::ToolUse(ToolInvocation::new("t1", "nonexistent", json!({}))),
            ],
        }]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        let answer = orchestrator
            .run("q", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "Let me check.");
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_request_skipped_but_others_run() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![
                ToolInvocation::new("t1", "echo", serde_json::Value::Null),
                ToolInvocation::new("t2", "ghost", json!({})),
                echo("t3", "kept"),
            ]),
            ModelResponse::text("final"),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");
        let registry = registry();

        orchestrator
            .run("q", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        let results = tool_results(&model.calls()[1].turns[2]).to_vec();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].invocation_id, "t3");
    }

    #[tokio::test]
    async fn test_prior_context_appended_to_system() {
        let model = Arc::new(ScriptedModel::new(vec![ModelResponse::text("answer")]));
        let orchestrator = Orchestrator::new(model.clone(), "You help students.");

        orchestrator
            .run("Next?", Some("User: Hi\nAssistant: Hello"), &[], None)
            .await
            .unwrap();

        let calls = model.calls();
        assert_eq!(
            calls[0].system,
            "You help students.\n\nPrevious conversation:\nUser: Hi\nAssistant: Hello"
        );
        assert!(calls[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_request_without_registry_returns_text() {
        let model = Arc::new(ScriptedModel::new(vec![ModelResponse::tool_use(vec![echo("t1", "x")])]));
        let orchestrator = Orchestrator::new(model.clone(), "system");

        let answer = orchestrator
            .run("q", None, &registry().declarations(), None)
            .await
            .unwrap();

        assert_eq!(answer, "");
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = Arc::new(
            ScriptedModel::new(vec![ModelResponse::tool_use(vec![echo("t1", "x")])])
                .then_fail("rate limited"),
        );
        let orchestrator = Orchestrator::new(model, "system");
        let registry = registry();

        let err = orchestrator
            .run("q", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap_err();

        assert!(matches!(err, LecternError::Model(msg) if msg == "rate limited"));
    }

    #[tokio::test]
    async fn test_what_is_mcp() {
        let catalog = Arc::new(
            FakeCatalog::with_results(SearchResults {
                documents: vec![
                    "MCP lets models call external tools.".to_string(),
                    "MCP servers expose resources and prompts.".to_string(),
                ],
                metadata: vec![
                    ChunkMetadata {
                        course_title: "MCP Course".to_string(),
                        lesson_number: Some(1),
                        chunk_index: 0,
                    },
                    ChunkMetadata {
                        course_title: "MCP Course".to_string(),
                        lesson_number: Some(2),
                        chunk_index: 3,
                    },
                ],
                distances: vec![0.1, 0.2],
                error: None,
            })
            .link("MCP Course", 1, "https://example.com/mcp/1")
            .link("MCP Course", 2, "https://example.com/mcp/2"),
        );
        let mut registry = ToolRegistry::new();
        registry.register(CourseSearchTool::new(catalog.clone()));
        registry.register(CourseOutlineTool::new(catalog.clone()));

        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![ToolInvocation::new(
                "call_1",
                "search_course_content",
                json!({"query": "What is MCP?"}),
            )]),
            ModelResponse::text("MCP is a protocol for connecting models to tools."),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");

        let answer = orchestrator
            .run("What is MCP?", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "MCP is a protocol for connecting models to tools.");
        let sources = registry.last_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(
            sources[0],
            Source::new("MCP Course - Lesson 1", Some("https://example.com/mcp/1".to_string()))
        );
        assert_eq!(
            sources[1],
            Source::new("MCP Course - Lesson 2", Some("https://example.com/mcp/2".to_string()))
        );
        let results = tool_results(&model.calls()[1].turns[2]).to_vec();
        assert!(results[0]
            .content
            .starts_with("[MCP Course - Lesson 1]\nMCP lets models call external tools."));
        assert!(results[0]
            .content
            .contains("[MCP Course - Lesson 2]\nMCP servers expose resources and prompts."));
    }

    #[tokio::test]
    async fn test_list_the_lessons() {
        let catalog = Arc::new(FakeCatalog {
            outline: Some(CourseOutline {
                title: "MCP: Build Rich-Context AI Apps".to_string(),
                course_link: None,
                lessons: vec![
                    OutlineLesson { lesson_number: 0, title: "Introduction".to_string() },
                    OutlineLesson { lesson_number: 1, title: "Why MCP".to_string() },
                ],
            }),
            ..FakeCatalog::default()
        });
        let mut registry = ToolRegistry::new();
        registry.register(CourseSearchTool::new(catalog.clone()));
        registry.register(CourseOutlineTool::new(catalog));

        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::tool_use(vec![ToolInvocation::new(
                "call_1",
                "get_course_outline",
                json!({"course_name": "MCP"}),
            )]),
            ModelResponse::text("The course has two lessons."),
        ]));
        let orchestrator = Orchestrator::new(model.clone(), "system");

        let answer = orchestrator
            .run("List the lessons of the MCP course", None, &registry.declarations(), Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer, "The course has two lessons.");
        assert!(registry.last_sources().is_empty());
        let results = tool_results(&model.calls()[1].turns[2]).to_vec();
        assert_eq!(
            results[0].content,
            "Course: MCP: Build Rich-Context AI Apps\nCourse Link: N/A\n\nLessons (2 total):\n  Lesson 0: Introduction\n  Lesson 1: Why MCP"
        );
    }
}
