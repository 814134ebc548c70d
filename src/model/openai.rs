//! OpenAI chat-completions backend for [`ModelClient`].

use super::{
    ContentBlock, ModelClient, ModelRequest, ModelResponse, StopReason, ToolChoice,
    ToolInvocation, Turn,
};
use crate::agent::ToolDeclaration;
use crate::config::ModelSettings;
use crate::error::{LecternError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolChoiceOption, ChatCompletionToolType,
    CreateChatCompletionRequestArgs, FinishReason, FunctionCall, FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default timeout for OpenAI API requests (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

/// Chat model reached through the OpenAI API.
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiModel {
    /// Create a model client from settings.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(Duration::from_secs(settings.timeout_secs))?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Name of the underlying chat model.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelClient for OpenAiModel {
    #[instrument(skip(self, request), fields(model = %self.model, turns = request.turns.len(), tools = request.tools.len()))]
    async fn invoke(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        let messages = build_messages(request.system, request.turns)?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens);

        if let Some(ToolChoice::Auto) = request.tool_choice() {
            builder
                .tools(request.tools.iter().map(to_openai_tool).collect::<Vec<_>>())
                .tool_choice(ChatCompletionToolChoiceOption::Auto);
        }

        let chat_request = builder.build().map_err(|e| LecternError::Model(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| LecternError::OpenAI(format!("Chat completion failed: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LecternError::Model("No response from model".to_string()))?;

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let stop_reason = map_finish_reason(choice.finish_reason, !tool_calls.is_empty());

        let mut content = Vec::with_capacity(tool_calls.len() + 1);
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(ContentBlock::text(text));
        }
        content.extend(tool_calls.into_iter().map(|call| {
            ContentBlock::ToolUse(ToolInvocation::new(
                call.id,
                call.function.name,
                parse_arguments(&call.function.arguments),
            ))
        }));

        debug!("Model stopped with {:?} and {} blocks", stop_reason, content.len());
        Ok(ModelResponse {
            stop_reason,
            content,
        })
    }
}

/// Convert the system text and turn history into chat messages.
fn build_messages(system: &str, turns: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system.to_string())
            .build()
            .map_err(|e| LecternError::Model(e.to_string()))?
            .into(),
    ];

    for (i, turn) in turns.iter().enumerate() {
        match turn {
            Turn::User { text } => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text.clone())
                    .build()
                    .map_err(|e| LecternError::Model(e.to_string()))?
                    .into(),
            ),
            Turn::Assistant { blocks } => {
                // Every tool call sent back must be answered by a tool message, so
                // drop the invocations that were skipped without a result.
                let answered: HashSet<&str> = match turns.get(i + 1) {
                    Some(Turn::ToolResults { results }) => {
                        results.iter().map(|r| r.invocation_id.as_str()).collect()
                    }
                    _ => HashSet::new(),
                };

                let mut args = ChatCompletionRequestAssistantMessageArgs::default();

                let text = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        ContentBlock::ToolUse(_) => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                if !text.is_empty() {
                    args.content(text);
                }

                let tool_calls: Vec<ChatCompletionMessageToolCall> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse(invocation)
                            if answered.contains(invocation.id.as_str()) =>
                        {
                            Some(ChatCompletionMessageToolCall {
                                id: invocation.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: invocation.name.clone(),
                                    arguments: invocation.input.to_string(),
                                },
                            })
                        }
                        _ => None,
                    })
                    .collect();
                if !tool_calls.is_empty() {
                    args.tool_calls(tool_calls);
                }

                messages.push(
                    args.build()
                        .map_err(|e| LecternError::Model(e.to_string()))?
                        .into(),
                );
            }
            Turn::ToolResults { results } => {
                for result in results {
                    messages.push(
                        ChatCompletionRequestToolMessageArgs::default()
                            .tool_call_id(result.invocation_id.clone())
                            .content(result.content.clone())
                            .build()
                            .map_err(|e| LecternError::Model(e.to_string()))?
                            .into(),
                    );
                }
            }
        }
    }

    Ok(messages)
}

fn to_openai_tool(declaration: &ToolDeclaration) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: declaration.name.clone(),
            description: Some(declaration.description.clone()),
            parameters: Some(declaration.input_schema.clone()),
            strict: None,
        },
    }
}

fn map_finish_reason(reason: Option<FinishReason>, has_tool_calls: bool) -> StopReason {
    match reason {
        Some(FinishReason::ToolCalls) => StopReason::ToolUse,
        Some(FinishReason::Stop) => StopReason::EndTurn,
        Some(FinishReason::Length) => StopReason::MaxTokens,
        None if has_tool_calls => StopReason::ToolUse,
        _ => StopReason::Other,
    }
}

/// Unparsable arguments become `null`, which marks the invocation as malformed.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    serde_json::from_str(arguments).unwrap_or_else(|e| {
        warn!("Discarding unparsable tool arguments: {}", e);
        serde_json::Value::Null
    })
}
