use super::api::{
    ChatCompletion, ChatCompletionAssistantMessageParam, ChatCompletionCreateParams,
    ChatCompletionFunctionTool, ChatCompletionMessage, ChatCompletionMessageFunctionToolCall,
    ChatCompletionMessageParam, ChatCompletionMessageToolCall, ChatCompletionSystemMessageParam,
    ChatCompletionTool, ChatCompletionToolMessageParam, ChatCompletionUserMessageParam,
    CompletionUsage, FunctionObject, JsonSchemaConfig, ResponseFormat, ResponseFormatJsonSchema,
    ToolCallFunction,
};
use crate::{
    client_utils, text_from_parts, LanguageModel, LanguageModelError, LanguageModelInput,
    LanguageModelResult, Message, ModelResponse, ModelUsage, Part, ResponseFormatOption, Tool,
    ToolCallPart,
};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client,
};

const PROVIDER: &str = "openai";

pub struct OpenAIChatModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Clone, Default)]
pub struct OpenAIChatModelOptions {
    pub base_url: Option<String>,
    pub api_key: String,
    pub client: Option<Client>,
}

impl OpenAIChatModel {
    #[must_use]
    pub fn new(model_id: impl Into<String>, options: OpenAIChatModelOptions) -> Self {
        let OpenAIChatModelOptions {
            base_url,
            api_key,
            client,
        } = options;

        let base_url = base_url
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let client = client.unwrap_or_else(Client::new);

        Self {
            model_id: model_id.into(),
            api_key,
            base_url,
            client,
        }
    }

    fn request_headers(&self) -> LanguageModelResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        let auth_header =
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|error| {
                LanguageModelError::InvalidInput(format!(
                    "Invalid OpenAI API key header value: {error}"
                ))
            })?;
        headers.insert(header::AUTHORIZATION, auth_header);

        Ok(headers)
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAIChatModel {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse> {
        let request = convert_to_openai_create_params(input, &self.model_id)?;
        let headers = self.request_headers()?;

        tracing::debug!(model = %self.model_id, "sending chat completion request");

        let response: ChatCompletion = client_utils::send_json(
            &self.client,
            &format!("{}/chat/completions", self.base_url),
            &request,
            headers,
        )
        .await?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LanguageModelError::Invariant(PROVIDER, "No choices in response".to_string())
        })?;

        let message = choice.message;

        if let Some(refusal) = &message.refusal {
            if !refusal.is_empty() {
                return Err(LanguageModelError::Refusal(refusal.clone()));
            }
        }

        let content = map_openai_message(message)?;
        let usage = response.usage.map(map_openai_usage);

        Ok(ModelResponse { content, usage })
    }
}

fn convert_to_openai_create_params(
    input: LanguageModelInput,
    model_id: &str,
) -> LanguageModelResult<ChatCompletionCreateParams> {
    let messages = convert_to_openai_messages(input.messages, input.system_prompt)?;

    Ok(ChatCompletionCreateParams {
        messages,
        model: model_id.to_string(),
        max_completion_tokens: input.max_tokens,
        response_format: input.response_format.map(convert_to_openai_response_format),
        temperature: input.temperature,
        tools: input
            .tools
            .map(|tools| tools.into_iter().map(convert_to_openai_tool).collect()),
    })
}

fn convert_to_openai_messages(
    messages: Vec<Message>,
    system_prompt: Option<String>,
) -> LanguageModelResult<Vec<ChatCompletionMessageParam>> {
    let mut openai_messages = Vec::new();

    if let Some(prompt) = system_prompt {
        openai_messages.push(ChatCompletionMessageParam::System(
            ChatCompletionSystemMessageParam { content: prompt },
        ));
    }

    for message in messages {
        match message {
            Message::User(user_message) => {
                let content = text_only(&user_message.content, "user message parts")?;
                openai_messages.push(ChatCompletionMessageParam::User(
                    ChatCompletionUserMessageParam { content },
                ));
            }
            Message::Assistant(assistant_message) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for part in assistant_message.content {
                    match part {
                        Part::Text(text_part) => text.push_str(&text_part.text),
                        Part::ToolCall(tool_call) => {
                            tool_calls.push(convert_to_openai_tool_call(&tool_call));
                        }
                        Part::ToolResult(_) => {
                            return Err(LanguageModelError::Unsupported(
                                PROVIDER,
                                "Tool result parts are not valid in assistant messages"
                                    .to_string(),
                            ));
                        }
                    }
                }
                openai_messages.push(ChatCompletionMessageParam::Assistant(
                    ChatCompletionAssistantMessageParam {
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                    },
                ));
            }
            Message::Tool(tool_message) => {
                // OpenAI expects one tool message per tool result, keyed by
                // the originating tool call id.
                for part in tool_message.content {
                    let Part::ToolResult(tool_result) = part else {
                        return Err(LanguageModelError::Unsupported(
                            PROVIDER,
                            "Tool messages may only contain tool result parts".to_string(),
                        ));
                    };
                    openai_messages.push(ChatCompletionMessageParam::Tool(
                        ChatCompletionToolMessageParam {
                            content: text_from_parts(&tool_result.content),
                            tool_call_id: tool_result.tool_call_id,
                        },
                    ));
                }
            }
        }
    }

    Ok(openai_messages)
}

fn text_only(parts: &[Part], what: &str) -> LanguageModelResult<String> {
    if parts.iter().any(|part| !matches!(part, Part::Text(_))) {
        return Err(LanguageModelError::Unsupported(
            PROVIDER,
            format!("Only text parts are supported for {what}"),
        ));
    }
    Ok(text_from_parts(parts))
}

fn convert_to_openai_tool_call(tool_call: &ToolCallPart) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall::Function(ChatCompletionMessageFunctionToolCall {
        id: tool_call.tool_call_id.clone(),
        function: ToolCallFunction {
            name: tool_call.tool_name.clone(),
            arguments: tool_call.args.to_string(),
        },
    })
}

fn convert_to_openai_tool(tool: Tool) -> ChatCompletionTool {
    ChatCompletionTool::Function(ChatCompletionFunctionTool {
        function: FunctionObject {
            name: tool.name,
            description: Some(tool.description),
            parameters: Some(tool.parameters),
        },
    })
}

fn convert_to_openai_response_format(response_format: ResponseFormatOption) -> ResponseFormat {
    match response_format {
        ResponseFormatOption::Text => ResponseFormat::Text,
        ResponseFormatOption::Json(json) => {
            if let Some(schema) = json.schema {
                ResponseFormat::JsonSchema(ResponseFormatJsonSchema {
                    json_schema: JsonSchemaConfig {
                        name: json.name,
                        description: json.description,
                        schema: Some(schema),
                    },
                })
            } else {
                ResponseFormat::JsonObject
            }
        }
    }
}

fn map_openai_message(message: ChatCompletionMessage) -> LanguageModelResult<Vec<Part>> {
    let mut parts = Vec::new();

    if let Some(content) = message.content {
        if !content.is_empty() {
            parts.push(Part::text(content));
        }
    }

    for tool_call in message.tool_calls.unwrap_or_default() {
        let ChatCompletionMessageToolCall::Function(function_call) = tool_call;
        let args = serde_json::from_str(&function_call.function.arguments).map_err(|error| {
            LanguageModelError::Invariant(
                PROVIDER,
                format!("Failed to parse tool call arguments: {error}"),
            )
        })?;
        parts.push(Part::tool_call(
            function_call.id,
            function_call.function.name,
            args,
        ));
    }

    Ok(parts)
}

fn map_openai_usage(usage: CompletionUsage) -> ModelUsage {
    ModelUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}
