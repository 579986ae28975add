use crate::{instruction, AgentError, AgentTool, InstructionParam};
use plotchat_llm::{
    text_from_parts, LanguageModel, LanguageModelInput, Message, ModelResponse, Part,
    ResponseFormatOption, ToolCallPart, ToolResultPart,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A single run request: the seed conversation plus the context that tools
/// receive on every invocation.
pub struct AgentRequest<TCtx> {
    pub context: TCtx,
    pub messages: Vec<Message>,
}

/// The outcome of a run: the terminal assistant content plus every message
/// generated along the way (assistant turns and tool results).
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: Vec<Part>,
    pub output: Vec<Message>,
}

/// Manages the run session for an agent.
/// It drives the bounded conversation loop: each iteration sends the full
/// conversation to the model, dispatches any requested tool calls, and feeds
/// the results back until the model answers without tool calls or the turn
/// budget runs out.
pub struct RunSession<TCtx> {
    model: Arc<dyn LanguageModel>,
    instructions: Arc<Vec<InstructionParam<TCtx>>>,
    tools: Arc<Vec<Box<dyn AgentTool<TCtx>>>>,
    response_format: ResponseFormatOption,
    max_turns: usize,
    temperature: Option<f64>,
}

impl<TCtx> RunSession<TCtx>
where
    TCtx: Send + Sync + 'static,
{
    pub(crate) fn new(
        model: Arc<dyn LanguageModel>,
        instructions: Arc<Vec<InstructionParam<TCtx>>>,
        tools: Arc<Vec<Box<dyn AgentTool<TCtx>>>>,
        response_format: ResponseFormatOption,
        max_turns: usize,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            model,
            instructions,
            tools,
            response_format,
            max_turns,
            temperature,
        }
    }

    /// Process the model response and decide whether to continue the loop or
    /// return the response.
    async fn process(
        &self,
        context: &TCtx,
        state: &RunState,
        parts: Vec<Part>,
    ) -> Result<ProcessResult, AgentError> {
        let tool_call_parts: Vec<ToolCallPart> = parts
            .iter()
            .filter_map(|part| {
                if let Part::ToolCall(tool_call) = part {
                    Some(tool_call.clone())
                } else {
                    None
                }
            })
            .collect();

        // If no tool calls were found, return the model response as is
        if tool_call_parts.is_empty() {
            return Ok(ProcessResult::Response(parts));
        }

        let mut tool_results = Vec::new();

        // Process all tool calls in the order the model emitted them
        for tool_call_part in tool_call_parts {
            let ToolCallPart {
                tool_call_id,
                tool_name,
                args,
            } = tool_call_part;

            let agent_tool = self
                .tools
                .iter()
                .find(|tool| tool.name() == tool_name)
                .ok_or_else(|| AgentError::UnknownTool(tool_name.clone()))?;

            tracing::debug!(tool = %tool_name, "dispatching tool call");

            let tool_res = agent_tool
                .execute(args.clone(), context, state)
                .await
                .map_err(AgentError::ToolExecution)?;

            // The result is echoed back together with the arguments it was
            // produced from, as a single JSON object.
            let enveloped = json!({
                "arguments": args,
                "result": text_from_parts(&tool_res.content),
            })
            .to_string();

            tool_results.push(Part::ToolResult(ToolResultPart {
                tool_call_id,
                tool_name,
                content: vec![Part::text(enveloped)],
                is_error: Some(tool_res.is_error),
            }));
        }

        Ok(ProcessResult::Next(vec![Message::tool(tool_results)]))
    }

    /// Run the agent loop to completion.
    #[tracing::instrument(skip_all, fields(max_turns = self.max_turns))]
    pub async fn run(&self, request: AgentRequest<TCtx>) -> Result<AgentResponse, AgentError> {
        let state = RunState::new(request.messages.clone(), self.max_turns);
        let context = request.context;

        let system_prompt = instruction::get_prompt(&self.instructions, &context);
        let base_input = LanguageModelInput {
            system_prompt: Some(system_prompt),
            // messages are computed per turn from the run state
            messages: vec![],
            tools: Some(self.tools.iter().map(|tool| tool.as_ref().into()).collect()),
            response_format: Some(self.response_format.clone()),
            temperature: self.temperature,
            ..Default::default()
        };

        loop {
            let mut input = base_input.clone();
            input.messages = state.get_turn_messages().await;

            let ModelResponse { content, .. } = self.model.generate(input).await?;

            state
                .append_messages(vec![Message::assistant(content.clone())])
                .await;

            match self.process(&context, &state, content).await? {
                ProcessResult::Response(final_content) => {
                    return Ok(state.create_response(final_content).await);
                }
                ProcessResult::Next(next_messages) => {
                    state.append_messages(next_messages).await;
                }
            }

            state.turn().await?;
        }
    }
}

enum ProcessResult {
    Response(Vec<Part>),
    // Return when new messages need to be added to the input and continue
    // processing
    Next(Vec<Message>),
}

pub struct RunState {
    max_turns: usize,
    input: Vec<Message>,

    /// The current turn number in the run.
    pub current_turn: Arc<Mutex<usize>>,
    /// All messages generated during the run, such as new `ToolMessage` and
    /// `AssistantMessage`
    output: Arc<Mutex<Vec<Message>>>,
}

impl RunState {
    #[must_use]
    pub fn new(input: Vec<Message>, max_turns: usize) -> Self {
        Self {
            max_turns,
            input,
            current_turn: Arc::new(Mutex::new(0)),
            output: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Mark a new turn in the conversation. Errors once the turn budget is
    /// spent: a model reply that still requests tool calls on the final turn
    /// terminates the run abnormally instead of looping on.
    pub async fn turn(&self) -> Result<(), AgentError> {
        let mut current_turn = self.current_turn.lock().await;
        *current_turn += 1;
        if *current_turn >= self.max_turns {
            return Err(AgentError::MaxTurnsExceeded(self.max_turns));
        }
        Ok(())
    }

    /// Add messages to the run state.
    pub async fn append_messages(&self, mut messages: Vec<Message>) {
        let mut output = self.output.lock().await;
        output.append(&mut messages);
    }

    /// Get the messages to use in the `LanguageModelInput` for the turn.
    #[must_use]
    pub async fn get_turn_messages(&self) -> Vec<Message> {
        let output = self.output.lock().await;
        [self.input.clone(), output.clone()].concat()
    }

    #[must_use]
    pub async fn create_response(&self, final_content: Vec<Part>) -> AgentResponse {
        let output = self.output.lock().await;
        AgentResponse {
            content: final_content,
            output: output.clone(),
        }
    }
}
