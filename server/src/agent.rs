use crate::{
    run::RunSession, tool::AgentTool, AgentError, AgentRequest, AgentResponse, InstructionParam,
};
use plotchat_llm::{LanguageModel, ResponseFormatOption};
use std::sync::Arc;

pub struct Agent<TCtx> {
    /// A unique name for the agent.
    /// The name can only contain letters and underscores.
    pub name: String,
    model: Arc<dyn LanguageModel>,
    instructions: Arc<Vec<InstructionParam<TCtx>>>,
    tools: Arc<Vec<Box<dyn AgentTool<TCtx>>>>,
    response_format: ResponseFormatOption,
    max_turns: usize,
    temperature: Option<f64>,
}

impl<TCtx> Agent<TCtx>
where
    TCtx: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(params: AgentParams<TCtx>) -> Self {
        Self {
            name: params.name,
            model: params.model,
            instructions: Arc::new(params.instructions),
            tools: Arc::new(params.tools),
            response_format: params.response_format,
            max_turns: params.max_turns,
            temperature: params.temperature,
        }
    }

    /// Create a stateless one-time run of the agent
    pub async fn run(&self, request: AgentRequest<TCtx>) -> Result<AgentResponse, AgentError> {
        self.create_session().run(request).await
    }

    /// Create a session for stateful multiple runs of the agent
    #[must_use]
    pub fn create_session(&self) -> RunSession<TCtx> {
        RunSession::new(
            self.model.clone(),
            self.instructions.clone(),
            self.tools.clone(),
            self.response_format.clone(),
            self.max_turns,
            self.temperature,
        )
    }

    pub fn builder(name: &str, model: Arc<dyn LanguageModel>) -> AgentParams<TCtx> {
        AgentParams::new(name, model)
    }
}

/// Parameters required to create a new agent.
/// # Default Values
/// - `instructions`: `vec![]`
/// - `tools`: `vec![]`
/// - `response_format`: `ResponseFormatOption::Text`
/// - `max_turns`: 10
/// - `temperature`: `None`
pub struct AgentParams<TCtx> {
    pub name: String,
    /// The default language model to use for the agent.
    pub model: Arc<dyn LanguageModel>,
    /// Instructions to be added to system messages when executing the agent.
    /// This can include formatting instructions or other guidance for the
    /// agent.
    pub instructions: Vec<InstructionParam<TCtx>>,
    /// The tools that the agent can use to perform tasks.
    pub tools: Vec<Box<dyn AgentTool<TCtx>>>,
    /// The expected format of the response. Either text or structured output.
    pub response_format: ResponseFormatOption,
    /// Max number of turns for agent to run to protect against infinite loops.
    pub max_turns: usize,
    /// Amount of randomness injected into the response. Ranges from 0.0 to 1.0
    pub temperature: Option<f64>,
}

impl<TCtx> AgentParams<TCtx>
where
    TCtx: Send + Sync + 'static,
{
    pub fn new(name: &str, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            name: name.to_string(),
            model,
            instructions: Vec::new(),
            tools: Vec::new(),
            response_format: ResponseFormatOption::Text,
            max_turns: 10,
            temperature: None,
        }
    }

    /// Add an instruction
    #[must_use]
    pub fn add_instruction(mut self, instruction: impl Into<InstructionParam<TCtx>>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Add a tool
    #[must_use]
    pub fn add_tool(mut self, tool: impl AgentTool<TCtx> + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    /// Set the response format
    #[must_use]
    pub fn response_format(mut self, response_format: ResponseFormatOption) -> Self {
        self.response_format = response_format;
        self
    }

    /// Set the max turns
    #[must_use]
    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the temperature for sampling
    /// Amount of randomness injected into the response. Ranges from 0.0 to 1.0
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn build(self) -> Agent<TCtx> {
        Agent::new(self)
    }
}
