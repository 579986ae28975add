use async_trait::async_trait;
use plotchat_llm::{
    llm_test::{MockGenerateResult, MockLanguageModel},
    text_from_parts, JSONSchema, Message, ModelResponse, Part,
};
use plotchat_server::{
    Agent, AgentError, AgentRequest, AgentTool, AgentToolResult, BoxedError, RunState,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

struct EchoTool {
    calls: Arc<Mutex<Vec<Value>>>,
}

impl EchoTool {
    fn new() -> (Self, Arc<Mutex<Vec<Value>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl AgentTool<()> for EchoTool {
    fn name(&self) -> String {
        "echo".to_string()
    }

    fn description(&self) -> String {
        "Echo the value back.".to_string()
    }

    fn parameters(&self) -> JSONSchema {
        json!({
            "type": "object",
            "properties": {"value": {"type": "string"}},
            "required": ["value"]
        })
    }

    async fn execute(
        &self,
        args: Value,
        _context: &(),
        _state: &RunState,
    ) -> Result<AgentToolResult, BoxedError> {
        self.calls.lock().unwrap().push(args.clone());
        let value = args["value"].as_str().unwrap_or_default();
        Ok(AgentToolResult {
            content: vec![Part::text(format!("echo: {value}"))],
            is_error: false,
        })
    }
}

struct FailingTool;

#[async_trait]
impl AgentTool<()> for FailingTool {
    fn name(&self) -> String {
        "failing".to_string()
    }

    fn description(&self) -> String {
        "Always fails.".to_string()
    }

    fn parameters(&self) -> JSONSchema {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _args: Value,
        _context: &(),
        _state: &RunState,
    ) -> Result<AgentToolResult, BoxedError> {
        Err("tool blew up".into())
    }
}

fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![Part::text(text)],
        ..Default::default()
    }
}

fn tool_call_response(id: &str, name: &str, args: Value) -> ModelResponse {
    ModelResponse {
        content: vec![Part::tool_call(id, name, args)],
        ..Default::default()
    }
}

fn user_request(text: &str) -> AgentRequest<()> {
    AgentRequest {
        context: (),
        messages: vec![Message::user(vec![Part::text(text)])],
    }
}

#[tokio::test]
async fn returns_immediately_without_tool_calls() {
    let mock = Arc::new(MockLanguageModel::new());
    mock.enqueue_generate(text_response("hello"));

    let (tool, calls) = EchoTool::new();
    let agent = Agent::builder("test_agent", mock.clone()).add_tool(tool).build();

    let response = agent.run(user_request("hi")).await.unwrap();

    assert_eq!(text_from_parts(&response.content), "hello");
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(mock.tracked_generate_inputs().len(), 1);
    // The run output records the terminal assistant message.
    assert_eq!(
        response.output,
        vec![Message::assistant(vec![Part::text("hello")])]
    );
}

#[tokio::test]
async fn dispatches_tool_calls_and_feeds_results_back() {
    let mock = Arc::new(MockLanguageModel::new());
    mock.enqueue_generate(tool_call_response("call_1", "echo", json!({"value": "hi"})))
        .enqueue_generate(text_response("done"));

    let (tool, calls) = EchoTool::new();
    let agent = Agent::builder("test_agent", mock.clone()).add_tool(tool).build();

    let response = agent.run(user_request("say hi")).await.unwrap();

    assert_eq!(text_from_parts(&response.content), "done");
    assert_eq!(*calls.lock().unwrap(), vec![json!({"value": "hi"})]);

    // The second model call sees the tool result, correlated by id and
    // enveloped with the arguments it was produced from.
    let inputs = mock.tracked_generate_inputs();
    assert_eq!(inputs.len(), 2);
    let Message::Tool(tool_message) = inputs[1].messages.last().unwrap() else {
        panic!("expected a tool message");
    };
    let Part::ToolResult(result) = &tool_message.content[0] else {
        panic!("expected a tool result part");
    };
    assert_eq!(result.tool_call_id, "call_1");
    assert_eq!(result.tool_name, "echo");
    assert_eq!(result.is_error, Some(false));

    let envelope: Value = serde_json::from_str(&text_from_parts(&result.content)).unwrap();
    assert_eq!(envelope["arguments"], json!({"value": "hi"}));
    assert_eq!(envelope["result"], "echo: hi");
}

#[tokio::test]
async fn unknown_tool_is_an_error() {
    let mock = Arc::new(MockLanguageModel::new());
    mock.enqueue_generate(tool_call_response("call_1", "nonexistent", json!({})));

    let (tool, _) = EchoTool::new();
    let agent = Agent::builder("test_agent", mock.clone()).add_tool(tool).build();

    let result = agent.run(user_request("hi")).await;
    assert!(
        matches!(result, Err(AgentError::UnknownTool(ref name)) if name == "nonexistent")
    );
}

#[tokio::test]
async fn tool_failure_interrupts_the_run() {
    let mock = Arc::new(MockLanguageModel::new());
    mock.enqueue_generate(tool_call_response("call_1", "failing", json!({})));

    let agent = Agent::builder("test_agent", mock.clone())
        .add_tool(FailingTool)
        .build();

    let result = agent.run(user_request("hi")).await;
    assert!(matches!(result, Err(AgentError::ToolExecution(_))));
}

#[tokio::test]
async fn exhausting_the_turn_budget_is_an_error() {
    let mock = Arc::new(MockLanguageModel::new());
    mock.enqueue_generate_results((0..10).map(|i| {
        MockGenerateResult::response(tool_call_response(
            &format!("call_{i}"),
            "echo",
            json!({"value": "again"}),
        ))
    }));

    let (tool, calls) = EchoTool::new();
    let agent = Agent::builder("test_agent", mock.clone()).add_tool(tool).build();

    let result = agent.run(user_request("loop forever")).await;
    assert!(matches!(result, Err(AgentError::MaxTurnsExceeded(10))));

    // Exactly ten model calls were made before the run was cut off.
    assert_eq!(mock.tracked_generate_inputs().len(), 10);
    assert_eq!(calls.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn instructions_and_tools_reach_the_model() {
    let mock = Arc::new(MockLanguageModel::new());
    mock.enqueue_generate(text_response("ok"));

    let (tool, _) = EchoTool::new();
    let agent = Agent::builder("test_agent", mock.clone())
        .add_instruction("Always be brief.")
        .add_tool(tool)
        .temperature(0.0)
        .build();

    agent.run(user_request("hi")).await.unwrap();

    let inputs = mock.tracked_generate_inputs();
    assert_eq!(inputs[0].system_prompt.as_deref(), Some("Always be brief."));
    assert_eq!(inputs[0].temperature, Some(0.0));
    let tools = inputs[0].tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");
}
