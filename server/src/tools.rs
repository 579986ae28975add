//! The two tools the query agent can call: chart-spec generation and
//! restricted analysis-code execution.

use crate::{sandbox, schema_description, AgentTool, AgentToolResult, BoxedError, LoadedDataset, RunState};
use async_trait::async_trait;
use plotchat_llm::{
    text_from_parts, JSONSchema, LanguageModel, LanguageModelInput, Message, Part,
    ResponseFormatJson, ResponseFormatOption,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Everything a tool invocation needs: the dataset snapshot taken when the
/// query entered the pipeline, and the model used for nested generation.
#[derive(Clone)]
pub struct QueryContext {
    pub loaded: Arc<LoadedDataset>,
    pub model: Arc<dyn LanguageModel>,
}

fn invalid_arguments(error: &serde_json::Error) -> AgentToolResult {
    AgentToolResult {
        content: vec![Part::text(format!("invalid arguments: {error}"))],
        is_error: true,
    }
}

/// Generates a Vega-Lite chart specification for a plotting request by making
/// a nested, single-shot model call with the dataset schema in the prompt.
pub struct GenerateChartTool;

#[derive(Deserialize)]
struct GenerateChartArgs {
    prompt: String,
}

#[async_trait]
impl AgentTool<QueryContext> for GenerateChartTool {
    fn name(&self) -> String {
        "generate_chart".to_string()
    }

    fn description(&self) -> String {
        "Generate a Vega-Lite chart specification for the uploaded dataset. \
         Use this whenever the user asks for a chart, plot, or visualization. \
         Pass the user's plotting request as the prompt."
            .to_string()
    }

    fn parameters(&self) -> JSONSchema {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "A natural-language description of the chart to generate."
                }
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        args: Value,
        context: &QueryContext,
        _state: &RunState,
    ) -> Result<AgentToolResult, BoxedError> {
        let args: GenerateChartArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(error) => return Ok(invalid_arguments(&error)),
        };

        let input = LanguageModelInput {
            messages: vec![Message::user(vec![Part::text(chart_prompt(
                &context.loaded,
                &args.prompt,
            ))])],
            response_format: Some(ResponseFormatOption::Json(ResponseFormatJson {
                name: "vega_lite_chart".to_string(),
                description: None,
                schema: None,
            })),
            temperature: Some(0.0),
            ..Default::default()
        };

        match context.model.generate(input).await {
            Ok(response) => Ok(AgentToolResult {
                content: vec![Part::text(text_from_parts(&response.content))],
                is_error: false,
            }),
            // Surface the failure to the model as a normal tool result so the
            // run can continue or degrade gracefully.
            Err(error) => Ok(AgentToolResult {
                content: vec![Part::text(format!("chart generation failed: {error}"))],
                is_error: true,
            }),
        }
    }
}

fn chart_prompt(loaded: &LoadedDataset, request: &str) -> String {
    format!(
        r#"You are an AI assistant that generates Vega-Lite chart specifications.

Dataset Schema:
{schema}

Request:
"{request}"

Generate a Vega-Lite specification that fulfills the request using only columns from the schema, with encoding types matching the column types. Do not include any inline data values; the data will be supplied separately under the name "data".

Respond with JSON in the following format:

{{
    "vega_lite_spec": {{ ... }},
    "summary": "A one-sentence description of what the chart shows."
}}

Do not include any additional text outside the JSON response."#,
        schema = schema_description(&loaded.schema),
    )
}

/// Runs analysis code against the loaded dataset in the in-process sandbox.
/// Execution never raises: errors come back as output text, so this tool
/// always reports `is_error: false` and lets the model read the result.
pub struct RunCodeTool;

#[derive(Deserialize)]
struct RunCodeArgs {
    code: String,
}

#[async_trait]
impl AgentTool<QueryContext> for RunCodeTool {
    fn name(&self) -> String {
        "run_code".to_string()
    }

    fn description(&self) -> String {
        "Execute analysis code against the uploaded dataset and return its \
         printed output. The dataset is bound to the variable `df`. Use this \
         to compute counts, sums, means, minimums, maximums, and unique \
         values needed to answer the user's question."
            .to_string()
    }

    fn parameters(&self) -> JSONSchema {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The analysis code to run. Print any value you want to see."
                }
            },
            "required": ["code"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        args: Value,
        context: &QueryContext,
        _state: &RunState,
    ) -> Result<AgentToolResult, BoxedError> {
        let args: RunCodeArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(error) => return Ok(invalid_arguments(&error)),
        };

        let output = sandbox::execute(&args.code, &context.loaded.dataset);
        Ok(AgentToolResult {
            content: vec![Part::text(output)],
            is_error: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{infer_schema, Dataset};
    use plotchat_llm::{
        llm_test::{MockGenerateResult, MockLanguageModel},
        LanguageModelError, ModelResponse,
    };

    fn context(mock: &Arc<MockLanguageModel>) -> QueryContext {
        let dataset =
            Dataset::from_csv(b"mpg,cylinders\n30,4\n22,6\n18,8\n").unwrap();
        let schema = infer_schema(&dataset);
        QueryContext {
            loaded: Arc::new(LoadedDataset { dataset, schema }),
            model: mock.clone() as Arc<dyn LanguageModel>,
        }
    }

    fn state() -> RunState {
        RunState::new(vec![], 10)
    }

    #[tokio::test]
    async fn chart_tool_returns_the_nested_model_reply() {
        let mock = Arc::new(MockLanguageModel::new());
        mock.enqueue_generate(ModelResponse {
            content: vec![Part::text(
                r#"{"vega_lite_spec": {"mark": "bar"}, "summary": "A bar chart."}"#,
            )],
            ..Default::default()
        });

        let result = GenerateChartTool
            .execute(
                json!({"prompt": "Plot mpg by cylinders"}),
                &context(&mock),
                &state(),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert!(text_from_parts(&result.content).contains("vega_lite_spec"));

        // The nested call is pinned to deterministic JSON output and carries
        // the dataset schema.
        let inputs = mock.tracked_generate_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].temperature, Some(0.0));
        assert!(matches!(
            inputs[0].response_format,
            Some(ResponseFormatOption::Json(_))
        ));
        let Message::User(user) = &inputs[0].messages[0] else {
            panic!("expected a user message");
        };
        assert!(text_from_parts(&user.content).contains("mpg: quantitative"));
    }

    #[tokio::test]
    async fn chart_tool_model_error_becomes_an_error_result() {
        let mock = Arc::new(MockLanguageModel::new());
        mock.enqueue_generate(MockGenerateResult::error(LanguageModelError::Invariant(
            "mock",
            "boom".to_string(),
        )));

        let result = GenerateChartTool
            .execute(json!({"prompt": "Plot mpg"}), &context(&mock), &state())
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(text_from_parts(&result.content).contains("chart generation failed"));
    }

    #[tokio::test]
    async fn chart_tool_rejects_malformed_arguments() {
        let mock = Arc::new(MockLanguageModel::new());

        let result = GenerateChartTool
            .execute(json!({"wrong": 1}), &context(&mock), &state())
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(mock.tracked_generate_inputs().is_empty());
    }

    #[tokio::test]
    async fn run_code_tool_executes_against_the_dataset() {
        let mock = Arc::new(MockLanguageModel::new());

        let result = RunCodeTool
            .execute(
                json!({"code": "print(df.shape[0])"}),
                &context(&mock),
                &state(),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(text_from_parts(&result.content), "3\n");
    }

    #[tokio::test]
    async fn run_code_tool_reports_errors_as_output() {
        let mock = Arc::new(MockLanguageModel::new());

        let result = RunCodeTool
            .execute(json!({"code": "print(nope)"}), &context(&mock), &state())
            .await
            .unwrap();

        // Sandbox failures are feedback for the model, not run-ending errors.
        assert!(!result.is_error);
        assert!(text_from_parts(&result.content).contains("'nope' is not defined"));
    }
}
