//! The query pipeline: dataset snapshot, relevance gate, agent run, and
//! parsing of the terminal answer into the client-facing shape.

use crate::{
    check_relevance, schema_description, tools::QueryContext, Agent, AgentError, AgentRequest,
    DatasetStore, GenerateChartTool, InstructionParam, Relevance, RunCodeTool,
};
use plotchat_llm::{
    text_from_parts, LanguageModel, Message, Part, ResponseFormatJson, ResponseFormatOption,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Returned when no dataset has been uploaded yet.
pub const NO_DATASET_MESSAGE: &str = "Please upload a dataset before sending a message.";
/// Returned when the agent spends its whole turn budget without answering.
pub const TIMEOUT_MESSAGE: &str =
    "The analysis took too many steps to complete. Please try rephrasing your question.";
/// Returned when the terminal assistant reply is not valid JSON.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse the assistant's response.";
/// Returned when the model produced neither a chart nor a summary.
pub const UNANSWERABLE_MESSAGE: &str =
    "The question could not be answered from the uploaded dataset.";

const AGENT_MAX_TURNS: usize = 10;

/// The client-facing answer shape. At most one of `response` (a renderable
/// Vega-Lite spec) and `message` is present; `summary` accompanies a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryResponse {
    fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Answer a natural-language question about the currently loaded dataset.
///
/// The dataset is snapshotted once at entry; an upload racing with this query
/// cannot change the data the rest of the pipeline sees. Exhausting the turn
/// budget degrades to a fixed message; other agent failures propagate.
#[tracing::instrument(skip_all, fields(prompt_len = prompt.len()))]
pub async fn run_query(
    store: &DatasetStore,
    model: Arc<dyn LanguageModel>,
    prompt: &str,
) -> Result<QueryResponse, AgentError> {
    let Some(loaded) = store.snapshot().await else {
        return Ok(QueryResponse::message(NO_DATASET_MESSAGE));
    };

    if let Relevance::NotRelevant(message) =
        check_relevance(model.as_ref(), &loaded.schema, prompt).await
    {
        tracing::info!("question rejected as not relevant");
        return Ok(QueryResponse::message(message));
    }

    let agent = build_agent(model.clone());
    let request = AgentRequest {
        context: QueryContext { loaded, model },
        messages: vec![Message::user(vec![Part::text(prompt)])],
    };

    match agent.run(request).await {
        Ok(response) => Ok(parse_final_answer(&text_from_parts(&response.content))),
        Err(AgentError::MaxTurnsExceeded(turns)) => {
            tracing::warn!(turns, "agent exhausted its turn budget");
            Ok(QueryResponse::message(TIMEOUT_MESSAGE))
        }
        Err(error) => Err(error),
    }
}

fn build_agent(model: Arc<dyn LanguageModel>) -> Agent<QueryContext> {
    Agent::builder("plotchat", model)
        .add_instruction(InstructionParam::Func(system_instructions))
        .add_tool(GenerateChartTool)
        .add_tool(RunCodeTool)
        .response_format(ResponseFormatOption::Json(ResponseFormatJson {
            name: "query_answer".to_string(),
            description: None,
            schema: None,
        }))
        .max_turns(AGENT_MAX_TURNS)
        .temperature(0.0)
        .build()
}

fn system_instructions(context: &QueryContext) -> String {
    format!(
        r#"You are an AI assistant that answers questions about an uploaded dataset by analyzing it and, when asked, visualizing it.

Dataset Schema:
{schema}

You have two tools:

- generate_chart: generates a Vega-Lite chart specification from a natural-language plotting request. Use it whenever the user asks for a chart, plot, or visualization.
- run_code: executes analysis code against the dataset and returns its printed output. The dataset is bound to the variable `df`. Supported operations: `df.shape[0]` (row count), `df.shape[1]` (column count), `df.columns`, `df["column"]` (column values), and the column methods `.count()`, `.sum()`, `.mean()`, `.min()`, `.max()`, `.unique()`, and `.head(n)`, plus arithmetic and `print(...)`. Print every value you want to see.

When you have the final answer, respond with JSON in the following format:

{{
    "response": {{ ... }},
    "summary": "..."
}}

- "response" is the Vega-Lite specification returned by generate_chart, if the user asked for a chart. Omit it or use an empty object otherwise.
- "summary" is a concise answer to the user's question in plain language.

Do not include any additional text outside the JSON response."#,
        schema = schema_description(&context.loaded.schema),
    )
}

#[derive(Deserialize)]
struct FinalAnswer {
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
}

/// Map the terminal assistant text onto the client contract. A non-empty
/// `response` object is a chart and gets the named data source the client
/// fills in; otherwise the summary is delivered as a plain message.
fn parse_final_answer(text: &str) -> QueryResponse {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return QueryResponse::message(UNANSWERABLE_MESSAGE);
    }

    let answer: FinalAnswer = match serde_json::from_str(trimmed) {
        Ok(answer) => answer,
        Err(error) => {
            tracing::warn!(%error, "terminal assistant reply was not valid JSON");
            return QueryResponse::message(PARSE_FAILURE_MESSAGE);
        }
    };

    let summary = answer
        .summary
        .filter(|summary| !summary.trim().is_empty());

    if let Some(Value::Object(mut spec)) = answer.response {
        if !spec.is_empty() {
            spec.insert("data".to_string(), json!({"name": "data"}));
            return QueryResponse {
                response: Some(Value::Object(spec)),
                summary,
                message: None,
            };
        }
    }

    match summary {
        Some(summary) => QueryResponse::message(summary),
        None => QueryResponse::message(UNANSWERABLE_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reply_is_unanswerable() {
        assert_eq!(
            parse_final_answer("  "),
            QueryResponse::message(UNANSWERABLE_MESSAGE)
        );
    }

    #[test]
    fn non_json_reply_is_a_parse_failure() {
        assert_eq!(
            parse_final_answer("here is your chart!"),
            QueryResponse::message(PARSE_FAILURE_MESSAGE)
        );
    }

    #[test]
    fn chart_reply_gets_the_named_data_source() {
        let result = parse_final_answer(
            r#"{"response": {"mark": "bar"}, "summary": "A bar chart."}"#,
        );
        let spec = result.response.unwrap();
        assert_eq!(spec["mark"], "bar");
        assert_eq!(spec["data"]["name"], "data");
        assert_eq!(result.summary.as_deref(), Some("A bar chart."));
        assert!(result.message.is_none());
    }

    #[test]
    fn empty_chart_falls_back_to_the_summary() {
        let result =
            parse_final_answer(r#"{"response": {}, "summary": "The mean mpg is 25."}"#);
        assert!(result.response.is_none());
        assert_eq!(result.message.as_deref(), Some("The mean mpg is 25."));
    }

    #[test]
    fn summary_only_reply_becomes_a_message() {
        let result = parse_final_answer(r#"{"summary": "There are 5 rows."}"#);
        assert_eq!(result, QueryResponse::message("There are 5 rows."));
    }

    #[test]
    fn blank_summary_and_no_chart_is_unanswerable() {
        let result = parse_final_answer(r#"{"summary": "   "}"#);
        assert_eq!(result, QueryResponse::message(UNANSWERABLE_MESSAGE));
    }
}
