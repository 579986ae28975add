use crate::{schema_outline, Schema};
use plotchat_llm::{
    text_from_parts, LanguageModel, LanguageModelInput, Message, Part, ResponseFormatJson,
    ResponseFormatOption,
};
use serde::Deserialize;

/// Shown when the classifier itself fails; the question is then treated as
/// not relevant rather than passed through (fail-closed).
pub(crate) const RELEVANCE_FAILURE_MESSAGE: &str =
    "An error occurred while checking question relevance.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    Relevant,
    NotRelevant(String),
}

#[derive(Deserialize)]
struct RelevanceReply {
    relevance: String,
    #[serde(default)]
    message: Option<String>,
}

/// Ask the model whether a question pertains to the loaded dataset's schema.
///
/// Never fails: any transport error or reply that does not parse as the
/// expected JSON shape yields `NotRelevant` with a generic explanation, so a
/// broken classifier cannot let ungrounded questions through.
pub async fn check_relevance(
    model: &dyn LanguageModel,
    schema: &Schema,
    question: &str,
) -> Relevance {
    let input = LanguageModelInput {
        messages: vec![Message::user(vec![Part::text(relevance_prompt(
            schema, question,
        ))])],
        response_format: Some(ResponseFormatOption::Json(ResponseFormatJson {
            name: "relevance".to_string(),
            description: None,
            schema: None,
        })),
        temperature: Some(0.0),
        ..Default::default()
    };

    let response = match model.generate(input).await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(%error, "relevance check failed; treating question as not relevant");
            return Relevance::NotRelevant(RELEVANCE_FAILURE_MESSAGE.to_string());
        }
    };

    let text = text_from_parts(&response.content);
    match serde_json::from_str::<RelevanceReply>(text.trim()) {
        Ok(reply) if reply.relevance == "yes" => Relevance::Relevant,
        Ok(reply) if reply.relevance == "no" => Relevance::NotRelevant(
            reply
                .message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| RELEVANCE_FAILURE_MESSAGE.to_string()),
        ),
        Ok(reply) => {
            tracing::warn!(relevance = %reply.relevance, "unexpected relevance value");
            Relevance::NotRelevant(RELEVANCE_FAILURE_MESSAGE.to_string())
        }
        Err(error) => {
            tracing::warn!(%error, "relevance reply did not parse as JSON");
            Relevance::NotRelevant(RELEVANCE_FAILURE_MESSAGE.to_string())
        }
    }
}

fn relevance_prompt(schema: &Schema, question: &str) -> String {
    format!(
        r#"You are an AI assistant that determines whether a user's question is relevant to a dataset.

Dataset Schema:
{schema}

Question:
"{question}"

First, determine if the question is relevant to the dataset. If it is, answer "yes". If not, answer "no".

If the answer is "no", provide a response in the following JSON format:

{{
    "relevance": "no",
    "message": "The question \"{question}\" is not relevant to the dataset, which [provide a brief description of the dataset based on the schema]. It does not pertain to any data analysis or visualization task."
}}

If the answer is "yes", simply respond with:

{{
    "relevance": "yes"
}}

Important:

- Ensure that the JSON response is properly formatted.
- Do not include any additional text outside the JSON response.
- The dataset description should be concise and based on the dataset schema provided."#,
        schema = schema_outline(schema),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{infer_schema, Dataset};
    use plotchat_llm::{
        llm_test::{MockGenerateResult, MockLanguageModel},
        LanguageModelError, ModelResponse, ResponseFormatOption,
    };
    use serde_json::json;

    fn cars_schema() -> Schema {
        let dataset = Dataset::from_csv(b"mpg,cylinders\n30,4\n22,6\n").unwrap();
        infer_schema(&dataset)
    }

    fn text_response(value: serde_json::Value) -> ModelResponse {
        ModelResponse {
            content: vec![Part::text(value.to_string())],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn relevant_question_passes() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(text_response(json!({"relevance": "yes"})));

        let result = check_relevance(&mock, &cars_schema(), "Plot mpg vs cylinders").await;
        assert_eq!(result, Relevance::Relevant);

        // The classifier is pinned to deterministic JSON output.
        let inputs = mock.tracked_generate_inputs();
        assert_eq!(inputs[0].temperature, Some(0.0));
        assert!(matches!(
            inputs[0].response_format,
            Some(ResponseFormatOption::Json(_))
        ));
    }

    #[tokio::test]
    async fn irrelevant_question_carries_the_model_explanation() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(text_response(json!({
            "relevance": "no",
            "message": "The question is about geography, not the car dataset."
        })));

        let result =
            check_relevance(&mock, &cars_schema(), "What is the capital of France?").await;
        assert_eq!(
            result,
            Relevance::NotRelevant(
                "The question is about geography, not the car dataset.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn model_error_fails_closed() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(MockGenerateResult::error(LanguageModelError::Invariant(
            "mock",
            "boom".to_string(),
        )));

        let result = check_relevance(&mock, &cars_schema(), "Plot mpg").await;
        assert_eq!(
            result,
            Relevance::NotRelevant(RELEVANCE_FAILURE_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn malformed_reply_fails_closed() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(ModelResponse {
            content: vec![Part::text("sure, that looks relevant to me!")],
            ..Default::default()
        });

        let result = check_relevance(&mock, &cars_schema(), "Plot mpg").await;
        assert_eq!(
            result,
            Relevance::NotRelevant(RELEVANCE_FAILURE_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn unexpected_relevance_value_fails_closed() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(text_response(json!({"relevance": "maybe"})));

        let result = check_relevance(&mock, &cars_schema(), "Plot mpg").await;
        assert_eq!(
            result,
            Relevance::NotRelevant(RELEVANCE_FAILURE_MESSAGE.to_string())
        );
    }
}
