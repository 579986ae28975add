use std::{collections::VecDeque, sync::Mutex};

use crate::{
    LanguageModel, LanguageModelError, LanguageModelInput, LanguageModelResult, ModelResponse,
};

/// Result for a mocked `generate` call.
/// It can either be a full response or an error to return.
pub enum MockGenerateResult {
    Response(ModelResponse),
    Error(LanguageModelError),
}

impl MockGenerateResult {
    /// Construct a result that yields the provided response.
    #[must_use]
    pub fn response(response: ModelResponse) -> Self {
        Self::Response(response)
    }

    /// Construct a result that yields the provided error.
    #[must_use]
    pub fn error(error: LanguageModelError) -> Self {
        Self::Error(error)
    }
}

impl From<ModelResponse> for MockGenerateResult {
    fn from(response: ModelResponse) -> Self {
        Self::response(response)
    }
}

impl From<LanguageModelResult<ModelResponse>> for MockGenerateResult {
    fn from(result: LanguageModelResult<ModelResponse>) -> Self {
        match result {
            Ok(response) => Self::Response(response),
            Err(error) => Self::Error(error),
        }
    }
}

#[derive(Default)]
struct MockLanguageModelState {
    mocked_generate_results: VecDeque<MockGenerateResult>,
    tracked_generate_inputs: Vec<LanguageModelInput>,
}

/// A mock language model for testing that tracks inputs and yields predefined
/// outputs.
pub struct MockLanguageModel {
    provider: &'static str,
    model_id: String,
    state: Mutex<MockLanguageModelState>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self {
            provider: "mock",
            model_id: "mock-model".to_string(),
            state: Mutex::new(MockLanguageModelState::default()),
        }
    }
}

impl MockLanguageModel {
    /// Construct a new mock language model instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one or more mocked generate results.
    pub fn enqueue_generate_results<I>(&self, results: I) -> &Self
    where
        I: IntoIterator<Item = MockGenerateResult>,
    {
        let mut state = self.state.lock().expect("mock state poisoned");
        for result in results {
            state.mocked_generate_results.push_back(result);
        }
        drop(state);
        self
    }

    /// Convenience to enqueue a single mocked generate result.
    pub fn enqueue_generate<R>(&self, result: R) -> &Self
    where
        R: Into<MockGenerateResult>,
    {
        self.enqueue_generate_results(std::iter::once(result.into()))
    }

    /// Retrieve the tracked generate inputs accumulated so far.
    #[must_use]
    pub fn tracked_generate_inputs(&self) -> Vec<LanguageModelInput> {
        let state = self.state.lock().expect("mock state poisoned");
        state.tracked_generate_inputs.clone()
    }

    /// Reset tracked inputs without touching enqueued results.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.tracked_generate_inputs.clear();
    }

    /// Clear both tracked inputs and enqueued results.
    pub fn restore(&self) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.mocked_generate_results.clear();
        state.tracked_generate_inputs.clear();
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockLanguageModel {
    fn provider(&self) -> &'static str {
        self.provider
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.tracked_generate_inputs.push(input.clone());

        let result = state.mocked_generate_results.pop_front().ok_or_else(|| {
            LanguageModelError::Invariant(
                self.provider,
                "no mocked generate results available".into(),
            )
        })?;

        match result {
            MockGenerateResult::Response(response) => Ok(response),
            MockGenerateResult::Error(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Part;

    #[tokio::test]
    async fn yields_enqueued_results_in_order_and_tracks_inputs() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(ModelResponse {
            content: vec![Part::text("first")],
            ..Default::default()
        })
        .enqueue_generate(ModelResponse {
            content: vec![Part::text("second")],
            ..Default::default()
        });

        let first = mock
            .generate(LanguageModelInput::default())
            .await
            .unwrap();
        let second = mock
            .generate(LanguageModelInput::default())
            .await
            .unwrap();

        assert_eq!(first.content, vec![Part::text("first")]);
        assert_eq!(second.content, vec![Part::text("second")]);
        assert_eq!(mock.tracked_generate_inputs().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_is_an_invariant_error() {
        let mock = MockLanguageModel::new();
        let result = mock.generate(LanguageModelInput::default()).await;
        assert!(matches!(result, Err(LanguageModelError::Invariant(..))));
    }

    #[tokio::test]
    async fn reset_clears_tracked_inputs_but_keeps_the_queue() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(ModelResponse::default())
            .enqueue_generate(ModelResponse::default());

        mock.generate(LanguageModelInput::default()).await.unwrap();
        mock.reset();

        assert!(mock.tracked_generate_inputs().is_empty());
        // The second enqueued result is still available.
        mock.generate(LanguageModelInput::default()).await.unwrap();
        assert_eq!(mock.tracked_generate_inputs().len(), 1);
    }

    #[tokio::test]
    async fn restore_clears_both_queue_and_tracked_inputs() {
        let mock = MockLanguageModel::new();
        mock.enqueue_generate(ModelResponse::default());

        mock.restore();

        assert!(mock.tracked_generate_inputs().is_empty());
        let result = mock.generate(LanguageModelInput::default()).await;
        assert!(matches!(result, Err(LanguageModelError::Invariant(..))));
    }
}
