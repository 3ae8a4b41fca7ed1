//! Canned-answer language model for tests and offline runs.

use std::sync::Mutex;

use async_trait::async_trait;

use ragchat_core::{LanguageModel, RagError, Result};

/// A language model that answers every prompt with fixed text.
pub struct MockLanguageModel {
    response: String,
    fail_with: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    /// Answer every prompt with `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            fail_with: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call with an LLM error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: String::new(),
            fail_with: Some(message.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new("This is a mock answer.")
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.fail_with {
            Some(message) => Err(RagError::llm(message.clone())),
            None => Ok(self.response.clone()),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_prompts() {
        let model = MockLanguageModel::new("42");

        assert_eq!(model.generate("first").await.unwrap(), "42");
        assert_eq!(model.generate("second").await.unwrap(), "42");
        assert_eq!(model.prompts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = MockLanguageModel::failing("quota exceeded");

        let err = model.generate("q").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(model.prompts().len(), 1);
    }
}
