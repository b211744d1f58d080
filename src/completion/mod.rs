// Text-completion service contract
//
// The structural-parse assist and the field-mapping assist both go through
// this one narrow trait: complete(prompt) -> text. Implementations own their
// timeout; callers treat any error as "degrade, don't abort".

use crate::errors::FillError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

pub trait TextCompletion: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, FillError>;
}

/// HTTP-backed completion client (OpenAI-compatible completions endpoint)
pub struct HttpCompletionClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpCompletionClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, FillError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }
}

impl TextCompletion for HttpCompletionClient {
    fn complete(&self, prompt: &str) -> Result<String, FillError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            return Err(FillError::MappingFailure(format!(
                "Completion endpoint returned {}",
                response.status()
            )));
        }

        let parsed: CompletionResponse = response.json()?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| {
                FillError::MappingFailure("Completion response had no choices".to_string())
            })?;

        log::debug!(
            "[Completion] Got {} chars for a {} char prompt",
            content.len(),
            prompt.len()
        );
        Ok(content)
    }
}

/// Scripted completion double for tests: pops canned responses in order and
/// records every prompt it received
pub struct ScriptedCompletion {
    responses: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A double that fails every call, for exercising degradation paths
    pub fn failing() -> Self {
        Self::new(vec![])
    }

    pub fn received_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl TextCompletion for ScriptedCompletion {
    fn complete(&self, prompt: &str) -> Result<String, FillError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| FillError::MappingFailure("No scripted response left".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_completion_pops_in_order() {
        let scripted = ScriptedCompletion::new(vec!["first", "second"]);
        assert_eq!(scripted.complete("p1").unwrap(), "first");
        assert_eq!(scripted.complete("p2").unwrap(), "second");
        assert!(scripted.complete("p3").is_err());
        assert_eq!(scripted.call_count(), 3);
    }

    #[test]
    fn test_failing_double_always_errors() {
        let scripted = ScriptedCompletion::failing();
        assert!(scripted.complete("anything").is_err());
        assert_eq!(scripted.received_prompts(), vec!["anything".to_string()]);
    }
}
