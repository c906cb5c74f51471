use crate::config::Config;
use crate::detector::{violations, Parameter};
use crate::stations::types::Station;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
}

pub const SYSTEM_PROMPT: &str = "You are an environmental safety assistant for a city sensor network. \
You give short, concrete mitigation measures for heat, PM2.5 air pollution and noise exceedances.";

/// A text-completion backend able to answer one system/user prompt pair.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct AiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AiClient {
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self, AiError> {
        let timeout = Duration::from_secs(config.ai_timeout_secs);
        let client = Client::builder()
            .user_agent("EnvMonAdvisor/1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: config.openrouter_base_url.clone(),
            model: config.or_model.clone(),
            max_tokens: config.ai_max_tokens,
            timeout,
        })
    }

    async fn chat_completion(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.4,
            stream: false,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let body = response.text().await.map_err(|e| self.classify(e))?;
                let chat_response: ChatResponse = serde_json::from_str(&body)?;
                if let Some(choice) = chat_response.choices.into_iter().next() {
                    Ok(choice.message.content)
                } else {
                    Err(AiError::ApiError("No response choices".to_string()))
                }
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(AiError::RateLimited),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(AiError::ApiError(format!("HTTP {}: {}", status, error_text)))
            }
        }
    }

    fn classify(&self, error: reqwest::Error) -> AiError {
        if error.is_timeout() {
            AiError::Timeout(self.timeout)
        } else {
            AiError::RequestFailed(error)
        }
    }
}

#[async_trait]
impl SuggestionProvider for AiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AiError> {
        self.chat_completion(system, prompt).await
    }
}

/// User prompt listing every violated parameter of every station, followed
/// by the output contract the parsers expect.
pub fn build_suggestion_prompt(violating: &[&Station]) -> String {
    let mut prompt = String::from(
        "The following monitoring stations currently exceed safety thresholds:\n\n",
    );

    for station in violating {
        let Some(reading) = station.latest_reading.as_ref() else {
            continue;
        };
        prompt.push_str(&format!("Station: {} (area: {})\n", station.name, station.area));
        for parameter in violations(reading) {
            prompt.push_str(&format!(
                "- {}: {:.1}{} (threshold {}{})\n",
                parameter.label(),
                parameter.value_of(reading),
                parameter.unit(),
                parameter.threshold(),
                parameter.unit()
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "For every violated parameter above, give one practical mitigation measure.\n\
         Respond with ONLY a JSON array, no prose and no markdown. Each element must be an object \
         with exactly these double-quoted keys:\n\
         \"stationName\" (string), \"area\" (string), \"parameter\" (one of \"{}\", \"{}\", \"{}\"), \
         \"value\" (number), \"threshold\" (number), \"suggestion\" (string).",
        Parameter::Temperature.label(),
        Parameter::Emissions.label(),
        Parameter::Noise.label(),
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::station;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_secs: u64) -> AiClient {
        let config = Config {
            openrouter_base_url: format!("{}/chat/completions", server.uri()),
            ai_timeout_secs: timeout_secs,
            ..Config::default()
        };
        AiClient::new(&config, "test-key").unwrap()
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }]
        })
    }

    #[tokio::test]
    async fn test_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("[]")))
            .expect(1)
            .mount(&server)
            .await;

        let content = client_for(&server, 5).complete("sys", "user").await.unwrap();
        assert_eq!(content, "[]");
    }

    #[tokio::test]
    async fn test_sends_role_tagged_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        client_for(&server, 5).complete("be helpful", "hello").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server, 5).complete("sys", "user").await;
        assert!(matches!(result, Err(AiError::RateLimited)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        match client_for(&server, 5).complete("sys", "user").await {
            Err(AiError::ApiError(message)) => assert!(message.contains("upstream down")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let result = client_for(&server, 5).complete("sys", "user").await;
        assert!(matches!(result, Err(AiError::ApiError(_))));
    }

    #[tokio::test]
    async fn test_garbled_envelope_is_a_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server, 5).complete("sys", "user").await;
        assert!(matches!(result, Err(AiError::JsonParsing(_))));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let result = client_for(&server, 1).complete("sys", "user").await;
        assert!(matches!(result, Err(AiError::Timeout(_))));
    }

    #[test]
    fn test_prompt_lists_every_violation() {
        let hot_and_loud = station("Dock 4", "Harbour", Some((35.0, 100.0, 90.0)));
        let prompt = build_suggestion_prompt(&[&hot_and_loud]);

        assert!(prompt.contains("Station: Dock 4 (area: Harbour)"));
        assert!(prompt.contains("- Temperature: 35.0°C (threshold 30°C)"));
        assert!(prompt.contains("- Noise: 90.0dB (threshold 85dB)"));
        assert!(!prompt.contains("- PM2.5 Emissions"));
        assert!(prompt.contains("\"stationName\""));
    }
}
