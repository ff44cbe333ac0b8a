use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::retry::{RATE_LIMIT_BASE_DELAY, is_rate_limited, retry_after, wait_with_backoff};
use super::{BackendFuture, TranslateBackend};
use crate::error::BatchFailure;

pub const DEFAULT_ENDPOINT: &str =
    "https://dhruva-api.bhashini.gov.in/services/inference/pipeline";
pub(crate) const DEFAULT_MAX_RETRIES: usize = 2;
const ERROR_BODY_LIMIT: usize = 300;

/// Client for the Bhashini inference pipeline's translation task.
#[derive(Debug, Clone)]
pub struct Bhashini {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    max_retries: usize,
}

impl Bhashini {
    pub fn with_timeout(key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            key: key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn send(
        &self,
        source_language: &str,
        target_language: &str,
        texts: &[String],
    ) -> Result<Vec<String>, BatchFailure> {
        let body = PipelineRequest::translation(source_language, target_language, texts);
        let mut delay = RATE_LIMIT_BASE_DELAY;
        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .header("Authorization", &self.key)
                .json(&body)
                .send()
                .await
                .map_err(|err| BatchFailure::Transport(err.to_string()))?;
            let status = response.status();
            let headers = response.headers().clone();
            let text = response
                .text()
                .await
                .map_err(|err| BatchFailure::Transport(err.to_string()))?;
            debug!("translation service answered {} ({} bytes)", status, text.len());

            if status.is_success() {
                return parse_translations(&text, texts.len());
            }
            if is_rate_limited(status, &text) && attempt < self.max_retries {
                attempt += 1;
                delay =
                    wait_with_backoff(attempt, self.max_retries, delay, retry_after(&headers))
                        .await;
                continue;
            }
            return Err(BatchFailure::Status {
                status: status.as_u16(),
                body: truncate(&text, ERROR_BODY_LIMIT),
            });
        }
    }
}

impl TranslateBackend for Bhashini {
    fn translate<'a>(
        &'a self,
        source_language: &'a str,
        target_language: &'a str,
        texts: &'a [String],
    ) -> BackendFuture<'a> {
        Box::pin(self.send(source_language, target_language, texts))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRequest<'a> {
    pipeline_tasks: Vec<PipelineTask<'a>>,
    input_data: InputData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineTask<'a> {
    task_type: &'static str,
    config: TaskConfig<'a>,
}

#[derive(Debug, Serialize)]
struct TaskConfig<'a> {
    language: LanguagePair<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LanguagePair<'a> {
    source_language: &'a str,
    target_language: &'a str,
}

#[derive(Debug, Serialize)]
struct InputData<'a> {
    input: Vec<InputItem<'a>>,
}

#[derive(Debug, Serialize)]
struct InputItem<'a> {
    source: &'a str,
}

impl<'a> PipelineRequest<'a> {
    fn translation(source_language: &'a str, target_language: &'a str, texts: &'a [String]) -> Self {
        Self {
            pipeline_tasks: vec![PipelineTask {
                task_type: "translation",
                config: TaskConfig {
                    language: LanguagePair {
                        source_language,
                        target_language,
                    },
                },
            }],
            input_data: InputData {
                input: texts.iter().map(|text| InputItem { source: text }).collect(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineResponse {
    pipeline_response: Option<Vec<TaskResponse>>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    output: Option<Vec<OutputItem>>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    target: Option<String>,
}

/// Pulls `pipelineResponse[0].output[*].target` out of a response body.
/// Every item must carry a string `target`; an empty one is kept as empty so
/// the caller can fall back per run.
pub(crate) fn parse_translations(body: &str, expected: usize) -> Result<Vec<String>, BatchFailure> {
    let parsed: PipelineResponse = serde_json::from_str(body)
        .map_err(|err| BatchFailure::Malformed(format!("invalid JSON: {}", err)))?;
    let output = parsed
        .pipeline_response
        .and_then(|tasks| tasks.into_iter().next())
        .and_then(|task| task.output)
        .ok_or_else(|| BatchFailure::Malformed("missing pipelineResponse[0].output".to_string()))?;
    if output.len() != expected {
        return Err(BatchFailure::CountMismatch {
            expected,
            received: output.len(),
        });
    }
    output
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            item.target.ok_or_else(|| {
                BatchFailure::Malformed(format!("output[{}] has no string target", index))
            })
        })
        .collect()
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_pipeline_shape() {
        let texts = vec!["नमस्कार".to_string(), "जग".to_string()];
        let body = serde_json::to_value(PipelineRequest::translation("mr", "hi", &texts))
            .expect("serialize");
        assert_eq!(
            body,
            json!({
                "pipelineTasks": [{
                    "taskType": "translation",
                    "config": {"language": {"sourceLanguage": "mr", "targetLanguage": "hi"}}
                }],
                "inputData": {"input": [{"source": "नमस्कार"}, {"source": "जग"}]}
            })
        );
    }

    #[test]
    fn parses_targets_in_order() {
        let body = json!({
            "pipelineResponse": [{
                "taskType": "translation",
                "output": [
                    {"source": "a", "target": "A"},
                    {"source": "b", "target": ""}
                ]
            }]
        })
        .to_string();
        assert_eq!(
            parse_translations(&body, 2).expect("parse"),
            vec!["A".to_string(), String::new()]
        );
    }

    #[test]
    fn unexpected_shapes_are_batch_failures() {
        assert!(matches!(
            parse_translations("<html>", 1),
            Err(BatchFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_translations(r#"{"output": []}"#, 1),
            Err(BatchFailure::Malformed(_))
        ));
        assert!(matches!(
            parse_translations(r#"{"pipelineResponse": [{"output": [{"target": 3}]}]}"#, 1),
            Err(BatchFailure::Malformed(_))
        ));
        assert_eq!(
            parse_translations(r#"{"pipelineResponse": [{"output": [{"target": "x"}]}]}"#, 2),
            Err(BatchFailure::CountMismatch {
                expected: 2,
                received: 1
            })
        );
    }

    #[test]
    fn missing_or_null_target_fails_the_whole_batch() {
        let missing = json!({
            "pipelineResponse": [{
                "output": [{"source": "a"}, {"source": "b", "target": "B"}]
            }]
        })
        .to_string();
        assert!(matches!(
            parse_translations(&missing, 2),
            Err(BatchFailure::Malformed(_))
        ));

        let null = json!({"pipelineResponse": [{"output": [{"target": null}]}]}).to_string();
        assert!(matches!(
            parse_translations(&null, 1),
            Err(BatchFailure::Malformed(_))
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
