use super::{CommitSummary, Estimator, RawEstimate};
use crate::error::{Result, TimekeepError};
use crate::model::TaskEstimate;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Estimator backed by the Gemini `generateContent` endpoint with a JSON
/// response schema.
pub struct GeminiEstimator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    hours_scale: f64,
}

impl GeminiEstimator {
    pub fn new(api_key: String, model: &str, timeout: Duration, hours_scale: f64) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.to_string(),
            hours_scale,
        })
    }

    pub fn from_env(model: &str, timeout: Duration, hours_scale: f64) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TimekeepError::Config(format!("{API_KEY_ENV} is not set")))?;
        Self::new(api_key, model, timeout, hours_scale)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl Estimator for GeminiEstimator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn cache_key(&self) -> String {
        format!("gemini:{}:{}", self.model, self.hours_scale)
    }

    fn estimate(&self, project: &str, commits: &[CommitSummary]) -> Result<RawEstimate> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": build_prompt(project, commits) }] }],
            "generationConfig": {
                "temperature": 0.2,
                "maxOutputTokens": 1000,
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
            }
        });

        debug!(project, commits = commits.len(), model = %self.model, "requesting estimate");
        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| TimekeepError::Estimation(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| TimekeepError::Estimation(format!("read body: {e}")))?;
        if !status.is_success() {
            return Err(TimekeepError::Estimation(format!(
                "gemini returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let analysis = extract_analysis(&text)?;
        Ok(analysis.into_estimate(self.hours_scale))
    }
}

fn build_prompt(project: &str, commits: &[CommitSummary]) -> String {
    let lines: Vec<String> = commits
        .iter()
        .map(|c| {
            format!(
                "- [{}] {} (+{}/-{} in {} files)",
                c.short_id, c.message, c.insertions, c.deletions, c.files_changed
            )
        })
        .collect();

    format!(
        "Analyze these git commits from project \"{project}\" made during one day and provide:\n\
         1. Total estimated development time (including planning, coding, testing, debugging)\n\
         2. A summary of what was accomplished\n\
         3. Brief breakdown of major tasks\n\n\
         Commits:\n{}\n\n\
         Consider:\n\
         - Related commits might be part of the same task\n\
         - Small commits (typos, formatting) take minimal time\n\
         - Large changes or new features take more time\n\
         - Include overhead time for context switching\n\
         - Be realistic with time estimates",
        lines.join("\n")
    )
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "total_hours": { "type": "NUMBER" },
            "summary": { "type": "STRING" },
            "major_tasks": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "task": { "type": "STRING" },
                        "hours": { "type": "NUMBER" }
                    },
                    "required": ["task", "hours"]
                }
            }
        },
        "required": ["total_hours", "summary", "major_tasks"]
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitAnalysis {
    total_hours: f64,
    summary: String,
    #[serde(default)]
    major_tasks: Vec<TaskSummary>,
}

#[derive(Debug, Deserialize)]
struct TaskSummary {
    task: String,
    hours: f64,
}

impl CommitAnalysis {
    fn into_estimate(self, hours_scale: f64) -> RawEstimate {
        RawEstimate {
            summary: self.summary,
            total_hours: self.total_hours * hours_scale,
            tasks: self
                .major_tasks
                .into_iter()
                .map(|t| TaskEstimate {
                    description: t.task,
                    hours: t.hours * hours_scale,
                })
                .collect(),
        }
    }
}

fn extract_analysis(body: &str) -> Result<CommitAnalysis> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| TimekeepError::Estimation(format!("malformed response: {e}")))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .filter(|t: &String| !t.trim().is_empty())
        .ok_or_else(|| TimekeepError::Estimation("response contained no candidates".to_string()))?;

    serde_json::from_str(&text)
        .map_err(|e| TimekeepError::Estimation(format!("malformed analysis: {e}")))
}
