use super::{ExportSink, TimeEntry};
use crate::error::{Result, TimekeepError};
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMECAMP_URL: &str = "https://app.timecamp.com/third_party/api";
pub const API_TOKEN_ENV: &str = "TIMECAMP_API_TOKEN";

#[derive(Debug, Serialize)]
struct EntryRequest<'a> {
    date: String,
    duration: u64,
    task_id: &'a str,
    description: &'a str,
}

/// Pushes time entries to the TimeCamp REST API.
pub struct TimeCampClient {
    client: Client,
    base_url: String,
    token: String,
}

impl TimeCampClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_env(base_url: &str, timeout: Duration) -> Result<Self> {
        let token = std::env::var(API_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TimekeepError::Config(format!("{API_TOKEN_ENV} is not set")))?;
        Self::new(base_url, token, timeout)
    }
}

impl ExportSink for TimeCampClient {
    fn push(&self, entry: &TimeEntry) -> Result<()> {
        let body = EntryRequest {
            date: entry.date.format("%Y-%m-%d").to_string(),
            duration: duration_secs(entry.hours),
            task_id: &entry.task_id,
            description: &entry.note,
        };

        debug!(task_id = %entry.task_id, hours = entry.hours, "pushing time entry");
        let resp = self
            .client
            .post(format!("{}/entries", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .map_err(|e| TimekeepError::Export(format!("request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = resp.text().unwrap_or_default();
            Err(TimekeepError::Export(format!("TimeCamp returned {status}: {}", text.trim())))
        }
    }
}

fn duration_secs(hours: f64) -> u64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    (hours * 3600.0).round() as u64
}
