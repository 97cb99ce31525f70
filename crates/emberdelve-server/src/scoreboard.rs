//! Best-effort bridge to the external highscore service.
//!
//! Submissions ride a private tokio runtime so a slow or dead endpoint
//! never stalls the poll loop. The end-of-game sequence polls the batch
//! and gives up at a bounded deadline; failures are logged, not retried.

use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ScoreServiceConfig;

/// Scoreboard error types
#[derive(Debug, thiserror::Error)]
pub enum ScoreboardError {
    #[error("Failed to start score runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("Highscore request failed: {0}")]
    Request(reqwest::Error),

    #[error("Highscore service returned a malformed table")]
    MalformedTable,
}

/// In-flight submissions for one finished game
pub struct SubmissionBatch {
    handles: Vec<JoinHandle<()>>,
}

impl SubmissionBatch {
    /// A batch with nothing to wait for.
    pub fn empty() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// True once every submission task has finished, success or not.
    pub fn is_settled(&self) -> bool {
        self.handles.iter().all(|handle| handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// HTTP client for the highscore service
pub struct Scoreboard {
    runtime: Runtime,
    client: reqwest::Client,
    config: ScoreServiceConfig,
}

impl Scoreboard {
    pub fn new(config: ScoreServiceConfig) -> Result<Self, ScoreboardError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scoreboard")
            .enable_all()
            .build()
            .map_err(ScoreboardError::Runtime)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.submit_timeout_ms))
            .build()
            .map_err(ScoreboardError::Client)?;
        Ok(Self {
            runtime,
            client,
            config,
        })
    }

    /// Bound on how long a game end waits for the batch before moving on.
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.config.submit_timeout_ms)
    }

    /// Fires one GET per entry, independently. Entries with an empty name
    /// are skipped; the service keys rows by name and would record an
    /// orphan.
    pub fn submit(&self, entries: &[(String, u16)]) -> SubmissionBatch {
        let mut handles = Vec::new();
        for (name, score) in entries {
            if name.is_empty() {
                warn!("Skipping highscore submission for an unnamed player ({score} coins)");
                continue;
            }
            let score_text = score.to_string();
            let request = self.client.get(&self.config.submit_url).query(&[
                ("playerName", name.as_str()),
                ("score", score_text.as_str()),
            ]);
            let name = name.clone();
            handles.push(self.runtime.spawn(async move {
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        info!("Submitted highscore for {name}");
                    }
                    Ok(response) => {
                        warn!(
                            "Highscore service answered {} submitting for {name}",
                            response.status()
                        );
                    }
                    Err(e) => warn!("Highscore submission for {name} failed: {e}"),
                }
            }));
        }
        SubmissionBatch { handles }
    }

    /// Fetches the current table, blocking the caller. Used as a startup
    /// reachability probe.
    pub fn fetch_top_scores(&self) -> Result<Vec<(String, u32)>, ScoreboardError> {
        let request = self.client.get(&self.config.fetch_url);
        let value: Value = self
            .runtime
            .block_on(async { request.send().await?.error_for_status()?.json().await })
            .map_err(ScoreboardError::Request)?;
        parse_score_table(&value).ok_or(ScoreboardError::MalformedTable)
    }
}

/// Parses `{"highscores": [{"name": ..., "highscore": ...}, ...]}`.
///
/// The service is loose about types: `highscore` arrives as a JSON number
/// or a numeric string depending on its storage path. Rows that parse are
/// kept and re-sorted descending; rows that do not are dropped.
fn parse_score_table(value: &Value) -> Option<Vec<(String, u32)>> {
    let rows = value.get("highscores")?.as_array()?;
    let mut table: Vec<(String, u32)> = rows
        .iter()
        .filter_map(|row| {
            let name = row.get("name")?.as_str()?.to_string();
            let score = match row.get("highscore")? {
                Value::Number(number) => u32::try_from(number.as_u64()?).ok()?,
                Value::String(text) => text.parse().ok()?,
                _ => return None,
            };
            Some((name, score))
        })
        .collect();
    table.sort_by(|a, b| b.1.cmp(&a.1));
    Some(table)
}
