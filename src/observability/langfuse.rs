//! Langfuse ingestion client.
//!
//! Events are buffered in memory and sent as one batch to
//! `POST {host}/api/public/ingestion` with HTTP basic auth. Delivery is best
//! effort: failures are logged and never reach the caller's request.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{LangfuseConfig, LANGFUSE_FLUSH_TIMEOUT_SECS};

#[derive(Debug, thiserror::Error)]
pub enum LangfuseError {
    #[error("Langfuse request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Langfuse returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Serialize)]
struct IngestionEvent {
    id: String,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    body: Value,
}

struct Inner {
    client: Client,
    endpoint: String,
    public_key: String,
    secret_key: String,
    buffer: Mutex<Vec<IngestionEvent>>,
}

/// Handle to a Langfuse project; cheap to clone
#[derive(Clone)]
pub struct Langfuse {
    inner: Arc<Inner>,
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Langfuse {
    /// Build a client when both keys are configured, otherwise log and return `None`
    pub fn from_config(config: &LangfuseConfig) -> Option<Self> {
        let (Some(public_key), Some(secret_key)) = (&config.public_key, &config.secret_key) else {
            tracing::warn!(
                "Langfuse not configured, set LANGFUSE_PUBLIC_KEY and LANGFUSE_SECRET_KEY to enable tracing"
            );
            return None;
        };
        if !config.has_credentials() {
            tracing::warn!("Langfuse keys are empty, tracing disabled");
            return None;
        }

        let client = match Client::builder()
            .timeout(Duration::from_secs(LANGFUSE_FLUSH_TIMEOUT_SECS))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build Langfuse client, tracing disabled");
                return None;
            }
        };

        let host = config.host.trim_end_matches('/');
        tracing::info!(
            host = %host,
            self_hosted = !host.starts_with("https://cloud.langfuse.com"),
            "Langfuse tracing enabled"
        );

        Some(Self {
            inner: Arc::new(Inner {
                client,
                endpoint: format!("{}/api/public/ingestion", host),
                public_key: public_key.clone(),
                secret_key: secret_key.clone(),
                buffer: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Start a trace; the trace-create event is buffered immediately
    pub fn trace(&self, name: &str, input: Value) -> Trace {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.push(
            "trace-create",
            json!({
                "id": id,
                "name": name,
                "input": input,
                "timestamp": rfc3339(now),
            }),
        );
        Trace {
            langfuse: self.clone(),
            id,
        }
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<IngestionEvent>> {
        // The buffer holds plain data, so a poisoned lock is still usable
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, kind: &'static str, body: Value) {
        let event = IngestionEvent {
            id: Uuid::new_v4().to_string(),
            timestamp: rfc3339(Utc::now()),
            kind,
            body,
        };
        self.buffer().push(event);
    }

    /// Number of events waiting to be sent
    pub fn pending(&self) -> usize {
        self.buffer().len()
    }

    /// Send all buffered events in one batch.
    ///
    /// Events are dropped from the buffer before sending; a failed batch is
    /// not retried.
    pub async fn flush(&self) -> Result<usize, LangfuseError> {
        let batch: Vec<IngestionEvent> = std::mem::take(&mut *self.buffer());
        if batch.is_empty() {
            return Ok(0);
        }

        let resp = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .basic_auth(&self.inner.public_key, Some(&self.inner.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LangfuseError::Status(status.as_u16()));
        }

        tracing::debug!(events = batch.len(), "Langfuse batch delivered");
        Ok(batch.len())
    }

    /// Flush on a background task, logging failures
    pub fn flush_in_background(&self) {
        let langfuse = self.clone();
        tokio::spawn(async move {
            if let Err(e) = langfuse.flush().await {
                tracing::warn!(error = %e, "Failed to flush Langfuse events");
            }
        });
    }
}

/// One evaluation trace
#[derive(Clone)]
pub struct Trace {
    langfuse: Langfuse,
    id: String,
}

impl Trace {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Record a finished stage
    pub fn span(
        &self,
        name: &str,
        started: DateTime<Utc>,
        input: Value,
        output: Value,
        metadata: Value,
    ) {
        self.langfuse.push(
            "span-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": self.id,
                "name": name,
                "startTime": rfc3339(started),
                "endTime": rfc3339(Utc::now()),
                "input": input,
                "output": output,
                "metadata": metadata,
            }),
        );
    }

    pub fn score(&self, name: &str, value: f64) {
        self.langfuse.push(
            "score-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": self.id,
                "name": name,
                "value": value,
            }),
        );
    }

    /// Upsert trace output and metadata
    pub fn update(&self, output: Value, metadata: Value) {
        self.langfuse.push(
            "trace-create",
            json!({
                "id": self.id,
                "output": output,
                "metadata": metadata,
            }),
        );
    }

    pub fn flush_in_background(&self) {
        self.langfuse.flush_in_background();
    }
}
