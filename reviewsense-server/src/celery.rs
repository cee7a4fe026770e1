//! Celery-protocol dispatcher over Redis.
//!
//! Tasks are published as Celery v1 messages (JSON task body, base64
//! wrapped in the broker envelope) onto the `celery` list, which is
//! where the Python worker pool consumes them. Results come back
//! through the Redis result backend under `celery-task-meta-<task_id>`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use reviewsense_core::{TaskDispatcher, TaskHandle};

/// Queue the worker pool consumes from.
const TASK_QUEUE: &str = "celery";
/// Key prefix used by the Celery Redis result backend.
const RESULT_KEY_PREFIX: &str = "celery-task-meta-";

pub struct CeleryDispatcher {
    conn: ConnectionManager,
    task_name: String,
}

impl CeleryDispatcher {
    pub fn new(conn: ConnectionManager, task_name: String) -> Self {
        Self { conn, task_name }
    }
}

#[async_trait]
impl TaskDispatcher for CeleryDispatcher {
    async fn dispatch(
        &self,
        payload: &[u8],
        correlation_token: &str,
    ) -> Result<Box<dyn TaskHandle>> {
        let task_id = Uuid::new_v4().to_string();

        // Celery v1 task body: positional args are the raw dataset
        // text and the caller's correlation token.
        let body = json!({
            "id": task_id,
            "task": self.task_name,
            "args": [String::from_utf8_lossy(payload), correlation_token],
            "kwargs": {},
            "retries": 0,
            "eta": null,
            "expires": null,
        });
        let body = BASE64.encode(serde_json::to_vec(&body).context("failed to encode task body")?);

        let message = json!({
            "body": body,
            "content-type": "application/json",
            "content-encoding": "utf-8",
            "headers": {},
            "properties": {
                "body_encoding": "base64",
                "correlation_id": task_id,
                "reply_to": Uuid::new_v4().to_string(),
                "delivery_mode": 2,
                "delivery_tag": Uuid::new_v4().to_string(),
                "delivery_info": {
                    "exchange": "",
                    "routing_key": TASK_QUEUE,
                },
                "priority": 0,
            },
        });

        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(TASK_QUEUE, serde_json::to_string(&message)?)
            .await
            .context("failed to publish task to broker")?;

        debug!(
            "Dispatched task {} ({}) as {}",
            task_id, correlation_token, self.task_name
        );

        Ok(Box::new(CeleryHandle {
            conn: self.conn.clone(),
            result_key: format!("{}{}", RESULT_KEY_PREFIX, task_id),
            meta: None,
        }))
    }
}

/// Result record written by the Celery backend.
#[derive(Debug, Clone, Deserialize)]
struct ResultMeta {
    status: String,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    traceback: Option<String>,
}

impl ResultMeta {
    fn is_terminal(&self) -> bool {
        self.status == "SUCCESS" || self.status == "FAILURE"
    }
}

struct CeleryHandle {
    conn: ConnectionManager,
    result_key: String,
    /// Terminal result meta cached by the last `is_ready` probe.
    meta: Option<ResultMeta>,
}

#[async_trait]
impl TaskHandle for CeleryHandle {
    async fn is_ready(&mut self) -> Result<bool> {
        if self.meta.is_some() {
            return Ok(true);
        }

        let raw: Option<String> = self
            .conn
            .get(&self.result_key)
            .await
            .context("failed to query result backend")?;

        let Some(raw) = raw else {
            return Ok(false);
        };

        let meta: ResultMeta =
            serde_json::from_str(&raw).context("unparseable result backend record")?;

        if meta.is_terminal() {
            self.meta = Some(meta);
            Ok(true)
        } else {
            // STARTED / RETRY: the worker picked it up but has not
            // finished.
            Ok(false)
        }
    }

    async fn fetch(&mut self) -> Result<serde_json::Value> {
        let meta = self
            .meta
            .take()
            .ok_or_else(|| anyhow!("fetch called before task was ready"))?;

        if meta.status == "FAILURE" {
            let detail = meta
                .traceback
                .unwrap_or_else(|| meta.result.to_string());
            return Err(anyhow!("task execution failed: {}", detail));
        }

        Ok(meta.result)
    }

    async fn release(&mut self) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(&self.result_key).await {
            warn!("Failed to clean up result key {}: {}", self.result_key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_meta_terminal_statuses() {
        for (status, terminal) in [
            ("SUCCESS", true),
            ("FAILURE", true),
            ("PENDING", false),
            ("STARTED", false),
            ("RETRY", false),
        ] {
            let meta: ResultMeta = serde_json::from_str(&format!(
                r#"{{"status": "{}", "result": null, "task_id": "abc"}}"#,
                status
            ))
            .unwrap();
            assert_eq!(meta.is_terminal(), terminal, "status {}", status);
        }
    }

    #[test]
    fn test_result_meta_parses_worker_payload() {
        let raw = r#"{
            "status": "SUCCESS",
            "result": {"status": "ok", "reviews": [], "clusters": []},
            "traceback": null,
            "task_id": "f9d0"
        }"#;
        let meta: ResultMeta = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.status, "SUCCESS");
        assert_eq!(meta.result["status"], "ok");
        assert!(meta.traceback.is_none());
    }

    #[test]
    fn test_task_message_body_roundtrip() {
        // The broker envelope's body must decode back to the task
        // message the Python worker expects.
        let body = json!({
            "id": "task-1",
            "task": "worker.process_file",
            "args": ["text,label\ngreat,", "analysis-7"],
            "kwargs": {},
            "retries": 0,
            "eta": null,
            "expires": null,
        });
        let encoded = BASE64.encode(serde_json::to_vec(&body).unwrap());
        let decoded: serde_json::Value =
            serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();

        assert_eq!(decoded["task"], "worker.process_file");
        assert_eq!(decoded["args"][1], "analysis-7");
    }
}
