//! Production driver: one sidecar process per handle speaking newline-delimited JSON.
//!
//! Requests are `{"id": n, "op": "...", ...}`; the sidecar answers each with
//! `{"id": n, "ok": true, ...}` or `{"id": n, "ok": false, "error": {"code", "message"}}`.
//! Responses to requests that already timed out are skipped by id.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::room_automation::{
    duration_ms, HandleError, PlaybackStep, RoomAutomation, RoomEvent, RoomHandle, RoomTarget,
    SessionTemplate,
};

#[derive(Debug, Clone)]
pub struct SidecarConfig {
    pub executable: String,
    pub args: Vec<String>,
    pub open_timeout_ms: u64,
    pub capture_timeout_ms: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            executable: "spirit-room-sidecar".to_string(),
            args: Vec::new(),
            open_timeout_ms: 30_000,
            capture_timeout_ms: 600_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SidecarRoomAutomation {
    config: SidecarConfig,
}

impl SidecarRoomAutomation {
    pub fn new(config: SidecarConfig) -> Result<Self, HandleError> {
        if config.executable.trim().is_empty() {
            return Err(HandleError::Failed(
                "room sidecar executable cannot be empty".to_string(),
            ));
        }
        Ok(Self { config })
    }

    fn spawn(&self) -> Result<SidecarProcess, HandleError> {
        let mut command = Command::new(self.config.executable.trim());
        command.kill_on_drop(true);
        command.args(&self.config.args);
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::inherit());
        let mut child = command.spawn().map_err(|error| {
            HandleError::Failed(format!(
                "failed to spawn room sidecar '{}': {error}",
                self.config.executable
            ))
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(HandleError::Failed(
                "room sidecar stdio was not captured".to_string(),
            ));
        };
        Ok(SidecarProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            closed: false,
        })
    }
}

#[async_trait]
impl RoomAutomation for SidecarRoomAutomation {
    async fn open_session(
        &self,
        template: &SessionTemplate,
    ) -> Result<Box<dyn RoomHandle>, HandleError> {
        let mut process = self.spawn()?;
        let opened = process
            .call(
                json!({ "op": "open", "template": template.as_value() }),
                Duration::from_millis(self.config.open_timeout_ms),
            )
            .await;
        if let Err(error) = opened {
            process.terminate().await;
            return Err(error);
        }
        Ok(Box::new(process))
    }

    async fn capture_template(&self) -> Result<SessionTemplate, HandleError> {
        let mut process = self.spawn()?;
        let response = process
            .call(
                json!({ "op": "capture_template" }),
                Duration::from_millis(self.config.capture_timeout_ms),
            )
            .await;
        let _ = process.close().await;
        match response?.template {
            Some(template) => Ok(SessionTemplate::new(template)),
            None => Err(HandleError::Failed(
                "room sidecar returned no template".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SidecarResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    error: Option<SidecarError>,
    #[serde(default)]
    events: Vec<RoomEvent>,
    #[serde(default)]
    template: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SidecarError {
    code: String,
    #[serde(default)]
    message: String,
}

struct SidecarProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl SidecarProcess {
    async fn call(
        &mut self,
        mut request: Value,
        timeout: Duration,
    ) -> Result<SidecarResponse, HandleError> {
        if self.closed {
            return Err(HandleError::Closed);
        }
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        let operation = request["op"].as_str().unwrap_or("unknown").to_string();
        request["id"] = json!(id);

        let mut line = request.to_string();
        line.push('\n');
        if let Err(error) = self.write_line(&line).await {
            warn!(operation = %operation, error = %error, "room sidecar stdin closed");
            self.closed = true;
            return Err(HandleError::Closed);
        }

        let response = match tokio::time::timeout(timeout, self.read_response(id)).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(HandleError::Timeout {
                    operation,
                    timeout_ms: duration_ms(timeout),
                })
            }
        };
        if response.ok {
            return Ok(response);
        }

        let error = response.error.unwrap_or(SidecarError {
            code: "failed".to_string(),
            message: "room sidecar reported failure without detail".to_string(),
        });
        match error.code.as_str() {
            "closed" => {
                self.closed = true;
                Err(HandleError::Closed)
            }
            "timeout" => Err(HandleError::Timeout {
                operation,
                timeout_ms: duration_ms(timeout),
            }),
            _ => Err(HandleError::Failed(error.message)),
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await
    }

    async fn read_response(&mut self, id: u64) -> Result<SidecarResponse, HandleError> {
        loop {
            let line = match self.stdout.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => {
                    self.closed = true;
                    return Err(HandleError::Closed);
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SidecarResponse>(trimmed) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(response) => {
                    debug!(expected = id, received = response.id, "skipping stale sidecar response");
                }
                Err(error) => {
                    debug!(error = %error, "skipping non-protocol sidecar output");
                }
            }
        }
    }

    async fn terminate(&mut self) {
        self.closed = true;
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

#[async_trait]
impl RoomHandle for SidecarProcess {
    async fn join_room(
        &mut self,
        target: &RoomTarget,
        timeout: Duration,
    ) -> Result<(), HandleError> {
        self.call(
            json!({
                "op": "join",
                "url": target.url,
                "room_key": target.room_key,
                "timeout_ms": duration_ms(timeout),
            }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn poll_events(&mut self, timeout: Duration) -> Result<Vec<RoomEvent>, HandleError> {
        self.call(json!({ "op": "poll" }), timeout)
            .await
            .map(|response| response.events)
    }

    async fn send_text(&mut self, text: &str, timeout: Duration) -> Result<(), HandleError> {
        self.call(json!({ "op": "send", "text": text }), timeout)
            .await
            .map(|_| ())
    }

    async fn playback_step(
        &mut self,
        step: &PlaybackStep,
        timeout: Duration,
    ) -> Result<(), HandleError> {
        self.call(
            json!({
                "op": "playback",
                "step": step,
                "timeout_ms": duration_ms(timeout),
            }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn close(&mut self) -> Result<(), HandleError> {
        if self.closed {
            return Ok(());
        }
        let _ = self
            .call(json!({ "op": "close" }), Duration::from_secs(5))
            .await;
        self.terminate().await;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
