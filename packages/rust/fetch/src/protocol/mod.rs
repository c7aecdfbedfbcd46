//! Page retrieval through a fetch tool server spoken to over stdio.
//!
//! One subprocess per request. The exchange is line-delimited JSON-RPC 2.0:
//!
//! 1. client → `initialize` (id 1)
//! 2. server → result carrying `protocolVersion`
//! 3. client → `notifications/initialized`, then `tools/call` (id 2)
//! 4. server → result with `content[0].text`, or an error
//!
//! Each outbound line is flushed before the next is written, so ordering is
//! guaranteed without sleeping between messages. The whole exchange is bounded
//! by one timeout, and the subprocess is always reaped.

pub mod message;
pub mod session;

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, instrument, warn};
use url::Url;

use askpage_shared::{AskPageError, FetchConfig, Result};

pub use session::{ProtocolSession, SessionEvent, SessionState};

const READ_CHUNK: usize = 8 * 1024;

/// Spawns the fetch tool server and runs one handshake per call.
#[derive(Debug, Clone)]
pub struct ProtocolClient {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    kill_grace: Duration,
    max_length_hint: usize,
}

impl ProtocolClient {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            command: config.protocol_command.clone(),
            args: config.protocol_args.clone(),
            timeout: config.protocol_timeout(),
            kill_grace: config.kill_grace(),
            max_length_hint: config.max_length_hint,
        }
    }

    /// Fetch `url` through the tool server.
    ///
    /// Errors are all recoverable: [`AskPageError::Protocol`] for spawn, I/O,
    /// early exit and server-reported failures, [`AskPageError::UpstreamTimeout`]
    /// when the exchange outlives the timeout.
    #[instrument(skip_all, fields(url = %url, command = %self.command))]
    pub async fn fetch(&self, url: &Url) -> Result<String> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(error = %e, "protocol process spawn failed");
                AskPageError::Protocol(format!(
                    "failed to spawn `{}`: {e}. Is it installed?",
                    self.command
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AskPageError::Protocol("failed to capture process stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AskPageError::Protocol("failed to capture process stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        let mut session = ProtocolSession::new();
        let exchange = self.exchange(&mut session, &mut stdin, stdout, &mut child, url);

        let outcome = tokio::time::timeout(self.timeout, exchange).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                session.settle(SessionState::TimedOut);
                warn!(timeout_ms = self.timeout.as_millis() as u64, "protocol fetch timed out");
                Err(AskPageError::UpstreamTimeout(format!(
                    "protocol fetch exceeded {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        debug!(state = ?session.state(), ok = result.is_ok(), "protocol exchange finished");
        terminate(child, stdin, self.kill_grace).await;

        if let Ok(text) = &result {
            info!(chars = text.chars().count(), "fetched via protocol");
        }
        result
    }

    /// Drive the handshake until the session resolves.
    async fn exchange(
        &self,
        session: &mut ProtocolSession,
        stdin: &mut ChildStdin,
        mut stdout: ChildStdout,
        child: &mut Child,
        url: &Url,
    ) -> Result<String> {
        write_line(stdin, &message::initialize_request()?)
            .await
            .inspect_err(|_| {
                session.settle(SessionState::ProcessError);
            })?;
        session.mark_initializing();

        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            tokio::select! {
                // Drain stdout before noticing the exit, so a response
                // written just before exiting is not lost.
                biased;

                read = stdout.read(&mut chunk) => {
                    let n = read.map_err(|e| {
                        session.settle(SessionState::ProcessError);
                        AskPageError::Protocol(format!("failed to read process stdout: {e}"))
                    })?;

                    if n == 0 {
                        session.settle(SessionState::ProcessClosed);
                        return Err(AskPageError::Protocol(format!(
                            "process closed stdout before responding (state {:?})",
                            session.state()
                        )));
                    }

                    for line in session.feed(&chunk[..n])? {
                        match session.handle_line(&line) {
                            SessionEvent::Ignored => {}
                            SessionEvent::Initialized { protocol_version } => {
                                debug!(%protocol_version, "protocol initialized");

                                write_line(stdin, &message::initialized_notification()?)
                                    .await
                                    .inspect_err(|_| {
                                        session.settle(SessionState::ProcessError);
                                    })?;
                                session.mark_notification_sent();

                                let call = message::fetch_call(url.as_str(), self.max_length_hint)?;
                                write_line(stdin, &call).await.inspect_err(|_| {
                                    session.settle(SessionState::ProcessError);
                                })?;
                                session.mark_request_sent();
                            }
                            SessionEvent::Completed(text) => return Ok(text),
                            SessionEvent::Failed(msg) => {
                                warn!(error = %msg, "protocol fetch failed");
                                return Err(AskPageError::Protocol(msg));
                            }
                        }
                    }
                }

                status = child.wait() => {
                    session.settle(SessionState::ProcessClosed);
                    let status = status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|e| e.to_string());
                    return Err(AskPageError::Protocol(format!(
                        "process exited before responding ({status})"
                    )));
                }
            }
        }
    }
}

/// Write one line and flush it.
async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<()> {
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| AskPageError::Protocol(format!("failed to write to process stdin: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| AskPageError::Protocol(format!("failed to flush process stdin: {e}")))
}

/// Close stdin, give the process a moment to exit, then kill it.
async fn terminate(mut child: Child, stdin: ChildStdin, grace: Duration) {
    drop(stdin);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "protocol process exited"),
        Ok(Err(e)) => warn!(error = %e, "protocol process wait error"),
        Err(_) => match child.kill().await {
            Ok(()) => debug!("protocol process killed"),
            Err(e) => warn!(error = %e, "failed to kill protocol process"),
        },
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "askpage_fetch::protocol::stderr", "{line}");
    }
}
