//! Per-request handshake state and stdout line framing.
//!
//! [`ProtocolSession`] is pure: it never touches the process. The driver in
//! [`super::ProtocolClient`] feeds it stdout bytes and acts on the returned
//! [`SessionEvent`]s.

use tracing::{debug, warn};

use askpage_shared::{AskPageError, Result};

use super::message::{self, FETCH_CALL_ID, Incoming, ToolOutput};

/// Upper bound on a buffered, not yet newline-terminated stdout line.
pub const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Where the handshake stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawned,
    Initializing,
    Initialized,
    NotificationSent,
    RequestSent,
    ResponseReceived,
    TimedOut,
    ProcessError,
    ProcessClosed,
}

impl SessionState {
    /// Once terminal, the session resolves nothing else.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResponseReceived | Self::TimedOut | Self::ProcessError | Self::ProcessClosed
        )
    }
}

/// What the driver should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Ignored,
    /// Send the notification, then the fetch call.
    Initialized { protocol_version: String },
    Completed(String),
    Failed(String),
}

#[derive(Debug)]
pub struct ProtocolSession {
    state: SessionState,
    initialized: bool,
    notification_sent: bool,
    request_sent: bool,
    response_received: bool,
    /// Bytes after the last newline.
    output_buffer: Vec<u8>,
}

impl Default for ProtocolSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Spawned,
            initialized: false,
            notification_sent: false,
            request_sent: false,
            response_received: false,
            output_buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn notification_sent(&self) -> bool {
        self.notification_sent
    }

    pub fn request_sent(&self) -> bool {
        self.request_sent
    }

    pub fn response_received(&self) -> bool {
        self.response_received
    }

    pub fn mark_initializing(&mut self) {
        if self.state == SessionState::Spawned {
            self.state = SessionState::Initializing;
        }
    }

    pub fn mark_notification_sent(&mut self) {
        if !self.state.is_terminal() {
            self.notification_sent = true;
            self.state = SessionState::NotificationSent;
        }
    }

    pub fn mark_request_sent(&mut self) {
        if !self.state.is_terminal() {
            self.request_sent = true;
            self.state = SessionState::RequestSent;
        }
    }

    /// Resolve with a failure state. Returns `false` if already resolved.
    pub fn settle(&mut self, terminal: SessionState) -> bool {
        debug_assert!(terminal.is_terminal());
        if self.state.is_terminal() {
            return false;
        }
        debug!(from = ?self.state, to = ?terminal, "protocol session settled");
        self.state = terminal;
        true
    }

    /// Append a stdout chunk and return every complete line, trimmed.
    ///
    /// A trailing partial line stays buffered for the next chunk. A partial
    /// line longer than [`MAX_PENDING_BYTES`] settles the session as
    /// [`SessionState::ProcessError`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.output_buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.output_buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.output_buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).trim().to_string());
        }

        if self.output_buffer.len() > MAX_PENDING_BYTES {
            let pending = self.output_buffer.len();
            self.output_buffer.clear();
            self.settle(SessionState::ProcessError);
            warn!(pending, "protocol output line too long");
            return Err(AskPageError::Protocol(format!(
                "process wrote {pending} bytes without a newline"
            )));
        }
        Ok(lines)
    }

    /// Interpret one complete stdout line.
    pub fn handle_line(&mut self, line: &str) -> SessionEvent {
        if self.state.is_terminal() || line.is_empty() {
            return SessionEvent::Ignored;
        }

        let incoming: Incoming = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, line = %truncate(line, 200), "ignoring unparseable protocol line");
                return SessionEvent::Ignored;
            }
        };

        if let Some(result) = &incoming.result {
            if !self.initialized {
                if let Some(version) = message::protocol_version(result) {
                    self.initialized = true;
                    self.state = SessionState::Initialized;
                    return SessionEvent::Initialized {
                        protocol_version: version.to_string(),
                    };
                }
            }

            if incoming.has_id(FETCH_CALL_ID) {
                self.response_received = true;
                self.state = SessionState::ResponseReceived;
                return match message::tool_output(result) {
                    ToolOutput::Text(text) => SessionEvent::Completed(text),
                    ToolOutput::ToolError(msg) => SessionEvent::Failed(format!("fetch tool error: {msg}")),
                    ToolOutput::Empty => {
                        SessionEvent::Failed("fetch tool returned no text content".into())
                    }
                };
            }
        }

        if let Some(error) = &incoming.error {
            self.response_received = true;
            self.state = SessionState::ResponseReceived;
            return SessionEvent::Failed(format!(
                "server error {}: {}",
                error.code, error.message
            ));
        }

        debug!(line = %truncate(line, 200), "ignoring protocol message");
        SessionEvent::Ignored
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT_ACK: &str =
        r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}"#;
    const FETCH_OK: &str =
        r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"Page body"}]}}"#;

    #[test]
    fn feed_keeps_partial_tail() {
        let mut session = ProtocolSession::new();
        assert!(session.feed(b"{\"a\":").unwrap().is_empty());
        assert_eq!(session.feed(b"1}\n{\"b\"").unwrap(), vec![r#"{"a":1}"#]);
        assert_eq!(session.feed(b":2}\r\n\n").unwrap(), vec![r#"{"b":2}"#, ""]);
        assert!(session.output_buffer.is_empty());
    }

    #[test]
    fn feed_handles_multibyte_split_across_chunks() {
        let mut session = ProtocolSession::new();
        let bytes = "联系\n".as_bytes();
        assert!(session.feed(&bytes[..2]).unwrap().is_empty());
        assert_eq!(session.feed(&bytes[2..]).unwrap(), vec!["联系"]);
    }

    #[test]
    fn unterminated_output_is_capped() {
        let mut session = ProtocolSession::new();
        session.mark_initializing();

        let chunk = vec![b'x'; MAX_PENDING_BYTES];
        assert!(session.feed(&chunk).unwrap().is_empty());

        let err = session.feed(b"x").unwrap_err();
        assert!(matches!(err, AskPageError::Protocol(_)), "{err}");
        assert_eq!(session.state(), SessionState::ProcessError);
        assert!(session.output_buffer.is_empty());
    }

    #[test]
    fn long_complete_lines_are_not_capped() {
        let mut session = ProtocolSession::new();
        let mut chunk = vec![b'x'; MAX_PENDING_BYTES];
        chunk.extend_from_slice(b"\ntail");
        let lines = session.feed(&chunk).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(session.output_buffer, b"tail");
    }

    #[test]
    fn happy_path_transitions() {
        let mut session = ProtocolSession::new();
        session.mark_initializing();
        assert_eq!(session.state(), SessionState::Initializing);

        assert_eq!(
            session.handle_line(INIT_ACK),
            SessionEvent::Initialized {
                protocol_version: "2024-11-05".into()
            }
        );
        assert!(session.is_initialized());

        session.mark_notification_sent();
        session.mark_request_sent();
        assert!(session.notification_sent() && session.request_sent());
        assert_eq!(session.state(), SessionState::RequestSent);

        assert_eq!(
            session.handle_line(FETCH_OK),
            SessionEvent::Completed("Page body".into())
        );
        assert!(session.response_received());
        assert_eq!(session.state(), SessionState::ResponseReceived);
    }

    #[test]
    fn malformed_lines_are_ignored() {
        let mut session = ProtocolSession::new();
        assert_eq!(session.handle_line("Installing packages..."), SessionEvent::Ignored);
        assert_eq!(session.handle_line("{not json"), SessionEvent::Ignored);
        assert_eq!(session.state(), SessionState::Spawned);
    }

    #[test]
    fn second_initialize_ack_is_not_reinitialization() {
        let mut session = ProtocolSession::new();
        session.handle_line(INIT_ACK);
        assert_eq!(session.handle_line(INIT_ACK), SessionEvent::Ignored);
    }

    #[test]
    fn error_object_fails_the_session() {
        let mut session = ProtocolSession::new();
        session.handle_line(INIT_ACK);
        let event = session.handle_line(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32603,"message":"fetch failed"}}"#,
        );
        assert_eq!(
            event,
            SessionEvent::Failed("server error -32603: fetch failed".into())
        );
        assert_eq!(session.state(), SessionState::ResponseReceived);
    }

    #[test]
    fn tool_error_fails_the_session() {
        let mut session = ProtocolSession::new();
        session.handle_line(INIT_ACK);
        let event = session.handle_line(
            r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"robots.txt disallows"}],"isError":true}}"#,
        );
        assert!(matches!(event, SessionEvent::Failed(msg) if msg.contains("robots.txt")));
    }

    #[test]
    fn nothing_resolves_after_settling() {
        let mut session = ProtocolSession::new();
        session.handle_line(INIT_ACK);
        assert!(session.settle(SessionState::TimedOut));
        assert!(!session.settle(SessionState::ProcessClosed));
        assert_eq!(session.handle_line(FETCH_OK), SessionEvent::Ignored);
        assert_eq!(session.state(), SessionState::TimedOut);
    }

    #[test]
    fn settle_after_response_is_a_no_op() {
        let mut session = ProtocolSession::new();
        session.handle_line(INIT_ACK);
        session.handle_line(FETCH_OK);
        assert!(!session.settle(SessionState::ProcessClosed));
        assert_eq!(session.state(), SessionState::ResponseReceived);
    }

    #[test]
    fn unrelated_messages_are_ignored() {
        let mut session = ProtocolSession::new();
        session.handle_line(INIT_ACK);
        let note = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#;
        assert_eq!(session.handle_line(note), SessionEvent::Ignored);
        assert_eq!(
            session.handle_line(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#),
            SessionEvent::Ignored
        );
    }
}
