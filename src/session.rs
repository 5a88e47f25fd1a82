//! Session connection lifecycle
//!
//! Sole owner of the transport state. The session is a pure reducer: every
//! transport event goes through [`Session::handle`], which returns the
//! [`Action`]s the runtime must execute. No I/O happens here, so the whole
//! reconnection graph can be driven by synthetic event sequences in tests.
//!
//! # Lifecycle
//!
//! `Connecting → Open` on open, `Open → Closed` on close, and `Closed →
//! Connecting` after a fixed 5 s delay. Reconnection is unconditional and
//! unbounded; availability wins over fast-fail. A transport error only
//! updates the status overlay, the close event that follows it is the
//! single reconnection trigger.
//!
//! Each dial gets a fresh attempt number; events tagged with a stale
//! attempt are dropped, so a socket torn down during a mode switch can
//! never schedule a duplicate reconnect.

use std::time::Duration;

use uuid::Uuid;

use crate::protocol::{self, Envelope};

/// Fixed reconnection delay. No jitter, no backoff growth, no retry limit.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default endpoint of the agent server
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";

/// Client-side connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `ws://localhost:8000` or `wss://agent.example.com`
    pub server_url: String,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Session flavor, encoded in the connection target at dial time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Text,
    Audio,
}

impl SessionMode {
    pub fn is_audio(self) -> bool {
        self == SessionMode::Audio
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed,
}

/// Status overlay reported to the UI sink; not a state in the
/// reconnection graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

/// Transport events, tagged with the dial attempt that produced them
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Opened { attempt: u64 },
    Frame { attempt: u64, frame: String },
    Closed { attempt: u64 },
    Errored { attempt: u64, reason: String },
    /// The fixed reconnect delay elapsed
    ReconnectDue,
}

/// What the runtime must do after a reduction
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Establish a transport to `url`, tagging its events with `attempt`
    Dial { attempt: u64, url: String },
    /// Send a serialized frame over the open transport
    Transmit(String),
    /// Tear down the current transport (its close event drives recovery)
    CloseTransport,
    /// Fire a `ReconnectDue` event after the delay
    ScheduleReconnect(Duration),
    /// Status change for the UI sink
    Status(ConnectionStatus),
    /// Decoded envelope for the turn assembler / audio bridge
    Inbound(Envelope),
}

/// Client session: identifier, mode, and transport state
///
/// Created once per client instance and reused across reconnects.
#[derive(Debug)]
pub struct Session {
    id: String,
    config: ClientConfig,
    mode: SessionMode,
    state: TransportState,
    attempt: u64,
    reconnect_pending: bool,
}

impl Session {
    pub fn new(config: ClientConfig, mode: SessionMode) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            config,
            mode,
            state: TransportState::Closed,
            attempt: 0,
            reconnect_pending: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Current dial attempt; the runtime tags transport events with this
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    fn url(&self) -> String {
        format!(
            "{}/ws/{}?is_audio={}",
            self.config.server_url.trim_end_matches('/'),
            self.id,
            self.mode.is_audio()
        )
    }

    /// Start a new dial with the session's current mode
    pub fn connect(&mut self) -> Action {
        self.attempt += 1;
        self.state = TransportState::Connecting;
        log::info!(
            "Connecting to {} (attempt {})",
            self.url(),
            self.attempt
        );
        Action::Dial {
            attempt: self.attempt,
            url: self.url(),
        }
    }

    /// Reduce one transport event into follow-up actions
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Action> {
        if let Some(attempt) = event_attempt(&event) {
            if attempt != self.attempt {
                log::debug!(
                    "Ignoring stale transport event (attempt {}, current {})",
                    attempt,
                    self.attempt
                );
                return Vec::new();
            }
        }

        match event {
            SessionEvent::Opened { .. } => {
                if self.state != TransportState::Connecting {
                    log::debug!("Ignoring open in state {:?}", self.state);
                    return Vec::new();
                }
                log::info!("Connection opened");
                self.state = TransportState::Open;
                vec![Action::Status(ConnectionStatus::Connected)]
            }
            SessionEvent::Frame { frame, .. } => match protocol::decode(&frame) {
                Ok(envelope) => vec![Action::Inbound(envelope)],
                Err(e) => {
                    // Non-fatal: drop the frame, the connection stays open
                    log::warn!("Protocol error, dropping frame: {}", e);
                    Vec::new()
                }
            },
            SessionEvent::Closed { .. } => {
                log::info!("Connection closed, reconnecting in {:?}", self.config.reconnect_delay);
                self.state = TransportState::Closed;
                let mut actions = vec![Action::Status(ConnectionStatus::Disconnected)];
                if !self.reconnect_pending {
                    self.reconnect_pending = true;
                    actions.push(Action::ScheduleReconnect(self.config.reconnect_delay));
                }
                actions
            }
            SessionEvent::Errored { reason, .. } => {
                // The close event that follows is the reconnection trigger
                log::warn!("Transport error: {}", reason);
                vec![Action::Status(ConnectionStatus::Error)]
            }
            SessionEvent::ReconnectDue => {
                self.reconnect_pending = false;
                if self.state == TransportState::Closed {
                    vec![self.connect()]
                } else {
                    log::debug!("Reconnect timer fired while {:?}, skipping", self.state);
                    Vec::new()
                }
            }
        }
    }

    /// Transmit an envelope, but only while the transport is open.
    /// Anything else is a silent no-op: at-most-once delivery.
    pub fn send(&self, envelope: &Envelope) -> Option<Action> {
        if self.state != TransportState::Open {
            return None;
        }
        match protocol::encode(envelope) {
            Ok(frame) => Some(Action::Transmit(frame)),
            Err(e) => {
                log::warn!("Failed to encode outbound envelope: {}", e);
                None
            }
        }
    }

    /// Change the session mode and re-dial as needed.
    ///
    /// An open (or in-flight) transport is closed so the close-driven
    /// reconnect picks the new mode up; with a reconnect already pending
    /// the timer does the same; otherwise dial immediately.
    pub fn switch_mode(&mut self, mode: SessionMode) -> Vec<Action> {
        log::info!("Switching mode to {:?}", mode);
        self.mode = mode;
        match self.state {
            TransportState::Open | TransportState::Connecting => vec![Action::CloseTransport],
            TransportState::Closed if self.reconnect_pending => Vec::new(),
            TransportState::Closed => vec![self.connect()],
        }
    }
}

fn event_attempt(event: &SessionEvent) -> Option<u64> {
    match event {
        SessionEvent::Opened { attempt }
        | SessionEvent::Frame { attempt, .. }
        | SessionEvent::Closed { attempt }
        | SessionEvent::Errored { attempt, .. } => Some(*attempt),
        SessionEvent::ReconnectDue => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session(mode: SessionMode) -> Session {
        let mut session = Session::new(ClientConfig::default(), mode);
        let _ = session.connect();
        let attempt = session.attempt();
        session.handle(SessionEvent::Opened { attempt });
        assert_eq!(session.state(), TransportState::Open);
        session
    }

    fn count_reconnects(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::ScheduleReconnect(_)))
            .count()
    }

    #[test]
    fn test_connect_builds_mode_parameterized_url() {
        let mut session = Session::new(ClientConfig::default(), SessionMode::Text);
        match session.connect() {
            Action::Dial { attempt, url } => {
                assert_eq!(attempt, 1);
                assert!(url.starts_with("ws://localhost:8000/ws/"));
                assert!(url.contains(session.id()));
                assert!(url.ends_with("is_audio=false"));
            }
            other => panic!("Expected Dial, got {:?}", other),
        }
        assert_eq!(session.state(), TransportState::Connecting);
    }

    #[test]
    fn test_open_reports_connected() {
        let mut session = Session::new(ClientConfig::default(), SessionMode::Text);
        session.connect();
        let actions = session.handle(SessionEvent::Opened { attempt: 1 });
        assert_eq!(actions, vec![Action::Status(ConnectionStatus::Connected)]);
    }

    #[test]
    fn test_close_schedules_exactly_one_reconnect() {
        let mut session = open_session(SessionMode::Text);
        let attempt = session.attempt();

        let actions = session.handle(SessionEvent::Closed { attempt });
        assert_eq!(session.state(), TransportState::Closed);
        assert_eq!(count_reconnects(&actions), 1);
        assert!(actions.contains(&Action::Status(ConnectionStatus::Disconnected)));

        // A second close for the same attempt must not double-schedule
        let actions = session.handle(SessionEvent::Closed { attempt });
        assert_eq!(count_reconnects(&actions), 0);
    }

    #[test]
    fn test_error_never_schedules_reconnect() {
        let mut session = open_session(SessionMode::Text);
        let attempt = session.attempt();

        let actions = session.handle(SessionEvent::Errored {
            attempt,
            reason: "broken pipe".to_string(),
        });
        assert_eq!(actions, vec![Action::Status(ConnectionStatus::Error)]);

        // The subsequent close is the sole recovery trigger
        let actions = session.handle(SessionEvent::Closed { attempt });
        assert_eq!(count_reconnects(&actions), 1);
    }

    #[test]
    fn test_reconnect_due_dials_with_current_mode() {
        let mut session = open_session(SessionMode::Text);
        let attempt = session.attempt();
        session.handle(SessionEvent::Closed { attempt });

        // Mode changes after the close but before the timer fires
        let actions = session.switch_mode(SessionMode::Audio);
        assert!(actions.is_empty(), "pending timer must not duplicate");

        let actions = session.handle(SessionEvent::ReconnectDue);
        match &actions[..] {
            [Action::Dial { url, .. }] => assert!(url.ends_with("is_audio=true")),
            other => panic!("Expected one Dial, got {:?}", other),
        }
    }

    #[test]
    fn test_reconnect_due_skipped_when_already_connected() {
        let mut session = open_session(SessionMode::Text);
        // e.g. a direct connect won the race against the timer
        let actions = session.handle(SessionEvent::ReconnectDue);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_send_gated_on_open_transport() {
        let mut session = Session::new(ClientConfig::default(), SessionMode::Text);
        let envelope = Envelope::text("hi");

        // Closed: silent no-op
        assert!(session.send(&envelope).is_none());

        session.connect();
        // Connecting: still a no-op
        assert!(session.send(&envelope).is_none());

        let attempt = session.attempt();
        session.handle(SessionEvent::Opened { attempt });
        match session.send(&envelope) {
            Some(Action::Transmit(frame)) => assert!(frame.contains("\"data\":\"hi\"")),
            other => panic!("Expected Transmit, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_mode_while_open_closes_transport() {
        let mut session = open_session(SessionMode::Text);
        let actions = session.switch_mode(SessionMode::Audio);
        assert_eq!(actions, vec![Action::CloseTransport]);
        assert_eq!(session.mode(), SessionMode::Audio);
    }

    #[test]
    fn test_switch_mode_while_idle_dials_directly() {
        let mut session = Session::new(ClientConfig::default(), SessionMode::Text);
        let actions = session.switch_mode(SessionMode::Audio);
        match &actions[..] {
            [Action::Dial { url, .. }] => assert!(url.ends_with("is_audio=true")),
            other => panic!("Expected one Dial, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_attempt_events_are_dropped() {
        let mut session = open_session(SessionMode::Text);
        let old_attempt = session.attempt();
        session.handle(SessionEvent::Closed { attempt: old_attempt });
        session.handle(SessionEvent::ReconnectDue);
        assert_eq!(session.state(), TransportState::Connecting);

        // A straggling close from the torn-down socket must not touch the
        // new connection or schedule anything
        let actions = session.handle(SessionEvent::Closed { attempt: old_attempt });
        assert!(actions.is_empty());
        assert_eq!(session.state(), TransportState::Connecting);
    }

    #[test]
    fn test_malformed_frame_is_non_fatal() {
        let mut session = open_session(SessionMode::Text);
        let attempt = session.attempt();

        let actions = session.handle(SessionEvent::Frame {
            attempt,
            frame: "{broken".to_string(),
        });
        assert!(actions.is_empty());
        assert_eq!(session.state(), TransportState::Open);

        // Well-formed frames keep flowing afterwards
        let actions = session.handle(SessionEvent::Frame {
            attempt,
            frame: r#"{"mime_type":"text/plain","data":"ok"}"#.to_string(),
        });
        assert!(matches!(&actions[..], [Action::Inbound(env)] if env.data == "ok"));
    }

    #[test]
    fn test_session_id_stable_across_reconnects() {
        let mut session = open_session(SessionMode::Text);
        let id = session.id().to_string();
        let attempt = session.attempt();

        session.handle(SessionEvent::Closed { attempt });
        let actions = session.handle(SessionEvent::ReconnectDue);
        match &actions[..] {
            [Action::Dial { url, .. }] => assert!(url.contains(&id)),
            other => panic!("Expected Dial, got {:?}", other),
        }
        assert_eq!(session.id(), id);
    }
}
