//! Streaming text/audio client for the Jarvis agent server
//!
//! Connects to `ws(s)://<host>/ws/<session_id>?is_audio=<bool>` and keeps
//! the session alive indefinitely: every close, intentional or not, is
//! followed by exactly one re-dial after a fixed delay. Inbound envelopes
//! are reassembled into logical turns (text deltas in arrival order, audio
//! forwarded to a playback sink); outbound audio is gated on the recording
//! flag at transmission time.
//!
//! # Architecture
//!
//! ```text
//! socket events ──┐
//! reconnect timer ├──▶ one mpsc channel ──▶ StreamController
//! user commands ──┘                           ├─ Session (lifecycle reducer)
//! capture frames                              ├─ TurnAssembler (turn state)
//!                                             └─ AudioBridge (gate + base64)
//!                                                   │
//!                                  UiSink / PlaybackSink (injected)
//! ```
//!
//! The core types are pure and single-threaded; only [`transport`] touches
//! tokio and the socket.

pub mod audio;
pub mod controller;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod turn;

pub use controller::{CaptureHandle, PlaybackSink, StreamController, UiSink};
pub use protocol::{DecodeError, Envelope, PayloadKind, MIME_AUDIO_PCM, MIME_TEXT};
pub use session::{
    Action, ClientConfig, ConnectionStatus, Session, SessionEvent, SessionMode, TransportState,
    DEFAULT_SERVER_URL, RECONNECT_DELAY,
};
pub use transport::{client_channel, ClientEvent, ClientRuntime};
pub use turn::{Turn, TurnAssembler, TurnSignal};
