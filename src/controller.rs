//! Stream controller: composition root of the client core
//!
//! Owns the session, the turn assembler, and the audio bridge, and wires
//! their outputs to injected sinks. Presentation (UI) and audio devices
//! stay behind trait objects so the whole controller can be driven by
//! synthetic events in tests, without a live socket or sound card.
//!
//! Transport-level actions (dial, transmit, close, timers) are returned to
//! the caller; the tokio runtime in [`crate::transport`] executes them.

use std::sync::Arc;

use crate::audio::AudioBridge;
use crate::protocol::Envelope;
use crate::session::{
    Action, ClientConfig, ConnectionStatus, Session, SessionEvent, SessionMode,
};
use crate::turn::{TurnAssembler, TurnSignal};

/// Receives discrete presentation signals. Implementations must not block.
pub trait UiSink: Send + Sync {
    fn connection_status(&self, status: ConnectionStatus);
    fn indicator(&self, visible: bool);
    fn turn_started(&self, id: &str);
    /// `delta` is the newly arrived fragment, `text` the whole turn so far
    fn turn_text(&self, id: &str, delta: &str, text: &str);
    fn turn_audio_tagged(&self, id: &str);
    fn turn_completed(&self, id: &str);
}

/// Accepts raw PCM buffers for output
pub trait PlaybackSink: Send + Sync {
    fn play(&self, pcm: &[u8]);
}

/// Handle to a live capture source. Releasing it must synchronously stop
/// the device and its processing context.
pub trait CaptureHandle: Send {
    fn release(self: Box<Self>);
}

/// Client-side controller for one streaming session
pub struct StreamController {
    session: Session,
    assembler: TurnAssembler,
    bridge: AudioBridge,
    ui: Arc<dyn UiSink>,
    playback: Arc<dyn PlaybackSink>,
    capture: Option<Box<dyn CaptureHandle>>,
}

impl StreamController {
    pub fn new(
        config: ClientConfig,
        mode: SessionMode,
        ui: Arc<dyn UiSink>,
        playback: Arc<dyn PlaybackSink>,
    ) -> Self {
        Self {
            session: Session::new(config, mode),
            assembler: TurnAssembler::new(),
            bridge: AudioBridge::new(),
            ui,
            playback,
            capture: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn assembler(&self) -> &TurnAssembler {
        &self.assembler
    }

    pub fn is_recording(&self) -> bool {
        self.bridge.is_recording()
    }

    /// Start the initial dial
    pub fn connect(&mut self) -> Action {
        self.session.connect()
    }

    /// Process one transport event; returns the actions the runtime must
    /// execute. Status changes and inbound envelopes are consumed here.
    pub fn handle_event(&mut self, event: SessionEvent) -> Vec<Action> {
        let mut passthrough = Vec::new();
        for action in self.session.handle(event) {
            match action {
                Action::Status(status) => {
                    self.ui.connection_status(status);
                    if status != ConnectionStatus::Connected {
                        // Nothing is streaming over a dead transport
                        if let Some(signal) = self.assembler.connection_lost() {
                            self.apply_signal(signal);
                        }
                    }
                }
                Action::Inbound(envelope) => {
                    let mode = self.session.mode();
                    for signal in self.assembler.handle(&envelope, mode) {
                        self.apply_signal(signal);
                    }
                }
                other => passthrough.push(other),
            }
        }
        passthrough
    }

    /// Send a user text message. Returns the transmit action if the
    /// transport is open, `None` otherwise (best-effort delivery).
    pub fn send_text(&mut self, text: &str) -> Option<Action> {
        if text.is_empty() {
            return None;
        }
        let action = self.session.send(&Envelope::text(text))?;
        // The reply indicator goes up as soon as the message is away
        if let Some(signal) = self.assembler.expect_reply() {
            self.apply_signal(signal);
        }
        Some(action)
    }

    /// Handle one captured PCM frame: gate, encode, and hand off for
    /// transmission. Frames are dropped silently when recording is off or
    /// the transport is not open.
    pub fn capture_frame(&mut self, pcm: &[u8]) -> Option<Action> {
        let envelope = self.bridge.outbound_chunk(pcm)?;
        self.session.send(&envelope)
    }

    /// Open the recording gate and adopt the capture handle
    pub fn start_recording(&mut self, handle: Box<dyn CaptureHandle>) {
        if let Some(previous) = self.capture.take() {
            log::warn!("Replacing an existing capture handle");
            previous.release();
        }
        self.capture = Some(handle);
        self.bridge.set_recording(true);
    }

    /// Close the gate first, then synchronously release the capture
    /// source, so in-flight capture callbacks can no longer transmit.
    pub fn stop_recording(&mut self) {
        self.bridge.set_recording(false);
        if let Some(handle) = self.capture.take() {
            handle.release();
        }
    }

    /// Change session mode; re-dial handling lives in the session
    pub fn switch_mode(&mut self, mode: SessionMode) -> Vec<Action> {
        self.session.switch_mode(mode)
    }

    fn apply_signal(&mut self, signal: TurnSignal) {
        match signal {
            TurnSignal::IndicatorShown => self.ui.indicator(true),
            TurnSignal::IndicatorHidden => self.ui.indicator(false),
            TurnSignal::TurnStarted { id } => self.ui.turn_started(&id),
            TurnSignal::TurnText { id, delta, text } => self.ui.turn_text(&id, &delta, &text),
            TurnSignal::TurnAudioTagged { id } => self.ui.turn_audio_tagged(&id),
            TurnSignal::TurnCompleted { id } => self.ui.turn_completed(&id),
            TurnSignal::PlayAudio(pcm) => self.playback.play(&pcm),
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        // Never leak a live capture source
        if self.capture.is_some() {
            self.stop_recording();
        }
    }
}
