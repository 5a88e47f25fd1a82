//! Turn assembly for the inbound envelope stream
//!
//! A turn is one logical streamed response: a run of content envelopes
//! terminated by a `turn_complete` marker. The assembler reconstructs turns
//! from envelopes in arrival order and owns the streaming-indicator state.
//!
//! The assembler is pure: it mutates only its own state and describes
//! everything the outside world should do as [`TurnSignal`]s, so envelope
//! sequences can be replayed deterministically in tests.

use uuid::Uuid;

use crate::audio;
use crate::protocol::{Envelope, PayloadKind};
use crate::session::SessionMode;

/// One logical streamed response unit
#[derive(Debug, Clone)]
pub struct Turn {
    /// Opaque identifier, unique per turn
    pub id: String,
    /// Accumulated text in exact arrival order
    pub text: String,
    /// Whether the audio indicator has been signaled for this turn
    pub has_audio_tag: bool,
}

impl Turn {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            text: String::new(),
            has_audio_tag: false,
        }
    }
}

/// Discrete signals emitted towards the UI and playback sinks
#[derive(Debug, Clone, PartialEq)]
pub enum TurnSignal {
    /// Awaiting the first content of a new turn
    IndicatorShown,
    IndicatorHidden,
    TurnStarted { id: String },
    /// `delta` is the newly appended fragment, `text` the full buffer
    TurnText { id: String, delta: String, text: String },
    /// Signaled at most once per turn
    TurnAudioTagged { id: String },
    TurnCompleted { id: String },
    /// Decoded PCM bytes for the playback sink
    PlayAudio(Vec<u8>),
}

/// Reconstructs logical turns from the ordered envelope stream
///
/// Owns the current turn exclusively; never two turns open concurrently.
#[derive(Debug, Default)]
pub struct TurnAssembler {
    current: Option<Turn>,
    indicator_visible: bool,
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently open turn, if any
    pub fn current(&self) -> Option<&Turn> {
        self.current.as_ref()
    }

    pub fn indicator_visible(&self) -> bool {
        self.indicator_visible
    }

    /// Mark that a user message went out and a reply is awaited
    pub fn expect_reply(&mut self) -> Option<TurnSignal> {
        self.show_indicator()
    }

    /// Hide the indicator when the transport drops mid-turn
    pub fn connection_lost(&mut self) -> Option<TurnSignal> {
        self.hide_indicator()
    }

    /// Process one inbound envelope in arrival order
    pub fn handle(&mut self, envelope: &Envelope, mode: SessionMode) -> Vec<TurnSignal> {
        let mut signals = Vec::new();

        // A boundary envelope carries no renderable content regardless of
        // its mime type.
        if envelope.is_turn_boundary() {
            signals.extend(self.hide_indicator());
            if let Some(turn) = self.current.take() {
                log::info!("Turn {} complete ({} chars)", turn.id, turn.text.len());
                signals.push(TurnSignal::TurnCompleted { id: turn.id });
            }
            return signals;
        }

        match envelope.kind() {
            PayloadKind::Text => {
                if self.current.is_none() {
                    signals.extend(self.show_indicator());
                }
                // Text is rendering now, the indicator has served its purpose
                signals.extend(self.hide_indicator());

                if self.current.is_none() {
                    let turn = Turn::new();
                    log::debug!("Turn {} started", turn.id);
                    signals.push(TurnSignal::TurnStarted { id: turn.id.clone() });
                    self.current = Some(turn);
                }
                if let Some(turn) = self.current.as_mut() {
                    turn.text.push_str(&envelope.data);
                    signals.push(TurnSignal::TurnText {
                        id: turn.id.clone(),
                        delta: envelope.data.clone(),
                        text: turn.text.clone(),
                    });
                }
            }
            PayloadKind::AudioPcm => match audio::decode_inbound(&envelope.data) {
                Ok(pcm) => {
                    if self.current.is_none() {
                        signals.extend(self.show_indicator());
                    }
                    signals.push(TurnSignal::PlayAudio(pcm));

                    if mode == SessionMode::Audio {
                        if let Some(turn) = self.current.as_mut() {
                            if !turn.has_audio_tag {
                                turn.has_audio_tag = true;
                                signals.push(TurnSignal::TurnAudioTagged {
                                    id: turn.id.clone(),
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Dropping audio envelope with invalid base64: {}", e);
                }
            },
            PayloadKind::Other => {
                log::debug!(
                    "Ignoring envelope with unhandled mime type {:?}",
                    envelope.mime_type
                );
            }
        }

        signals
    }

    fn show_indicator(&mut self) -> Option<TurnSignal> {
        if self.indicator_visible {
            return None;
        }
        self.indicator_visible = true;
        Some(TurnSignal::IndicatorShown)
    }

    fn hide_indicator(&mut self) -> Option<TurnSignal> {
        if !self.indicator_visible {
            return None;
        }
        self.indicator_visible = false;
        Some(TurnSignal::IndicatorHidden)
    }
}
