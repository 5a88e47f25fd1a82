//! Audio bridge between raw PCM chunks and the wire encoding
//!
//! Inbound `audio/pcm` payloads are base64-decoded and handed to the
//! playback sink unchanged. Outbound capture frames are base64-encoded and
//! wrapped into envelopes, but only while the recording gate is open.
//!
//! The gate is checked at transmission time, not at capture time: a capture
//! callback that is already in flight when recording stops is dropped here,
//! so teardown never depends on callback cancellation guarantees.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::protocol::Envelope;

/// Log an outbound confirmation for roughly 1% of chunks.
/// Diagnostics throttle only, not correctness-relevant.
const OUTBOUND_LOG_INTERVAL: u64 = 100;

/// Decode an inbound base64 audio payload into raw PCM bytes
pub fn decode_inbound(base64_data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(base64_data)
}

/// Encode a raw PCM chunk for the wire
pub fn encode_outbound(pcm: &[u8]) -> String {
    STANDARD.encode(pcm)
}

/// Gates and transcodes outbound audio
///
/// Holds no state beyond the recording flag and a diagnostics counter.
#[derive(Debug, Default)]
pub struct AudioBridge {
    recording: bool,
    chunks_sent: u64,
}

impl AudioBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or close the transmission gate
    pub fn set_recording(&mut self, active: bool) {
        if self.recording != active {
            log::info!("Audio recording {}", if active { "started" } else { "stopped" });
        }
        self.recording = active;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Handle one captured PCM frame.
    ///
    /// Returns the envelope to transmit, or `None` when the gate is closed
    /// (the frame is dropped unconditionally).
    pub fn outbound_chunk(&mut self, pcm: &[u8]) -> Option<Envelope> {
        if !self.recording {
            return None;
        }

        self.chunks_sent += 1;
        if self.chunks_sent % OUTBOUND_LOG_INTERVAL == 0 {
            log::debug!("AudioBridge: {} chunks transmitted", self.chunks_sent);
        }

        Some(Envelope::audio_pcm(encode_outbound(pcm)))
    }

    /// Number of chunks that passed the gate
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadKind;

    #[test]
    fn test_round_trip_arbitrary_bytes() {
        let bufs: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0xff, 0x00, 0x7f, 0x80],
            (0..=255).collect(),
        ];
        for buf in bufs {
            let encoded = encode_outbound(&buf);
            assert_eq!(decode_inbound(&encoded).unwrap(), buf);
        }
    }

    #[test]
    fn test_decode_invalid_base64_fails() {
        assert!(decode_inbound("not base64 !!!").is_err());
    }

    #[test]
    fn test_gate_closed_drops_frames() {
        let mut bridge = AudioBridge::new();
        assert!(!bridge.is_recording());
        assert!(bridge.outbound_chunk(&[1, 2, 3]).is_none());
        assert_eq!(bridge.chunks_sent(), 0);
    }

    #[test]
    fn test_gate_open_produces_envelope() {
        let mut bridge = AudioBridge::new();
        bridge.set_recording(true);

        let envelope = bridge.outbound_chunk(&[0x34, 0x12]).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::AudioPcm);
        assert_eq!(decode_inbound(&envelope.data).unwrap(), vec![0x34, 0x12]);
        assert_eq!(bridge.chunks_sent(), 1);
    }

    #[test]
    fn test_frames_after_stop_are_dropped() {
        let mut bridge = AudioBridge::new();
        bridge.set_recording(true);
        assert!(bridge.outbound_chunk(&[1]).is_some());

        // Stop closes the race window: in-flight callbacks land here and die
        bridge.set_recording(false);
        assert!(bridge.outbound_chunk(&[2]).is_none());
        assert_eq!(bridge.chunks_sent(), 1);
    }
}
