//! Per-sender Opus decoder with packet ordering state
//!
//! One `StreamDecoder` exists per active sender id. It owns the Opus
//! decoder instance and the last accepted sequence number, so ordering
//! decisions and prediction state stay confined to one sender's stream.

use opus::{Channels, Decoder};

use crate::constants::{FRAME_SAMPLES, SAMPLE_RATE};
use crate::error::CodecError;

/// Decoding buffer capacity: Opus packets may carry up to 120 ms,
/// 11520 interleaved samples at 48 kHz stereo.
const DECODE_BUFFER_SAMPLES: usize = (SAMPLE_RATE as usize) * 2 * 120 / 1000;

/// Opus decoder for a single sender's packet stream
pub struct StreamDecoder {
    decoder: Decoder,
    /// Last accepted sequence number, `None` until the first packet
    last_sequence: Option<u16>,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<i16>,
    /// Frames decoded
    frames_decoded: u64,
    /// Frames dropped (decode failure or unexpected size)
    frames_dropped: u64,
}

impl StreamDecoder {
    /// Create a new decoder with the fixed voice configuration
    pub fn new() -> Result<Self, CodecError> {
        let decoder = Decoder::new(SAMPLE_RATE, Channels::Stereo)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            last_sequence: None,
            decode_buffer: vec![0i16; DECODE_BUFFER_SAMPLES],
            frames_decoded: 0,
            frames_dropped: 0,
        })
    }

    /// Whether `sequence` is strictly after the last accepted one under
    /// 16-bit wraparound ordering
    ///
    /// Accepts 65535 -> 0, rejects 0 -> 65535. The first packet of a
    /// stream is always in order.
    pub fn is_in_order(&self, sequence: u16) -> bool {
        match self.last_sequence {
            None => true,
            Some(last) => (sequence.wrapping_sub(last) as i16) > 0,
        }
    }

    /// Record `sequence` as the last accepted packet
    ///
    /// Called once the ordering check passes, before decoding. A packet
    /// that subsequently fails to decode still advances the stream
    /// position; only its audio is lost.
    pub fn accept(&mut self, sequence: u16) {
        self.last_sequence = Some(sequence);
    }

    /// Decode one Opus packet into a 20 ms interleaved i16 frame
    ///
    /// A failure means the frame is lost; the caller drops it and the
    /// pipeline continues.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>, CodecError> {
        let samples_per_channel = self
            .decoder
            .decode(data, &mut self.decode_buffer, false)
            .map_err(|e| {
                self.frames_dropped += 1;
                CodecError::DecodeFailed(e.to_string())
            })?;

        let total = samples_per_channel * 2;
        if total != FRAME_SAMPLES {
            self.frames_dropped += 1;
            return Err(CodecError::InvalidFrameSize(total));
        }

        self.frames_decoded += 1;
        Ok(self.decode_buffer[..total].to_vec())
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_dropped: self.frames_dropped,
        }
    }
}

// SAFETY: `opus::Decoder` is `Send` but not `Sync` because it wraps a raw
// pointer. Every operation that touches the Opus decoder state takes
// `&mut self`, and shared `&StreamDecoder` access only reads plain fields,
// so concurrent shared references cannot reach the pointer.
unsafe impl Sync for StreamDecoder {}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OpusEncoder;

    #[test]
    fn test_decoder_creation() {
        assert!(StreamDecoder::new().is_ok());
    }

    #[test]
    fn test_first_packet_always_in_order() {
        let decoder = StreamDecoder::new().unwrap();
        assert!(decoder.is_in_order(0));
        assert!(decoder.is_in_order(65535));
        assert!(decoder.is_in_order(12345));
    }

    #[test]
    fn test_ordering_strictly_after() {
        let mut decoder = StreamDecoder::new().unwrap();
        decoder.accept(100);

        assert!(decoder.is_in_order(101));
        assert!(decoder.is_in_order(150));
        assert!(!decoder.is_in_order(100)); // duplicate
        assert!(!decoder.is_in_order(99)); // late
    }

    #[test]
    fn test_ordering_wraparound() {
        let mut decoder = StreamDecoder::new().unwrap();
        decoder.accept(65535);
        assert!(decoder.is_in_order(0));
        assert!(decoder.is_in_order(1));

        decoder.accept(0);
        assert!(!decoder.is_in_order(65535));
    }

    #[test]
    fn test_ordering_exhaustive_window() {
        // For every base sequence, the 32767 successors are in order
        // and the previous value is not.
        let mut decoder = StreamDecoder::new().unwrap();
        for base in [0u16, 1, 32767, 32768, 65534, 65535] {
            decoder.accept(base);
            assert!(decoder.is_in_order(base.wrapping_add(1)));
            assert!(decoder.is_in_order(base.wrapping_add(32767)));
            assert!(!decoder.is_in_order(base));
            assert!(!decoder.is_in_order(base.wrapping_sub(1)));
            assert!(!decoder.is_in_order(base.wrapping_add(32768)));
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut encoder = OpusEncoder::new().unwrap();
        let mut decoder = StreamDecoder::new().unwrap();

        // 440 Hz sine, interleaved stereo
        let mut samples = Vec::with_capacity(FRAME_SAMPLES);
        for i in 0..FRAME_SAMPLES / 2 {
            let t = i as f32 / SAMPLE_RATE as f32;
            let val = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16;
            samples.push(val);
            samples.push(val);
        }

        let encoded = encoder.encode(&samples).unwrap();
        let decoded = decoder.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), FRAME_SAMPLES);
        assert_eq!(decoder.stats().frames_decoded, 1);
    }

    #[test]
    fn test_garbage_decode_fails_without_advancing() {
        let mut decoder = StreamDecoder::new().unwrap();
        decoder.accept(5);

        let garbage = vec![0xFFu8; 40];
        assert!(decoder.decode(&garbage).is_err());
        assert_eq!(decoder.stats().frames_dropped, 1);

        // Ordering state untouched by the failed decode
        assert!(decoder.is_in_order(6));
        assert!(!decoder.is_in_order(5));
    }
}
