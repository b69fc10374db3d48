//! Opus encoder wrapper
//!
//! Provides low-latency Opus encoding fixed at 48 kHz stereo 20 ms
//! frames (1920 interleaved i16 samples in, compressed bytes out).

use bytes::Bytes;
use opus::{Application, Channels, Encoder};

use crate::constants::{FRAME_SAMPLES, SAMPLE_RATE};
use crate::error::CodecError;

/// Opus encoder wrapper with the fixed voice configuration
pub struct OpusEncoder {
    encoder: Encoder,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create a new encoder
    pub fn new() -> Result<Self, CodecError> {
        let encoder = Encoder::new(SAMPLE_RATE, Channels::Stereo, Application::Audio)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        // Max Opus frame is about 1275 bytes; leave headroom
        let encode_buffer = vec![0u8; 4000];

        Ok(Self {
            encoder,
            encode_buffer,
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Encode one 20 ms frame of interleaved i16 samples
    ///
    /// Input length must be exactly 1920 samples (960 per channel).
    pub fn encode(&mut self, samples: &[i16]) -> Result<Bytes, CodecError> {
        if samples.len() != FRAME_SAMPLES {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodeFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_creation() {
        assert!(OpusEncoder::new().is_ok());
    }

    #[test]
    fn test_encoding() {
        let mut encoder = OpusEncoder::new().unwrap();

        let samples = vec![0i16; FRAME_SAMPLES];
        let encoded = encoder.encode(&samples).unwrap();
        assert!(!encoded.is_empty());
        assert!(encoded.len() < FRAME_SAMPLES * 2);

        let stats = encoder.stats();
        assert_eq!(stats.frames_encoded, 1);
    }

    #[test]
    fn test_wrong_frame_size_rejected() {
        let mut encoder = OpusEncoder::new().unwrap();
        let samples = vec![0i16; 960];
        assert!(matches!(
            encoder.encode(&samples),
            Err(CodecError::InvalidFrameSize(960))
        ));
    }
}
