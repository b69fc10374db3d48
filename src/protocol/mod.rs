//! Voice wire protocol (UDP)
//!
//! Defines the binary packet structure for encrypted audio transport.
//! Opus encoding happens before sealing; the payload bytes on the wire
//! are always an AEAD ciphertext.
//!
//! ## Packet format (header = 12 bytes, big-endian, no serde)
//!
//! ```text
//! Offset  Len  Description
//! ------  ---  -----------
//!  0       1   Version/Flags (0x80)
//!  1       1   Payload type (0x78)
//!  2       2   Sequence number (wraps at 2^16)
//!  4       4   Timestamp (48 kHz ticks)
//!  8       4   SSRC - session-local sender id
//! 12+      N   XChaCha20-Poly1305 ciphertext of the Opus payload
//! ```
//!
//! The AEAD nonce is derived deterministically from the header (header
//! bytes zero-extended to 24 bytes), so both ends reconstruct it without
//! exchanging a separate nonce.

pub mod crypto;

pub use crypto::{open, seal, SessionKey};

use crate::error::PacketError;
use bytes::Bytes;

/// Version/flags byte of every voice packet
pub const VERSION_FLAGS: u8 = 0x80;

/// Payload type byte of every voice packet
pub const PAYLOAD_TYPE: u8 = 0x78;

/// 12-byte header of a voice UDP packet
///
/// Direct byte serialization, no serde (hot path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicePacketHeader {
    /// Monotonically increasing per-sender sequence number
    pub sequence: u16,
    /// RTP-style timestamp (48 kHz ticks)
    pub timestamp: u32,
    /// Session-local sender id
    pub ssrc: u32,
}

impl VoicePacketHeader {
    /// Header size in bytes
    pub const SIZE: usize = 12;

    /// Creates a new header
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Serializes the header into a 12-byte array (big-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = VERSION_FLAGS;
        buf[1] = PAYLOAD_TYPE;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Deserializes a header from a byte slice
    ///
    /// # Errors
    /// `PacketError::Malformed` if the slice is shorter than 12 bytes or
    /// the version/type bytes are unrecognized.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < Self::SIZE {
            return Err(PacketError::Malformed(format!(
                "header too short: {} bytes (expected {})",
                buf.len(),
                Self::SIZE
            )));
        }

        if buf[0] != VERSION_FLAGS {
            return Err(PacketError::Malformed(format!(
                "unexpected version/flags byte: {:#04x}",
                buf[0]
            )));
        }
        if buf[1] != PAYLOAD_TYPE {
            return Err(PacketError::Malformed(format!(
                "unexpected payload type byte: {:#04x}",
                buf[1]
            )));
        }

        let sequence = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        Ok(Self {
            sequence,
            timestamp,
            ssrc,
        })
    }
}

/// A decrypted audio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Per-sender sequence number
    pub sequence: u16,
    /// 48 kHz-tick timestamp
    pub timestamp: u32,
    /// Session-local sender id
    pub ssrc: u32,
    /// Opus payload (or the 3-byte silence marker)
    pub payload: Bytes,
}

impl AudioPacket {
    /// Whether the payload is the canonical silence marker
    pub fn is_silence(&self) -> bool {
        self.payload[..] == crate::constants::SILENCE_PAYLOAD
    }
}
