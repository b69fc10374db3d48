//! Packet payload encryption
//!
//! Every payload travels inside an XChaCha20-Poly1305 envelope keyed by
//! the per-session symmetric key negotiated by the signaling layer. The
//! 24-byte nonce is the 12-byte packet header zero-extended, which keeps
//! nonces unique per sender (sequence/timestamp advance every packet)
//! and reconstructable by the receiver from the header alone.

use bytes::{BufMut, Bytes, BytesMut};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};

use super::{AudioPacket, VoicePacketHeader};
use crate::error::PacketError;

/// Per-session symmetric key (negotiated by the signaling layer)
pub type SessionKey = [u8; 32];

/// Poly1305 authentication tag length
const TAG_SIZE: usize = 16;

fn nonce_from_header(header: &[u8; VoicePacketHeader::SIZE]) -> XNonce {
    let mut nonce = [0u8; 24];
    nonce[..VoicePacketHeader::SIZE].copy_from_slice(header);
    XNonce::from(nonce)
}

/// Builds a wire-ready encrypted packet from a plaintext payload
pub fn seal(
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    payload: &[u8],
    key: &SessionKey,
) -> Result<Bytes, PacketError> {
    let header = VoicePacketHeader::new(sequence, timestamp, ssrc).encode();
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let ciphertext = cipher
        .encrypt(&nonce_from_header(&header), payload)
        .map_err(|_| PacketError::Malformed("payload too large to seal".into()))?;

    let mut wire = BytesMut::with_capacity(VoicePacketHeader::SIZE + ciphertext.len());
    wire.put_slice(&header);
    wire.put_slice(&ciphertext);
    Ok(wire.freeze())
}

/// Parses and decrypts a wire packet
///
/// # Errors
/// - `PacketError::Malformed` if the buffer is shorter than header+tag
///   or the header fields are unrecognized
/// - `PacketError::AuthenticationFailed` if the AEAD integrity check
///   fails (wrong key or tampered packet)
pub fn open(wire: &[u8], key: &SessionKey) -> Result<AudioPacket, PacketError> {
    let header = VoicePacketHeader::decode(wire)?;
    let ciphertext = &wire[VoicePacketHeader::SIZE..];
    if ciphertext.len() < TAG_SIZE {
        return Err(PacketError::Malformed(format!(
            "ciphertext too short: {} bytes",
            ciphertext.len()
        )));
    }

    let mut header_bytes = [0u8; VoicePacketHeader::SIZE];
    header_bytes.copy_from_slice(&wire[..VoicePacketHeader::SIZE]);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let payload = cipher
        .decrypt(&nonce_from_header(&header_bytes), ciphertext)
        .map_err(|_| PacketError::AuthenticationFailed)?;

    Ok(AudioPacket {
        sequence: header.sequence,
        timestamp: header.timestamp,
        ssrc: header.ssrc,
        payload: Bytes::from(payload),
    })
}
