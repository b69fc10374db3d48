//! Error types for the voice transport

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire packet parse/decrypt errors
///
/// Both variants are non-fatal: the offending packet is dropped and the
/// receive loop continues.
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Packet authentication failed")]
    AuthenticationFailed,
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Decoding failed: {0}")]
    DecodeFailed(String),

    #[error("Invalid frame size: {0} samples")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Socket closed")]
    Closed,
}

/// Signaling errors
///
/// Unlike packet-level errors these are fatal to the session and are
/// surfaced to the owner via the control link's close callback.
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Control message send failed: {0}")]
    SendFailed(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
