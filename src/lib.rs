//! # voice-link
//!
//! Low-latency encrypted voice transport over UDP for a single session.
//!
//! The crate packetizes and paces outbound audio, decrypts and reorders
//! inbound audio per remote sender, drives an Opus codec at a fixed
//! 20 ms cadence, and mixes concurrent speakers into a combined stream.
//! Endpoint negotiation, key exchange and audio devices live outside;
//! they plug in through the traits in [`session::handler`].
//!
//! ## Data flow
//!
//! ```text
//! OUTBOUND (pulled once per 20 ms by the external send system)
//!
//!   AudioSource ──► PacketProvider ──► OpusEncoder ──► seal() ──► UDP
//!                        │
//!                        └── silence priming / speaking-state updates
//!
//! INBOUND (receive thread + mixer thread)
//!
//!   UDP ──► open() ──► ParticipantRegistry ──► StreamDecoder
//!                          │  (ssrc → user,       │
//!                          │   ordering check)    ▼
//!                          │              per-participant sink
//!                          │                      │
//!                          └── recency queues ◄───┘
//!                                   │
//!                         CombinedMixer (20 ms tick)
//!                                   │
//!                                   ▼
//!                           combined sink (saturating mix)
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod session;

pub use config::VoiceConfig;
pub use error::{CodecError, Error, NetworkError, PacketError, Result, SignalingError};
pub use session::{
    AudioSink, AudioSource, CloseReason, ControlLink, PacketProvider, SendSystem,
    SendSystemFactory, SessionInfo, VoiceConnection,
};

/// Fixed audio parameters of the transport
pub mod constants {
    /// Sample rate in Hz
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Channel count (stereo)
    pub const CHANNELS: u16 = 2;

    /// Samples per channel in one 20 ms frame
    pub const FRAME_SAMPLES_PER_CHANNEL: usize = 960;

    /// Interleaved samples in one 20 ms frame
    pub const FRAME_SAMPLES: usize = 1920;

    /// Frame duration in milliseconds
    pub const FRAME_DURATION_MS: u64 = 20;

    /// Canonical payload marking "no audio", used for connection
    /// priming and graceful mute
    pub const SILENCE_PAYLOAD: [u8; 3] = [0xF8, 0xFF, 0xFE];

    /// Maximum UDP packet size (MTU minus IP/UDP headers)
    pub const MAX_PACKET_SIZE: usize = 1472;
}
