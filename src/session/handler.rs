//! External collaborator interfaces
//!
//! The core never owns audio devices, the signaling channel, or the
//! send clock. All of those arrive through these traits, so a real
//! deployment and a test harness plug into the same seams.

use bytes::Bytes;
use serde_json::Value;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::SignalingError;
use crate::protocol::SessionKey;

/// Negotiated transport parameters for one session
///
/// Produced by the signaling/handshake layer; valid only while the
/// session is active.
#[derive(Clone)]
pub struct SessionInfo {
    /// UDP socket for both directions
    pub socket: Arc<UdpSocket>,
    /// Remote voice endpoint
    pub remote_addr: SocketAddr,
    /// Per-session symmetric key
    pub secret_key: SessionKey,
    /// Session-local sender id assigned to us
    pub ssrc: u32,
}

/// Reason the core is asking the owner to tear the session down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly local shutdown
    ShutdownRequested,
    /// Audio packets can no longer be delivered
    TransportLost,
    /// A control message could not be sent
    SignalingFailure,
}

/// Application-provided audio to transmit
pub trait AudioSource: Send + Sync {
    /// Whether the source is currently willing to provide audio
    fn can_provide(&self) -> bool;

    /// One 20 ms frame, or `None`/empty when there is nothing to say
    ///
    /// Raw frames are interleaved 16-bit big-endian PCM (3840 bytes);
    /// pre-encoded frames are Opus packets.
    fn provide_frame(&self) -> Option<Bytes>;

    /// Whether frames are already Opus-encoded
    fn is_pre_encoded(&self) -> bool {
        false
    }
}

/// Application-provided consumer of received audio
pub trait AudioSink: Send + Sync {
    /// Whether per-participant frames are wanted
    fn wants_per_participant(&self) -> bool;

    /// Whether the combined mix is wanted
    fn wants_combined(&self) -> bool;

    /// One decoded 20 ms frame from a single participant
    fn on_participant_audio(&self, user_id: &str, frame: &[i16]);

    /// One mixed 20 ms frame with the ids of everyone who contributed
    fn on_combined_audio(&self, user_ids: &[String], frame: &[i16]);
}

/// Signaling channel owned by the collaborator
pub trait ControlLink: Send + Sync {
    /// Deliver a control message (e.g. the speaking-state update)
    fn send(&self, message: Value) -> Result<(), SignalingError>;

    /// Tear the session down for `reason`
    fn close(&self, reason: CloseReason);
}

/// Externally-owned packet pacing strategy
///
/// The core only answers "what should go on the wire next"; when that
/// question is asked every 20 ms is the send system's business (thread,
/// timer wheel, test harness).
pub trait SendSystem: Send {
    /// Begin invoking the provider on the 20 ms cadence
    fn start(&mut self);

    /// Stop the cadence; idempotent
    fn shutdown(&mut self);
}

/// Factory creating a [`SendSystem`] around a packet provider
pub trait SendSystemFactory: Send + Sync {
    fn create(&self, provider: crate::session::send::PacketProvider) -> Box<dyn SendSystem>;
}
