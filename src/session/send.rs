//! Send pipeline
//!
//! Pull-based packet production: the externally-owned send system asks
//! for the next wire packet once per 20 ms tick, and this module decides
//! between real audio, priming silence, or nothing. Sequence number and
//! timestamp are owned exclusively by the provider (single writer); the
//! speaking/silence flags are shared atomics so the receive loop and
//! explicit stop-speaking requests can re-arm silence priming.

use bytes::Bytes;
use serde_json::json;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::OpusEncoder;
use crate::constants::{FRAME_SAMPLES, FRAME_SAMPLES_PER_CHANNEL, SILENCE_PAYLOAD};
use crate::protocol;
use crate::session::handler::{AudioSource, CloseReason, ControlLink, SessionInfo};

/// Shared speaking/silence state
///
/// Written by the send tick; the silence counter is additionally re-armed
/// by the receive loop's liveness toggle and by explicit stop-speaking
/// requests.
pub(crate) struct SpeakingState {
    speaking: AtomicBool,
    /// Remaining priming position; -1 once priming is inactive
    silence_counter: AtomicI32,
    sent_initial_silence: AtomicBool,
}

impl SpeakingState {
    pub fn new() -> Self {
        Self {
            speaking: AtomicBool::new(false),
            silence_counter: AtomicI32::new(0),
            sent_initial_silence: AtomicBool::new(false),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Restart the silence burst from the beginning
    pub fn rearm_silence(&self) {
        self.silence_counter.store(0, Ordering::Release);
    }

    pub(crate) fn disarm_silence(&self) {
        self.silence_counter.store(-1, Ordering::Release);
    }

    pub(crate) fn silence_armed(&self) -> bool {
        self.silence_counter.load(Ordering::Acquire) > -1
    }

    fn initial_silence_sent(&self) -> bool {
        self.sent_initial_silence.load(Ordering::Acquire)
    }

    /// Count one sent silence packet; completes priming after
    /// `prime_frames` packets
    fn advance_silence(&self, prime_frames: i32) {
        let sent = self.silence_counter.fetch_add(1, Ordering::AcqRel) + 1;
        if sent >= prime_frames {
            self.disarm_silence();
            self.sent_initial_silence.store(true, Ordering::Release);
        }
    }
}

/// Emit a speaking-state change to the signaling layer
///
/// A send failure here is fatal to the session and is surfaced through
/// the control link's close callback.
pub(crate) fn emit_speaking(state: &SpeakingState, control: &dyn ControlLink, speaking: bool) {
    state.speaking.store(speaking, Ordering::Release);
    debug!(speaking, "speaking state changed");

    let message = json!({
        "op": 5,
        "d": {
            "speaking": speaking,
            "delay": 0,
        }
    });
    if let Err(e) = control.send(message) {
        warn!("failed to send speaking update: {e}");
        control.close(CloseReason::SignalingFailure);
    }

    if !speaking {
        state.rearm_silence();
    }
}

/// Produces the next wire-ready packet on demand
///
/// Owned by the external send system; one call per 20 ms tick.
pub struct PacketProvider {
    info: SessionInfo,
    source: Arc<dyn AudioSource>,
    control: Arc<dyn ControlLink>,
    state: Arc<SpeakingState>,
    encoder: OpusEncoder,
    prime_frames: i32,
    sequence: u16,
    timestamp: u32,
}

impl PacketProvider {
    pub(crate) fn new(
        info: SessionInfo,
        source: Arc<dyn AudioSource>,
        control: Arc<dyn ControlLink>,
        state: Arc<SpeakingState>,
        encoder: OpusEncoder,
        prime_frames: u32,
    ) -> Self {
        Self {
            info,
            source,
            control,
            state,
            encoder,
            prime_frames: prime_frames as i32,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// The session socket, for send systems that transmit themselves
    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.info.socket
    }

    /// Destination address for produced packets
    pub fn remote_addr(&self) -> SocketAddr {
        self.info.remote_addr
    }

    /// Report that packet delivery has failed irrecoverably
    ///
    /// Called by the send system after repeated socket send failures;
    /// asks the owner to tear the session down.
    pub fn on_transport_lost(&self) {
        warn!("voice transport lost, requesting session close");
        self.control.close(CloseReason::TransportLost);
    }

    /// Produce the next packet for this tick, if any
    ///
    /// `allow_speaking_change` gates the not-speaking transition so a
    /// send system can suppress flapping notifications during brief
    /// scheduling gaps.
    pub fn next_packet(&mut self, allow_speaking_change: bool) -> Option<Bytes> {
        let mut next = None;

        if self.state.initial_silence_sent() && self.source.can_provide() {
            self.state.disarm_silence();
            match self.source.provide_frame() {
                Some(raw) if !raw.is_empty() => {
                    let opus = if self.source.is_pre_encoded() {
                        Some(raw)
                    } else {
                        self.encode_raw(&raw)
                    };
                    if let Some(opus) = opus {
                        if !self.state.is_speaking() {
                            emit_speaking(&self.state, self.control.as_ref(), true);
                        }
                        next = self.seal_next(&opus);
                    }
                }
                _ => {
                    if self.state.is_speaking() && allow_speaking_change {
                        emit_speaking(&self.state, self.control.as_ref(), false);
                    }
                }
            }
        } else if self.state.silence_armed() {
            next = self.seal_next(&SILENCE_PAYLOAD);
            self.state.advance_silence(self.prime_frames);
        } else if self.state.is_speaking() && allow_speaking_change {
            emit_speaking(&self.state, self.control.as_ref(), false);
        }

        if next.is_some() {
            self.timestamp = self
                .timestamp
                .wrapping_add(FRAME_SAMPLES_PER_CHANNEL as u32);
        }
        next
    }

    /// Encode a raw big-endian PCM frame; a bad frame is dropped
    fn encode_raw(&mut self, raw: &[u8]) -> Option<Bytes> {
        if raw.len() != FRAME_SAMPLES * 2 {
            warn!(
                len = raw.len(),
                "audio source provided a frame of unexpected size, dropping"
            );
            return None;
        }
        let samples: Vec<i16> = raw
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        match self.encoder.encode(&samples) {
            Ok(opus) => Some(opus),
            Err(e) => {
                warn!("encoding failed, dropping frame: {e}");
                None
            }
        }
    }

    fn seal_next(&mut self, payload: &[u8]) -> Option<Bytes> {
        match protocol::seal(
            self.sequence,
            self.timestamp,
            self.info.ssrc,
            payload,
            &self.info.secret_key,
        ) {
            Ok(wire) => {
                self.sequence = self.sequence.wrapping_add(1);
                Some(wire)
            }
            Err(e) => {
                warn!("failed to seal packet: {e}");
                None
            }
        }
    }
}
