//! Receive pipeline
//!
//! A dedicated thread pulls datagrams off the session socket with a
//! short blocking timeout, decrypts and routes them through the
//! participant registry, and dispatches decoded frames to the attached
//! sink and/or the combined-mix queues. A single bad packet never
//! terminates the loop; only a shutdown request or socket closure does.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

use crate::constants::MAX_PACKET_SIZE;
use crate::error::{NetworkError, Result};
use crate::protocol::{self, SessionKey};
use crate::session::handler::{AudioSink, SessionInfo};
use crate::session::registry::ParticipantRegistry;
use crate::session::send::SpeakingState;
use crate::session::SharedSink;

/// Handle to the running receive thread
pub(crate) struct ReceiveLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Start the receive thread
    ///
    /// Sets the socket read timeout so the loop can observe shutdown
    /// requests within one interval. The sink slot is re-read for every
    /// datagram, so sink replacement takes effect live.
    pub fn start(
        info: &SessionInfo,
        registry: Arc<ParticipantRegistry>,
        sink: SharedSink,
        state: Arc<SpeakingState>,
        timeout: Duration,
    ) -> Result<Self> {
        info.socket.set_read_timeout(Some(timeout))?;

        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let socket = info.socket.clone();
        let key = info.secret_key;

        let handle = thread::Builder::new()
            .name("voice-receive".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; MAX_PACKET_SIZE];
                let mut could_receive = false;

                while running_for_loop.load(Ordering::SeqCst) {
                    let len = match socket.recv(&mut buf) {
                        Ok(len) => len,
                        Err(e) => {
                            match classify_recv_error(&e) {
                                NetworkError::Timeout => {}
                                _ => {
                                    warn!("receive failed: {e}");
                                    thread::sleep(Duration::from_millis(10));
                                }
                            }
                            continue;
                        }
                    };

                    let datagram = &buf[..len];
                    let current_sink = sink.read().clone();
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        handle_datagram(
                            datagram,
                            &key,
                            &registry,
                            current_sink.as_ref(),
                            &state,
                            &mut could_receive,
                        );
                    }));
                    if outcome.is_err() {
                        error!("receive handler panicked, continuing");
                    }
                }
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Request shutdown and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify_recv_error(e: &std::io::Error) -> NetworkError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => NetworkError::Timeout,
        _ => NetworkError::ReceiveFailed(e.to_string()),
    }
}

/// Process one inbound datagram
fn handle_datagram(
    datagram: &[u8],
    key: &SessionKey,
    registry: &ParticipantRegistry,
    sink: &dyn AudioSink,
    state: &SpeakingState,
    could_receive: &mut bool,
) {
    let wants_audio = sink.wants_per_participant() || sink.wants_combined();
    if !wants_audio {
        // Arriving packets are only a liveness signal here; a toggle
        // re-arms the silence burst so the remote side re-learns us.
        if *could_receive {
            *could_receive = false;
            state.rearm_silence();
        }
        return;
    }
    if !*could_receive {
        *could_receive = true;
        state.rearm_silence();
    }

    let packet = match protocol::open(datagram, key) {
        Ok(packet) => packet,
        Err(e) => {
            debug!("dropping undecryptable packet: {e}");
            return;
        }
    };

    let user_id = match registry.user_for(packet.ssrc) {
        Some(user_id) => user_id,
        None => {
            // Silence from an unmapped sender is a normal join transient:
            // the ssrc announcement simply has not arrived yet.
            if !packet.is_silence() {
                warn!(ssrc = packet.ssrc, "audio from unknown sender id, ignoring");
            }
            return;
        }
    };

    let decoded = {
        let mut decoder = match registry.decoder_for(packet.ssrc) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(ssrc = packet.ssrc, "no decoder available: {e}");
                return;
            }
        };
        if !decoder.is_in_order(packet.sequence) {
            trace!(
                ssrc = packet.ssrc,
                sequence = packet.sequence,
                "out-of-order packet, ignoring"
            );
            return;
        }
        decoder.accept(packet.sequence);
        match decoder.decode(&packet.payload) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(ssrc = packet.ssrc, "decode failed, dropping frame: {e}");
                return;
            }
        }
    };

    if sink.wants_per_participant() {
        sink.on_participant_audio(&user_id, &decoded);
    }
    if sink.wants_combined() {
        registry.enqueue_combined(&user_id, Instant::now(), decoded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OpusEncoder;
    use crate::constants::{FRAME_SAMPLES, SILENCE_PAYLOAD};
    use parking_lot::Mutex;

    struct StubSink {
        per_user: AtomicBool,
        combined: AtomicBool,
        frames: Mutex<Vec<(String, usize)>>,
    }

    impl StubSink {
        fn new(per_user: bool, combined: bool) -> Self {
            Self {
                per_user: AtomicBool::new(per_user),
                combined: AtomicBool::new(combined),
                frames: Mutex::new(Vec::new()),
            }
        }
    }

    impl AudioSink for StubSink {
        fn wants_per_participant(&self) -> bool {
            self.per_user.load(Ordering::SeqCst)
        }
        fn wants_combined(&self) -> bool {
            self.combined.load(Ordering::SeqCst)
        }
        fn on_participant_audio(&self, user_id: &str, frame: &[i16]) {
            self.frames.lock().push((user_id.to_string(), frame.len()));
        }
        fn on_combined_audio(&self, _: &[String], _: &[i16]) {}
    }

    fn test_key() -> SessionKey {
        [3u8; 32]
    }

    fn opus_frame() -> bytes::Bytes {
        let mut encoder = OpusEncoder::new().unwrap();
        encoder.encode(&vec![0i16; FRAME_SAMPLES]).unwrap()
    }

    fn sealed(seq: u16, ssrc: u32, payload: &[u8]) -> bytes::Bytes {
        protocol::seal(seq, u32::from(seq) * 960, ssrc, payload, &test_key()).unwrap()
    }

    #[test]
    fn test_known_sender_dispatched() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        let sink = StubSink::new(true, false);
        let state = SpeakingState::new();
        let mut could_receive = false;

        let wire = sealed(1, 7, &opus_frame());
        handle_datagram(&wire, &test_key(), &registry, &sink, &state, &mut could_receive);

        let frames = sink.frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], ("user-a".to_string(), FRAME_SAMPLES));
    }

    #[test]
    fn test_out_of_order_dropped() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        let sink = StubSink::new(true, false);
        let state = SpeakingState::new();
        let mut could_receive = false;

        let frame = opus_frame();
        for seq in [5u16, 6, 4, 6] {
            let wire = sealed(seq, 7, &frame);
            handle_datagram(&wire, &test_key(), &registry, &sink, &state, &mut could_receive);
        }

        // seq 4 is late and the second 6 is a duplicate
        assert_eq!(sink.frames.lock().len(), 2);
    }

    #[test]
    fn test_unknown_sender_ignored() {
        let registry = ParticipantRegistry::new();
        let sink = StubSink::new(true, false);
        let state = SpeakingState::new();
        let mut could_receive = false;

        handle_datagram(
            &sealed(0, 99, &SILENCE_PAYLOAD),
            &test_key(),
            &registry,
            &sink,
            &state,
            &mut could_receive,
        );
        handle_datagram(
            &sealed(1, 99, &opus_frame()),
            &test_key(),
            &registry,
            &sink,
            &state,
            &mut could_receive,
        );

        assert!(sink.frames.lock().is_empty());
        // No decoder is created for an unmapped sender
        assert_eq!(registry.decoder_count(), 0);
    }

    #[test]
    fn test_bad_packets_dropped() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        let sink = StubSink::new(true, false);
        let state = SpeakingState::new();
        let mut could_receive = false;

        // Truncated, tampered, and garbage datagrams
        let wire = sealed(1, 7, &opus_frame());
        handle_datagram(&wire[..8], &test_key(), &registry, &sink, &state, &mut could_receive);

        let mut tampered = wire.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xFF;
        handle_datagram(&tampered, &test_key(), &registry, &sink, &state, &mut could_receive);

        handle_datagram(&[0u8; 64], &test_key(), &registry, &sink, &state, &mut could_receive);

        assert!(sink.frames.lock().is_empty());
    }

    #[test]
    fn test_decoder_created_lazily_for_mapped_sender() {
        let registry = ParticipantRegistry::new();
        // Mapping exists but receive was inactive at association time
        registry.associate(7, "user-a", false);
        assert_eq!(registry.decoder_count(), 0);

        let sink = StubSink::new(true, false);
        let state = SpeakingState::new();
        let mut could_receive = false;
        let wire = sealed(1, 7, &opus_frame());
        handle_datagram(&wire, &test_key(), &registry, &sink, &state, &mut could_receive);

        assert_eq!(registry.decoder_count(), 1);
        assert_eq!(sink.frames.lock().len(), 1);
    }

    #[test]
    fn test_combined_path_enqueues() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        let sink = StubSink::new(false, true);
        let state = SpeakingState::new();
        let mut could_receive = false;

        let wire = sealed(1, 7, &opus_frame());
        handle_datagram(&wire, &test_key(), &registry, &sink, &state, &mut could_receive);

        assert!(sink.frames.lock().is_empty());
        assert_eq!(registry.queue_for("user-a").len(), 1);
    }

    #[test]
    fn test_liveness_toggle_rearms_silence() {
        let registry = ParticipantRegistry::new();
        let sink = StubSink::new(true, false);
        let state = SpeakingState::new();
        state.disarm_silence();
        let mut could_receive = false;

        // First packet while consuming: could-receive flips on
        let wire = sealed(1, 7, &SILENCE_PAYLOAD);
        handle_datagram(&wire, &test_key(), &registry, &sink, &state, &mut could_receive);
        assert!(could_receive);
        assert!(state.silence_armed());

        // Sink stops consuming: flips off and re-arms again
        state.disarm_silence();
        sink.per_user.store(false, Ordering::SeqCst);
        handle_datagram(&wire, &test_key(), &registry, &sink, &state, &mut could_receive);
        assert!(!could_receive);
        assert!(state.silence_armed());
    }
}
