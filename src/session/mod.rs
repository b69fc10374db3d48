//! Voice session: lifecycle, registry, receive loop, mixer, send provider
//!
//! [`VoiceConnection`] owns start/stop of every moving part based on
//! which consumers are attached: attaching an audio source brings up the
//! send system, attaching a sink brings up the receive loop (plus the
//! mixer when the combined mix is wanted). Transitions are idempotent
//! and serialized; shutdown is tolerant of any subset already stopped.

pub mod handler;
pub mod mixer;
pub mod queue;
pub mod receive;
pub mod registry;
pub mod send;

pub use handler::{
    AudioSink, AudioSource, CloseReason, ControlLink, SendSystem, SendSystemFactory, SessionInfo,
};
pub use queue::RecencyQueue;
pub use registry::ParticipantRegistry;
pub use send::PacketProvider;

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

use crate::codec::OpusEncoder;
use crate::config::VoiceConfig;
use crate::error::Result;
use mixer::CombinedMixer;
use receive::ReceiveLoop;
use send::SpeakingState;

/// Current sink, shared with the receive and mixer threads
///
/// Both threads re-read the slot on every iteration, so replacing the
/// sink takes effect live without restarting either thread.
pub(crate) type SharedSink = Arc<RwLock<Arc<dyn AudioSink>>>;

/// Attach/detach state, guarded by one lock so exactly one thread
/// creates or destroys each resource
struct Lifecycle {
    send_system: Option<Box<dyn SendSystem>>,
    receive: Option<ReceiveLoop>,
    mixer: Option<CombinedMixer>,
    sink: Option<SharedSink>,
}

/// One bidirectional encrypted voice session
pub struct VoiceConnection {
    info: SessionInfo,
    config: VoiceConfig,
    control: Arc<dyn ControlLink>,
    send_factory: Arc<dyn SendSystemFactory>,
    registry: Arc<ParticipantRegistry>,
    state: Arc<SpeakingState>,
    lifecycle: Mutex<Lifecycle>,
}

impl VoiceConnection {
    /// Create an idle connection over negotiated session parameters
    pub fn new(
        info: SessionInfo,
        config: VoiceConfig,
        control: Arc<dyn ControlLink>,
        send_factory: Arc<dyn SendSystemFactory>,
    ) -> Self {
        Self {
            info,
            config,
            control,
            send_factory,
            registry: Arc::new(ParticipantRegistry::new()),
            state: Arc::new(SpeakingState::new()),
            lifecycle: Mutex::new(Lifecycle {
                send_system: None,
                receive: None,
                mixer: None,
                sink: None,
            }),
        }
    }

    /// Attach or detach the outbound audio source
    ///
    /// Attaching while a send system is already running is a no-op;
    /// detaching stops the send system and releases the encoder.
    pub fn set_audio_source(&self, source: Option<Arc<dyn AudioSource>>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match source {
            Some(source) => {
                if lifecycle.send_system.is_some() {
                    return Ok(());
                }
                let encoder = OpusEncoder::new().map_err(crate::error::Error::Codec)?;
                let provider = PacketProvider::new(
                    self.info.clone(),
                    source,
                    self.control.clone(),
                    self.state.clone(),
                    encoder,
                    self.config.silence_prime_frames,
                );
                let mut system = self.send_factory.create(provider);
                system.start();
                lifecycle.send_system = Some(system);
                debug!("send system started");
            }
            None => {
                if let Some(mut system) = lifecycle.send_system.take() {
                    system.shutdown();
                    debug!("send system stopped");
                }
            }
        }
        Ok(())
    }

    /// Attach, replace or detach the inbound audio sink
    ///
    /// Attaching starts the receive loop, plus the mixer when the sink
    /// wants the combined mix. Replacing while active swaps the sink
    /// under the running threads, so subsequent frames go to the new
    /// sink. Detaching stops both threads and releases every
    /// per-participant decoder.
    pub fn set_audio_sink(&self, sink: Option<Arc<dyn AudioSink>>) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match sink {
            Some(sink) => {
                let slot = match &lifecycle.sink {
                    Some(slot) => {
                        *slot.write() = sink.clone();
                        slot.clone()
                    }
                    None => {
                        let slot: SharedSink = Arc::new(RwLock::new(sink.clone()));
                        lifecycle.sink = Some(slot.clone());
                        slot
                    }
                };
                if lifecycle.receive.is_none() {
                    lifecycle.receive = Some(ReceiveLoop::start(
                        &self.info,
                        self.registry.clone(),
                        slot.clone(),
                        self.state.clone(),
                        self.config.receive_timeout(),
                    )?);
                    debug!("receive loop started");
                }
                if sink.wants_combined() {
                    if lifecycle.mixer.is_none() {
                        lifecycle.mixer = Some(CombinedMixer::start(
                            self.registry.clone(),
                            slot,
                            self.config.recency_window(),
                        ));
                        debug!("combined mixer started");
                    }
                } else if let Some(mut mixer) = lifecycle.mixer.take() {
                    mixer.stop();
                    debug!("combined mixer stopped");
                }
            }
            None => {
                lifecycle.sink = None;
                if let Some(mut receive) = lifecycle.receive.take() {
                    receive.stop();
                    debug!("receive loop stopped");
                }
                if let Some(mut mixer) = lifecycle.mixer.take() {
                    mixer.stop();
                }
                self.registry.clear_decoders();
            }
        }
        Ok(())
    }

    /// Record a sender-identity announcement from the signaling layer
    pub fn associate(&self, ssrc: u32, user_id: &str) {
        let receive_active = self.lifecycle.lock().receive.is_some();
        self.registry.associate(ssrc, user_id, receive_active);
    }

    /// Record a participant departure
    pub fn dissociate(&self, user_id: &str) {
        self.registry.dissociate(user_id);
    }

    /// Whether the send pipeline currently reports speaking
    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    /// Explicitly transition to not-speaking
    ///
    /// Also re-arms the silence burst so the remote side sees a clean
    /// trailing-silence mute.
    pub fn stop_speaking(&self) {
        send::emit_speaking(&self.state, self.control.as_ref(), false);
    }

    /// The participant registry, for inspection
    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    /// Local address of the session socket
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.info.socket.local_addr()
    }

    /// Stop everything this connection started
    ///
    /// Order: mixer, receive loop, per-participant decoders, send system
    /// (which owns the encoder), registry. Safe to call repeatedly and
    /// with any subset already stopped.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(mut mixer) = lifecycle.mixer.take() {
            mixer.stop();
        }
        if let Some(mut receive) = lifecycle.receive.take() {
            receive.stop();
        }
        self.registry.clear_decoders();
        if let Some(mut system) = lifecycle.send_system.take() {
            system.shutdown();
        }
        self.registry.clear();
        lifecycle.sink = None;
        debug!("voice connection shut down");
    }

    /// Shut down and ask the owner to close the session
    pub fn close(&self, reason: CloseReason) {
        self.shutdown();
        self.control.close(reason);
    }
}

impl Drop for VoiceConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
