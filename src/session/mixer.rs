//! Combined audio mixer
//!
//! Runs on a fixed 20 ms period independent of packet arrival. Each tick
//! drains at most one fresh frame per participant from the recency
//! queues, sums the contributions with i16 saturation, and hands the mix
//! to the combined sink. Ticks with no contributors still emit an
//! all-zero frame so downstream consumers are fed at a steady cadence.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::error;

use crate::constants::{FRAME_DURATION_MS, FRAME_SAMPLES};
use crate::session::registry::ParticipantRegistry;
use crate::session::SharedSink;

/// Handle to the running mixer thread
pub(crate) struct CombinedMixer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CombinedMixer {
    /// Start the periodic mixer
    ///
    /// The sink slot is re-read every tick, so sink replacement takes
    /// effect live.
    pub fn start(registry: Arc<ParticipantRegistry>, sink: SharedSink, window: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("voice-mixer".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(Duration::from_millis(FRAME_DURATION_MS));
                while running_for_loop.load(Ordering::SeqCst) {
                    if ticker.recv().is_err() {
                        break;
                    }
                    if !running_for_loop.load(Ordering::SeqCst) {
                        break;
                    }
                    let current_sink = sink.read().clone();
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        if current_sink.wants_combined() {
                            let (users, mix) = mix_tick(&registry, Instant::now(), window);
                            current_sink.on_combined_audio(&users, &mix);
                        }
                    }));
                    if outcome.is_err() {
                        error!("mixer tick panicked, skipping");
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to spawn mixer thread: {e}");
                None
            }
        };

        Self { running, handle }
    }

    /// Request shutdown and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CombinedMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One mix tick: drain fresh contributions and sum them with saturation
pub(crate) fn mix_tick(
    registry: &ParticipantRegistry,
    now: Instant,
    window: Duration,
) -> (Vec<String>, Vec<i16>) {
    let (users, parts) = registry.pop_fresh_frames(now, window);

    let mut mix = vec![0i16; FRAME_SAMPLES];
    if !parts.is_empty() {
        for (i, slot) in mix.iter_mut().enumerate() {
            let mut sample = 0i32;
            for part in &parts {
                sample += i32::from(part.get(i).copied().unwrap_or(0));
            }
            *slot = sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        }
    }
    (users, mix)
}
