//! Participant registry
//!
//! Maps session-local sender ids ("ssrc") to external participant ids
//! and owns one [`StreamDecoder`] per active sender. All maps are
//! concurrent: the signaling thread associates/dissociates while the
//! receive loop resolves senders and the mixer drains queues.

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

use crate::codec::StreamDecoder;
use crate::error::CodecError;
use crate::session::queue::RecencyQueue;

/// Registry of participants for one voice session
pub struct ParticipantRegistry {
    /// ssrc -> external participant id
    ssrc_map: DashMap<u32, String>,
    /// ssrc -> decoder state, populated lazily on first audio activity
    decoders: DashMap<u32, StreamDecoder>,
    /// external participant id -> recency queue for combined mixing
    queues: DashMap<String, Arc<RecencyQueue>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self {
            ssrc_map: DashMap::new(),
            decoders: DashMap::new(),
            queues: DashMap::new(),
        }
    }

    /// Associate a sender id with an external participant id
    ///
    /// Idempotent for an identical pair. If the sender id already maps
    /// to a *different* participant the original mapping is kept and the
    /// anomaly is logged; the source of such an update is ambiguous and
    /// silently replacing the mapping would misattribute live audio.
    ///
    /// A decoder is created eagerly only while receive is active;
    /// otherwise creation is deferred to first audio activity.
    pub fn associate(&self, ssrc: u32, user_id: &str, receive_active: bool) {
        match self.ssrc_map.entry(ssrc) {
            Entry::Occupied(existing) => {
                if existing.get() != user_id {
                    error!(
                        ssrc,
                        old = %existing.get(),
                        new = %user_id,
                        "sender id already associated with a different participant, keeping original mapping"
                    );
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(user_id.to_string());
                if receive_active {
                    match StreamDecoder::new() {
                        Ok(decoder) => {
                            self.decoders.insert(ssrc, decoder);
                        }
                        Err(e) => warn!(ssrc, "failed to create decoder: {e}"),
                    }
                }
            }
        }
    }

    /// Remove a participant, destroying its decoder state and queue
    pub fn dissociate(&self, user_id: &str) {
        let ssrc = self
            .ssrc_map
            .iter()
            .find(|entry| entry.value() == user_id)
            .map(|entry| *entry.key());

        if let Some(ssrc) = ssrc {
            self.ssrc_map.remove(&ssrc);
            self.decoders.remove(&ssrc);
        }
        self.queues.remove(user_id);
    }

    /// Resolve the external participant id for a sender id
    pub fn user_for(&self, ssrc: u32) -> Option<String> {
        self.ssrc_map.get(&ssrc).map(|entry| entry.value().clone())
    }

    /// Get the decoder for a sender id, creating one if absent
    ///
    /// Lazy creation covers audio that arrives before the formal
    /// participant announcement.
    pub fn decoder_for(&self, ssrc: u32) -> Result<RefMut<'_, u32, StreamDecoder>, CodecError> {
        match self.decoders.entry(ssrc) {
            Entry::Occupied(entry) => Ok(entry.into_ref()),
            Entry::Vacant(slot) => Ok(slot.insert(StreamDecoder::new()?)),
        }
    }

    /// Append a decoded frame to a participant's recency queue
    pub fn enqueue_combined(&self, user_id: &str, captured_at: Instant, frame: Vec<i16>) {
        self.queues
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RecencyQueue::new()))
            .push(captured_at, frame);
    }

    /// The recency queue for a participant, creating one if absent
    pub fn queue_for(&self, user_id: &str) -> Arc<RecencyQueue> {
        self.queues
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RecencyQueue::new()))
            .clone()
    }

    /// Drain one fresh frame per participant for the current mix tick
    pub fn pop_fresh_frames(
        &self,
        now: Instant,
        window: Duration,
    ) -> (Vec<String>, Vec<Vec<i16>>) {
        let mut users = Vec::new();
        let mut frames = Vec::new();
        for entry in self.queues.iter() {
            if let Some(frame) = entry.value().pop_fresh(now, window) {
                users.push(entry.key().clone());
                frames.push(frame);
            }
        }
        (users, frames)
    }

    /// Release all decoder state, keeping participant mappings
    pub fn clear_decoders(&self) {
        self.decoders.clear();
    }

    /// Release everything: mappings, decoders, queues
    pub fn clear(&self) {
        self.decoders.clear();
        self.ssrc_map.clear();
        self.queues.clear();
    }

    /// Number of known participant mappings
    pub fn participant_count(&self) -> usize {
        self.ssrc_map.len()
    }

    /// Number of live decoder instances
    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_associate_and_resolve() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", false);
        assert_eq!(registry.user_for(7), Some("user-a".to_string()));
        assert_eq!(registry.user_for(8), None);
        // No receive active, no eager decoder
        assert_eq!(registry.decoder_count(), 0);
    }

    #[test]
    fn test_associate_idempotent() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        registry.associate(7, "user-a", true);
        assert_eq!(registry.participant_count(), 1);
        assert_eq!(registry.decoder_count(), 1);
    }

    #[test]
    fn test_conflicting_associate_keeps_original() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        registry.associate(7, "user-b", true);

        assert_eq!(registry.user_for(7), Some("user-a".to_string()));
        assert_eq!(registry.participant_count(), 1);
        assert_eq!(registry.decoder_count(), 1);
    }

    #[test]
    fn test_eager_decoder_only_when_receive_active() {
        let registry = ParticipantRegistry::new();
        registry.associate(1, "user-a", false);
        registry.associate(2, "user-b", true);
        assert_eq!(registry.decoder_count(), 1);
    }

    #[test]
    fn test_decoder_lazily_created() {
        let registry = ParticipantRegistry::new();
        assert_eq!(registry.decoder_count(), 0);
        registry.decoder_for(42).unwrap();
        assert_eq!(registry.decoder_count(), 1);
        // Second access reuses the instance
        registry.decoder_for(42).unwrap();
        assert_eq!(registry.decoder_count(), 1);
    }

    #[test]
    fn test_dissociate_releases_everything() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        registry.enqueue_combined("user-a", Instant::now(), vec![0; 4]);

        registry.dissociate("user-a");
        assert_eq!(registry.participant_count(), 0);
        assert_eq!(registry.decoder_count(), 0);
        let (users, _) =
            registry.pop_fresh_frames(Instant::now(), Duration::from_millis(100));
        assert!(users.is_empty());
    }

    #[test]
    fn test_dissociate_unknown_is_noop() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", false);
        registry.dissociate("nobody");
        assert_eq!(registry.participant_count(), 1);
    }

    #[test]
    fn test_clear_decoders_keeps_mappings() {
        let registry = ParticipantRegistry::new();
        registry.associate(7, "user-a", true);
        registry.clear_decoders();
        assert_eq!(registry.decoder_count(), 0);
        assert_eq!(registry.participant_count(), 1);
    }
}
