//! Bounded conversation memory with importance-ranked compaction.
//!
//! The manager keeps a rolling window of exchange segments. When the window
//! fills past the configured watermark, low-importance segments are compacted
//! into durable summaries instead of being dropped: eviction always produces
//! a persisted record. Store faults are logged and swallowed; the segments
//! stay in the active window until a later compaction succeeds.

use crate::config::MemoryConfig;
use crate::current_timestamp;
use crate::models::{ContextValue, ConversationSegment, Modality, Summary};
use crate::relevance::score_values;
use crate::storage::ContextGraphStore;
use crate::topics::{extract_topics, overlaps};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Neutral importance when topic extraction yields nothing to compare.
const NEUTRAL_IMPORTANCE: f64 = 0.5;
/// Importance boost per distinct modality present in an exchange.
const MODALITY_BOOST: f64 = 0.1;

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Active segments before compaction.
    pub examined: usize,
    /// Segments kept in the active window.
    pub retained: usize,
    /// Segments converted to durable summaries.
    pub summarized: usize,
}

struct MemoryState {
    /// Active window, in chronological order.
    segments: VecDeque<ConversationSegment>,
    /// FIFO window of recently seen topic terms.
    recent_topics: VecDeque<String>,
}

/// Rolling conversation window with durable overflow.
pub struct ConversationMemoryManager {
    config: MemoryConfig,
    store: Arc<ContextGraphStore>,
    session_id: String,
    state: Mutex<MemoryState>,
}

impl ConversationMemoryManager {
    /// Creates a manager for a fresh session backed by the given store.
    #[must_use]
    pub fn new(config: MemoryConfig, store: Arc<ContextGraphStore>) -> Self {
        Self {
            config,
            store,
            session_id: format!("session_{}", uuid::Uuid::new_v4()),
            state: Mutex::new(MemoryState {
                segments: VecDeque::new(),
                recent_topics: VecDeque::new(),
            }),
        }
    }

    /// Returns this manager's session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("memory state mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }

    /// Appends one user/assistant exchange to the active window.
    ///
    /// Topics are extracted from both messages and fed into the recent-topics
    /// window, every active segment's importance is recomputed, and a
    /// compaction pass runs if the window has filled past the watermark.
    /// Returns the stats of that pass, or `None` when no compaction ran.
    #[instrument(skip_all, fields(session = %self.session_id))]
    pub fn append_exchange(
        &self,
        user_message: &str,
        assistant_message: &str,
        modalities: &[Modality],
    ) -> Option<CompactionStats> {
        let combined = format!("{user_message} {assistant_message}");
        let topics = extract_topics(&combined, self.config.topic_terms);

        let mut state = self.lock_state();
        for topic in &topics {
            if state.recent_topics.len() >= self.config.topic_window {
                state.recent_topics.pop_front();
            }
            state.recent_topics.push_back(topic.clone());
        }

        state.segments.push_back(ConversationSegment {
            user_message: user_message.to_string(),
            assistant_message: assistant_message.to_string(),
            timestamp: current_timestamp(),
            importance: NEUTRAL_IMPORTANCE,
            topics,
            modalities: modalities.to_vec(),
        });

        Self::recompute_importance_locked(&mut state);
        metrics::counter!("exchanges_appended_total").increment(1);

        #[allow(clippy::cast_precision_loss)]
        let watermark = self.config.capacity as f64 * self.config.compact_watermark;
        #[allow(clippy::cast_precision_loss)]
        let over_watermark = state.segments.len() as f64 > watermark;
        if over_watermark {
            Some(self.compact_locked(&mut state))
        } else {
            None
        }
    }

    /// Recomputes every active segment's importance against the current
    /// recent-topics window.
    pub fn recompute_importance(&self) {
        let mut state = self.lock_state();
        Self::recompute_importance_locked(&mut state);
    }

    fn recompute_importance_locked(state: &mut MemoryState) {
        let window: Vec<String> = state.recent_topics.iter().cloned().collect();
        let window_value = ContextValue::text_list(window);

        for segment in &mut state.segments {
            let base = if segment.topics.is_empty() {
                NEUTRAL_IMPORTANCE
            } else {
                let topics_value = ContextValue::text_list(segment.topics.iter().cloned());
                score_values(&topics_value, &window_value)
            };
            let distinct: HashSet<Modality> = segment.modalities.iter().copied().collect();
            #[allow(clippy::cast_precision_loss)]
            let boost = MODALITY_BOOST * distinct.len() as f64;
            segment.importance = (base + boost).clamp(0.0, 1.0);
        }
    }

    /// Forces a compaction pass regardless of the watermark.
    pub fn compact(&self) -> CompactionStats {
        let mut state = self.lock_state();
        self.compact_locked(&mut state)
    }

    /// Retains the recency floor unconditionally plus the top segments by
    /// importance; the remainder is handed to durable storage as summaries.
    /// If persistence fails the window is left untouched so nothing is lost
    /// without record.
    fn compact_locked(&self, state: &mut MemoryState) -> CompactionStats {
        let examined = state.segments.len();
        let floor = self.config.recency_floor.min(examined);
        let keep_top = self.config.retain_top;

        // The last `floor` segments are immune regardless of score.
        let mut older: Vec<ConversationSegment> = state.segments.drain(..).collect();
        let recent: Vec<ConversationSegment> = older.split_off(examined - floor);

        let mut ranked: Vec<(usize, f64, u64)> = older
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.importance, s.timestamp))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });
        let keep_indices: HashSet<usize> =
            ranked.iter().take(keep_top).map(|(i, _, _)| *i).collect();

        let mut retained: Vec<ConversationSegment> = Vec::with_capacity(keep_top + floor);
        let mut evicted: Vec<ConversationSegment> = Vec::new();
        for (i, segment) in older.into_iter().enumerate() {
            if keep_indices.contains(&i) {
                retained.push(segment);
            } else {
                evicted.push(segment);
            }
        }

        let summaries: Vec<Summary> = evicted.iter().map(Summary::from).collect();
        if !summaries.is_empty() {
            if let Err(e) = self.store.store_summaries(&self.session_id, &summaries) {
                tracing::error!(error = %e, "summary persistence failed, keeping segments");
                // Rebuild the window with everything still in it.
                retained.extend(evicted);
                retained.sort_by_key(|s| s.timestamp);
                state.segments = retained.into_iter().chain(recent).collect();
                let len = state.segments.len();
                return CompactionStats {
                    examined,
                    retained: len,
                    summarized: 0,
                };
            }
        }

        state.segments = retained.into_iter().chain(recent).collect();
        let stats = CompactionStats {
            examined,
            retained: state.segments.len(),
            summarized: summaries.len(),
        };
        tracing::debug!(
            examined = stats.examined,
            retained = stats.retained,
            summarized = stats.summarized,
            "compacted conversation window"
        );
        metrics::counter!("segments_compacted_total").increment(stats.summarized as u64);
        stats
    }

    /// Returns messages relevant to `topic`: active-segment matches by topic
    /// overlap, followed by durable-summary matches from past compactions.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub fn get_relevant_context(&self, topic: &str, limit: usize) -> Vec<String> {
        let terms = extract_topics(topic, self.config.topic_terms);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut messages: Vec<String> = {
            let state = self.lock_state();
            state
                .segments
                .iter()
                .filter(|s| overlaps(&s.topics, &terms))
                .take(limit)
                .flat_map(|s| s.messages().map(str::to_string))
                .collect()
        };

        match self.store.query_summaries(&terms, limit) {
            Ok(summaries) => {
                messages.extend(summaries.into_iter().flat_map(|s| s.messages));
            },
            Err(e) => {
                tracing::error!(error = %e, "summary retrieval failed, using active window only");
            },
        }

        messages
    }

    /// Returns up to `limit` most recent exchanges, oldest first.
    #[must_use]
    pub fn recent_history(&self, limit: usize) -> Vec<ConversationSegment> {
        let state = self.lock_state();
        let skip = state.segments.len().saturating_sub(limit);
        state.segments.iter().skip(skip).cloned().collect()
    }

    /// Returns the number of segments in the active window.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock_state().segments.len()
    }

    /// Resets the active window and purges this session's durable summaries.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.segments.clear();
        state.recent_topics.clear();
        drop(state);

        if let Err(e) = self.store.clear_session(&self.session_id) {
            tracing::error!(error = %e, "session summary purge failed");
        }
    }
}
