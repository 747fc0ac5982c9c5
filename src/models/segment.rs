//! Conversation segments and summaries.

use serde::{Deserialize, Serialize};

/// Modality tags attached to an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Plain text exchange.
    Text,
    /// Voice input or output.
    Voice,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Tool or command output.
    Tool,
}

impl Modality {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Image => "image",
            Self::Video => "video",
            Self::Tool => "tool",
        }
    }

    /// Parses a modality string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// A tracked slice of conversational exchange.
///
/// The unit of importance scoring and eviction: one user/assistant pair plus
/// the topics extracted from it.
#[derive(Debug, Clone)]
pub struct ConversationSegment {
    /// The user message.
    pub user_message: String,
    /// The assistant message.
    pub assistant_message: String,
    /// Creation timestamp (unix seconds).
    pub timestamp: u64,
    /// Derived importance, recomputed against the recent-topics window.
    pub importance: f64,
    /// Topics extracted from the exchange.
    pub topics: Vec<String>,
    /// Modalities present in the exchange.
    pub modalities: Vec<Modality>,
}

impl ConversationSegment {
    /// Both messages of the exchange, in order.
    #[must_use]
    pub fn messages(&self) -> [&str; 2] {
        [&self.user_message, &self.assistant_message]
    }
}

/// A compacted conversation segment, persisted durably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Timestamp of the summarized exchange (unix seconds).
    pub timestamp: u64,
    /// Importance at compaction time.
    pub importance: f64,
    /// Topics of the summarized exchange.
    pub topics: Vec<String>,
    /// The raw messages.
    pub messages: Vec<String>,
    /// Modalities present.
    pub modalities: Vec<Modality>,
}

impl From<&ConversationSegment> for Summary {
    fn from(segment: &ConversationSegment) -> Self {
        Self {
            timestamp: segment.timestamp,
            importance: segment.importance,
            topics: segment.topics.clone(),
            messages: vec![
                segment.user_message.clone(),
                segment.assistant_message.clone(),
            ],
            modalities: segment.modalities.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modality_round_trip() {
        for m in [
            Modality::Text,
            Modality::Voice,
            Modality::Image,
            Modality::Video,
            Modality::Tool,
        ] {
            assert_eq!(Modality::parse(m.as_str()), Some(m));
        }
        assert_eq!(Modality::parse("hologram"), None);
    }
}
