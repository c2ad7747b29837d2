//! Narrative units, blueprints, and correction directives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Identifies one unit: project, chapter index, unit index within the chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    pub project_id: String,
    pub chapter: u32,
    pub unit: u32,
}

impl UnitId {
    pub fn new(project_id: impl Into<String>, chapter: u32, unit: u32) -> Self {
        Self {
            project_id: project_id.into(),
            chapter,
            unit,
        }
    }

    /// Stable storage key: `project:chapter:unit`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.project_id, self.chapter, self.unit)
    }

    /// The unit that follows this one in the same chapter.
    pub fn next(&self) -> Self {
        Self::new(self.project_id.clone(), self.chapter, self.unit + 1)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ch{}/u{}", self.project_id, self.chapter, self.unit)
    }
}

/// One accepted, persisted piece of generated text.
///
/// Only the orchestrator creates these, and only on acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeUnit {
    pub id: UnitId,
    pub content: String,
    pub word_count: usize,
    #[serde(default)]
    pub entities: BTreeSet<String>,
    #[serde(default)]
    pub threads: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NarrativeUnit {
    pub fn new(id: UnitId, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            word_count: count_words(&content),
            id,
            content,
            entities: BTreeSet::new(),
            threads: BTreeSet::new(),
            tone: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_threads<I, S>(mut self, threads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.threads = threads.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }
}

/// Whitespace-delimited word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The caller-owned generation contract for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Entity names that must appear in the unit.
    #[serde(default)]
    pub expected_entities: BTreeSet<String>,
    /// Identifiers of plot threads the unit is expected to touch.
    #[serde(default)]
    pub thread_refs: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_word_count: Option<u32>,
    /// Free-text scene goal / description.
    #[serde(default)]
    pub scene_goal: String,
    /// Topics to look up with the research service during assembly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub research_topics: Vec<String>,
}

impl Blueprint {
    pub fn new(scene_goal: impl Into<String>) -> Self {
        Self {
            scene_goal: scene_goal.into(),
            ..Self::default()
        }
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_threads<I, S>(mut self, threads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.thread_refs = threads.into_iter().map(Into::into).collect();
        self
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.target_tone = Some(tone.into());
        self
    }

    pub fn with_word_count(mut self, words: u32) -> Self {
        self.target_word_count = Some(words);
        self
    }

    pub fn with_research_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.research_topics = topics.into_iter().map(Into::into).collect();
        self
    }
}

/// Default cap on carried correction directives.
pub const DEFAULT_MAX_DIRECTIVES: usize = 5;

fn default_directive_cap() -> usize {
    DEFAULT_MAX_DIRECTIVES
}

/// Ordered, bounded list of corrections carried alongside a blueprint.
///
/// Pushing past the cap drops the oldest directive. A directive already
/// in the list is not added twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionDirectives {
    items: VecDeque<String>,
    #[serde(skip, default = "default_directive_cap")]
    cap: usize,
}

impl CorrectionDirectives {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    /// Append a directive. Returns `false` if it was already present.
    pub fn push(&mut self, directive: impl Into<String>) -> bool {
        let directive = directive.into();
        if directive.trim().is_empty() || self.items.contains(&directive) {
            return false;
        }
        if self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back(directive);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Default for CorrectionDirectives {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIRECTIVES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_counts_words_on_creation() {
        let unit = NarrativeUnit::new(UnitId::new("p", 1, 1), "The  rain\nkept falling.");
        assert_eq!(unit.word_count, 4);
    }

    #[test]
    fn unit_key_is_stable() {
        let id = UnitId::new("saga", 3, 7);
        assert_eq!(id.key(), "saga:3:7");
        assert_eq!(id.next().unit, 8);
        assert_eq!(id.to_string(), "saga/ch3/u7");
    }

    #[test]
    fn directives_drop_oldest_beyond_cap() {
        let mut d = CorrectionDirectives::new(5);
        for i in 0..7 {
            d.push(format!("fix {i}"));
        }
        assert_eq!(d.len(), 5);
        assert_eq!(d.iter().next(), Some("fix 2"));
        assert_eq!(d.to_vec().last().map(String::as_str), Some("fix 6"));
    }

    #[test]
    fn directives_skip_duplicates_and_blanks() {
        let mut d = CorrectionDirectives::default();
        assert!(d.push("Include Mara"));
        assert!(!d.push("Include Mara"));
        assert!(!d.push("   "));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn blueprint_builder_collects_sets() {
        let bp = Blueprint::new("Confrontation on the pier")
            .with_entities(["Mara", "Ilya", "Mara"])
            .with_threads(["debt"])
            .at_location("Harbor")
            .with_tone("tense");
        assert_eq!(bp.expected_entities.len(), 2);
        assert!(bp.thread_refs.contains("debt"));
        assert_eq!(bp.location.as_deref(), Some("Harbor"));
    }
}
