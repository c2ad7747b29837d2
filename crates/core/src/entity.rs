//! Entity profiles: characters and other named actors.

use serde::{Deserialize, Serialize};

/// Role / importance class of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    Protagonist,
    Antagonist,
    #[default]
    Supporting,
    Minor,
}

/// Lifecycle state. Authoritative: accepted text must never contradict it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Alive,
    Deceased,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyLevel {
    Simple,
    #[default]
    Moderate,
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formality {
    Casual,
    #[default]
    Neutral,
    Formal,
}

/// How an entity speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    #[serde(default)]
    pub vocabulary: VocabularyLevel,
    #[serde(default)]
    pub formality: Formality,
    #[serde(default)]
    pub uses_contractions: bool,
}

/// Dimensionality of [`VoiceProfile::fingerprint`].
pub const VOICE_FINGERPRINT_DIM: usize = 8;

impl VoiceProfile {
    /// Fixed-width vector for the voice-fingerprint collection.
    ///
    /// Layout: one-hot vocabulary (3), one-hot formality (3), contractions,
    /// bias.
    pub fn fingerprint(&self) -> Vec<f32> {
        let mut v = vec![0.0; VOICE_FINGERPRINT_DIM];
        v[match self.vocabulary {
            VocabularyLevel::Simple => 0,
            VocabularyLevel::Moderate => 1,
            VocabularyLevel::Advanced => 2,
        }] = 1.0;
        v[match self.formality {
            Formality::Casual => 3,
            Formality::Neutral => 4,
            Formality::Formal => 5,
        }] = 1.0;
        v[6] = if self.uses_contractions { 1.0 } else { 0.0 };
        v[7] = 1.0;
        v
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipDirection {
    #[default]
    Outgoing,
    Incoming,
    Mutual,
}

/// A typed, directional edge to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub target: String,
    /// e.g. "sibling", "rival", "employer".
    pub kind: String,
    #[serde(default)]
    pub direction: RelationshipDirection,
}

impl Relationship {
    pub fn new(target: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: kind.into(),
            direction: RelationshipDirection::Outgoing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub role: EntityRole,
    #[serde(default)]
    pub voice: VoiceProfile,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub lifecycle: LifecycleState,
    /// Short excerpts from the entity's most recent appearances.
    #[serde(default)]
    pub recent_mentions: Vec<String>,
}

impl EntityProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            role: EntityRole::default(),
            voice: VoiceProfile::default(),
            relationships: Vec::new(),
            lifecycle: LifecycleState::default(),
            recent_mentions: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: EntityRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleState) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// The canonical name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn is_deceased(&self) -> bool {
        self.lifecycle == LifecycleState::Deceased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_include_aliases() {
        let e = EntityProfile::new("Captain Orla Venn").with_alias("Venn");
        let names: Vec<&str> = e.names().collect();
        assert_eq!(names, vec!["Captain Orla Venn", "Venn"]);
    }

    #[test]
    fn fingerprint_is_fixed_width_one_hot() {
        let voice = VoiceProfile {
            vocabulary: VocabularyLevel::Advanced,
            formality: Formality::Casual,
            uses_contractions: true,
        };
        let fp = voice.fingerprint();
        assert_eq!(fp.len(), VOICE_FINGERPRINT_DIM);
        assert_eq!(fp, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn profile_defaults_from_sparse_json() {
        let e: EntityProfile = serde_json::from_str(r#"{"name":"Ilya","lifecycle":"deceased"}"#).unwrap();
        assert!(e.is_deceased());
        assert_eq!(e.role, EntityRole::Supporting);
        assert!(e.relationships.is_empty());
    }
}
