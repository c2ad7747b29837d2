//! Locations and world rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl LocationRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            region: None,
            tags: Vec::new(),
        }
    }
}

/// A constraint of the story world, e.g. "magic cannot raise the dead".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldRule {
    pub id: String,
    /// e.g. "magic", "technology", "geography".
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Phrases whose appearance suggests the rule was broken.
    #[serde(default)]
    pub limitations: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl WorldRule {
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            description: String::new(),
            active: true,
            limitations: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_limitation(mut self, phrase: impl Into<String>) -> Self {
        self.limitations.push(phrase.into());
        self
    }
}
