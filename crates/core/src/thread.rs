//! Plot threads and their one-directional status machine.

use crate::error::ThreadTransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thread lifecycle.
///
/// `Planned → {Active, Developing, Abandoned}`, `Active ↔ Developing`,
/// `{Active, Developing} → {Resolved, Abandoned}`. Resolved and abandoned
/// are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    #[default]
    Planned,
    Active,
    Developing,
    Resolved,
    Abandoned,
}

impl ThreadStatus {
    pub fn can_transition_to(self, next: ThreadStatus) -> bool {
        use ThreadStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Planned, Active | Developing | Abandoned)
                | (Active, Developing | Resolved | Abandoned)
                | (Developing, Active | Resolved | Abandoned)
        )
    }

    /// Active or developing.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Developing)
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Developing => "developing",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Importance tier. Sorts `Primary < Secondary < Tertiary`, so an ascending
/// sort puts the most important threads first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadImportance {
    Primary,
    #[default]
    Secondary,
    Tertiary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotThread {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default)]
    pub importance: ThreadImportance,
    /// 0–100.
    #[serde(default)]
    pub progress: u8,
    /// Phrases that count as a reference to this thread.
    #[serde(default)]
    pub key_events: Vec<String>,
}

impl PlotThread {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ThreadStatus::default(),
            importance: ThreadImportance::default(),
            progress: 0,
            key_events: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: ThreadStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_importance(mut self, importance: ThreadImportance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_key_event(mut self, phrase: impl Into<String>) -> Self {
        self.key_events.push(phrase.into());
        self
    }

    /// Move to `next`, rejecting backwards or out-of-terminal transitions.
    pub fn transition_to(&mut self, next: ThreadStatus) -> Result<(), ThreadTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(ThreadTransitionError::IllegalStatus {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Set progress (clamped to 100). Open threads never move backwards.
    pub fn set_progress(&mut self, progress: u8) -> Result<(), ThreadTransitionError> {
        let progress = progress.min(100);
        if self.status.is_open() && progress < self.progress {
            return Err(ThreadTransitionError::ProgressRegression {
                id: self.id.clone(),
                current: self.progress,
                requested: progress,
            });
        }
        self.progress = progress;
        Ok(())
    }

    /// Check that `next` is a legal successor of `self`'s stored state.
    pub fn validate_update(&self, next: &PlotThread) -> Result<(), ThreadTransitionError> {
        let mut scratch = self.clone();
        scratch.transition_to(next.status)?;
        // Progress is judged against the state the thread was open in.
        if self.status.is_open() && next.progress.min(100) < self.progress {
            return Err(ThreadTransitionError::ProgressRegression {
                id: self.id.clone(),
                current: self.progress,
                requested: next.progress,
            });
        }
        Ok(())
    }
}
