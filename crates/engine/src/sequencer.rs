//! Per-chapter ordering.
//!
//! Unit n+1 of a chapter must not start until unit n is terminal. Each
//! (project, chapter) pair carries a turn lock, so at most one unit of a
//! chapter runs at a time, and a watermark of the highest unit that has
//! finished (accepted or failed), so units start in index order whatever
//! order their callers arrive in. Different chapters and projects proceed
//! independently.
//!
//! Entries live only while a [`ChapterHandle`] for them exists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{MutexGuard, watch};

type ChapterKey = (String, u32);
type Chapters = Arc<Mutex<HashMap<ChapterKey, Arc<ChapterState>>>>;

struct ChapterState {
    turn: tokio::sync::Mutex<()>,
    finished: watch::Sender<u32>,
}

impl Default for ChapterState {
    fn default() -> Self {
        let (finished, _) = watch::channel(0);
        Self {
            turn: tokio::sync::Mutex::new(()),
            finished,
        }
    }
}

#[derive(Default)]
pub struct ChapterSequencer {
    chapters: Chapters,
}

impl ChapterSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a chapter's ordering state, creating it if no one holds it.
    pub fn chapter(&self, project: &str, chapter: u32) -> ChapterHandle {
        let key = (project.to_string(), chapter);
        let state = self
            .chapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        ChapterHandle {
            key,
            state,
            chapters: self.chapters.clone(),
        }
    }

    /// Chapters with at least one live handle.
    pub fn tracked(&self) -> usize {
        self.chapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One caller's hold on a chapter. The chapter's entry is dropped with its
/// last handle.
pub struct ChapterHandle {
    key: ChapterKey,
    state: Arc<ChapterState>,
    chapters: Chapters,
}

impl ChapterHandle {
    /// Wait for exclusive access to the chapter. Held until the guard drops.
    pub async fn turn(&self) -> MutexGuard<'_, ()> {
        self.state.turn.lock().await
    }

    /// Highest unit index that has finished so far.
    pub fn finished(&self) -> u32 {
        *self.state.finished.borrow()
    }

    /// Watch the finished watermark.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.state.finished.subscribe()
    }

    /// Record that `unit` reached a terminal state. The watermark never
    /// moves backwards.
    pub fn finish(&self, unit: u32) {
        self.state.finished.send_if_modified(|finished| {
            let advanced = unit > *finished;
            if advanced {
                *finished = unit;
            }
            advanced
        });
    }
}

impl Drop for ChapterHandle {
    fn drop(&mut self) {
        let mut chapters = self.chapters.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only created under this lock, so the count is stable
        // here: one reference in the map, one in this handle.
        if Arc::strong_count(&self.state) == 2 {
            chapters.remove(&self.key);
        }
    }
}
