//! Replaceable heuristic strategies behind the continuity checks.
//!
//! Each trait has a keyword-based default. Swapping a strategy changes what
//! a check detects without touching the checks, the scoring formula, or the
//! orchestrator.

use crate::text::{Phrase, mentions, sentences, words};
use inkweave_core::thread::PlotThread;
use inkweave_core::world::WorldRule;

// ── Tone ─────────────────────────────────────────────────────────────────

/// Detects the emotional tone of a passage and compares tone labels.
pub trait ToneDetector: Send + Sync {
    /// The detected tone label, or `None` when the text carries no clear
    /// signal.
    fn detect(&self, text: &str) -> Option<String>;

    /// Whether a detected tone satisfies the target. `None` means the
    /// target is unknown to this detector and cannot be judged.
    fn matches(&self, detected: &str, target: &str) -> Option<bool>;
}

/// A detectable tone: its label, its synonyms, and the words that signal
/// it. Tones sharing a `family` satisfy each other as targets.
struct ToneGroup {
    label: &'static str,
    family: &'static str,
    synonyms: &'static [&'static str],
    lexicon: &'static [&'static str],
}

const TONE_GROUPS: &[ToneGroup] = &[
    ToneGroup {
        label: "tense",
        family: "tense",
        synonyms: &["tense", "suspenseful", "anxious", "ominous", "urgent", "dread", "fearful"],
        lexicon: &[
            "heart", "pounding", "breath", "trembled", "shadow", "shadows", "footsteps", "silence",
            "waited", "danger", "fear", "afraid", "whisper", "whispered", "creak", "creaked",
            "sudden", "suddenly", "froze", "sweat", "panic",
        ],
    },
    ToneGroup {
        label: "somber",
        family: "somber",
        synonyms: &["somber", "sombre", "dark", "grim", "bleak", "melancholic", "sad", "mournful", "grief"],
        lexicon: &[
            "grief", "mourned", "funeral", "tears", "wept", "loss", "grave", "ashes", "empty",
            "hollow", "cold", "grey", "gray", "sorrow", "alone", "lonely", "died", "buried",
        ],
    },
    ToneGroup {
        label: "joyful",
        family: "joyful",
        synonyms: &["joyful", "happy", "cheerful", "lighthearted", "warm", "hopeful", "celebratory"],
        lexicon: &[
            "laughed", "laughter", "smiled", "smile", "grinned", "bright", "sunlight", "joy",
            "delight", "danced", "cheered", "celebrate", "warmth", "glad", "sang",
        ],
    },
    ToneGroup {
        label: "calm",
        family: "calm",
        synonyms: &["calm", "peaceful", "serene", "reflective", "quiet", "contemplative", "gentle"],
        lexicon: &[
            "quiet", "gentle", "softly", "still", "stillness", "peace", "rested", "slow", "slowly",
            "drifted", "breeze", "calm", "content", "murmured",
        ],
    },
    ToneGroup {
        label: "angry",
        // Anger reads as tension: {angry, furious, tense} are one group.
        family: "tense",
        synonyms: &["angry", "furious", "hostile", "aggressive", "bitter", "resentful"],
        lexicon: &[
            "shouted", "snarled", "slammed", "rage", "fury", "furious", "glared", "spat",
            "clenched", "hissed", "struck", "hate", "hated", "roared",
        ],
    },
    ToneGroup {
        label: "romantic",
        family: "romantic",
        synonyms: &["romantic", "tender", "intimate", "longing"],
        lexicon: &[
            "kissed", "kiss", "embrace", "embraced", "caress", "longing", "beloved", "tender",
            "blushed", "heartbeat", "touch",
        ],
    },
    ToneGroup {
        label: "humorous",
        family: "humorous",
        synonyms: &["humorous", "comic", "comedic", "playful", "whimsical", "wry"],
        lexicon: &["joke", "joked", "chuckled", "giggled", "absurd", "ridiculous", "teased", "snorted", "wink"],
    },
];

fn group_of(label: &str) -> Option<&'static ToneGroup> {
    let label = label.trim().to_lowercase();
    TONE_GROUPS
        .iter()
        .find(|g| g.label == label || g.synonyms.contains(&label.as_str()))
}

/// Lexicon-count tone detector over the fixed equivalence groups.
///
/// Question marks and ellipses add weight to "tense", exclamation marks to
/// "angry". A group needs at least `min_signal` points to be reported;
/// ties go to the group listed first.
#[derive(Debug, Clone, Copy)]
pub struct KeywordToneDetector {
    pub min_signal: f64,
}

impl Default for KeywordToneDetector {
    fn default() -> Self {
        Self { min_signal: 2.0 }
    }
}

impl ToneDetector for KeywordToneDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let tokens = words(text);
        let questions = text.matches('?').count() as f64;
        let ellipses = text.matches("...").count() as f64;
        let exclamations = text.matches('!').count() as f64;

        let mut best: Option<(&ToneGroup, f64)> = None;
        for group in TONE_GROUPS {
            let mut score = tokens
                .iter()
                .filter(|t| group.lexicon.contains(&t.as_str()))
                .count() as f64;
            match group.label {
                "tense" => score += 0.5 * (questions + ellipses),
                "angry" => score += 0.5 * exclamations,
                _ => {}
            }
            if score >= self.min_signal && best.is_none_or(|(_, s)| score > s) {
                best = Some((group, score));
            }
        }
        best.map(|(g, _)| g.label.to_string())
    }

    fn matches(&self, detected: &str, target: &str) -> Option<bool> {
        let target = group_of(target)?;
        Some(group_of(detected).is_some_and(|d| d.family == target.family))
    }
}

// ── Plot resolution ──────────────────────────────────────────────────────

/// Decides whether a sentence resolves a plot thread.
pub trait ResolutionDetector: Send + Sync {
    fn resolves(&self, sentence: &str, thread: &PlotThread) -> bool;
}

/// Flags a sentence that names the thread alongside a resolution keyword.
///
/// Keywords are compiled once; the thread name is only matched in
/// sentences that already carry a keyword.
#[derive(Debug, Clone)]
pub struct KeywordResolutionDetector {
    keywords: Vec<Phrase>,
}

impl KeywordResolutionDetector {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| Phrase::new(k.as_ref(), true))
                .collect(),
        }
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(Phrase::as_str)
    }
}

impl Default for KeywordResolutionDetector {
    fn default() -> Self {
        Self::new([
            "resolved", "solved", "settled", "ended", "finished", "concluded", "paid off",
            "was over", "came to an end", "at last", "finally", "revealed", "confessed",
            "defeated", "no longer",
        ])
    }
}

impl ResolutionDetector for KeywordResolutionDetector {
    fn resolves(&self, sentence: &str, thread: &PlotThread) -> bool {
        self.keywords.iter().any(|k| k.is_in(sentence)) && mentions(sentence, &thread.name, true)
    }
}

/// Every sentence of `text` that the detector says resolves `thread`.
pub fn resolving_sentences<'a>(
    detector: &dyn ResolutionDetector,
    text: &'a str,
    thread: &PlotThread,
) -> Vec<&'a str> {
    sentences(text)
        .into_iter()
        .filter(|s| detector.resolves(s, thread))
        .collect()
}

// ── World rules ──────────────────────────────────────────────────────────

/// Finds suspected violations of a world rule.
pub trait WorldRuleChecker: Send + Sync {
    /// The offending phrases found in `text`; empty when none.
    fn violations(&self, text: &str, rule: &WorldRule) -> Vec<String>;
}

/// Matches each of the rule's limitation phrases case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRuleChecker;

impl WorldRuleChecker for KeywordRuleChecker {
    fn violations(&self, text: &str, rule: &WorldRule) -> Vec<String> {
        rule.limitations
            .iter()
            .filter(|phrase| mentions(text, phrase, true))
            .cloned()
            .collect()
    }
}

// ── Locations ────────────────────────────────────────────────────────────

/// Detects which known locations a passage mentions.
pub trait LocationDetector: Send + Sync {
    /// Mentioned names from `known`, in `known` order.
    fn detect(&self, text: &str, known: &[String]) -> Vec<String>;
}

/// Case-insensitive whole-phrase match against the project's roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct RosterLocationDetector;

impl LocationDetector for RosterLocationDetector {
    fn detect(&self, text: &str, known: &[String]) -> Vec<String> {
        known
            .iter()
            .filter(|name| mentions(text, name, true))
            .cloned()
            .collect()
    }
}
