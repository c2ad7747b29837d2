//! Text helpers shared by the checks and metrics.

use regex_lite::Regex;

/// Whether `phrase` occurs in `text` as a whole word or phrase.
///
/// Compiles a pattern per call; hold a [`Phrase`] when matching the same
/// phrase repeatedly.
pub fn mentions(text: &str, phrase: &str, case_insensitive: bool) -> bool {
    Phrase::new(phrase, case_insensitive).is_in(text)
}

/// A whole-word phrase matcher, compiled once.
///
/// Word boundaries are only required on sides where the phrase itself
/// starts or ends with a word character, so "St. Albans" still matches.
#[derive(Debug, Clone)]
pub struct Phrase {
    phrase: String,
    case_insensitive: bool,
    pattern: Option<Regex>,
}

impl Phrase {
    pub fn new(phrase: &str, case_insensitive: bool) -> Self {
        let phrase = phrase.trim().to_string();
        let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
        let pattern = if phrase.is_empty() {
            None
        } else {
            Regex::new(&format!(
                "{}{}{}{}",
                if case_insensitive { "(?i)" } else { "" },
                if is_word(phrase.chars().next()) { r"\b" } else { "" },
                regex_lite::escape(&phrase),
                if is_word(phrase.chars().last()) { r"\b" } else { "" },
            ))
            .ok()
        };
        Self {
            phrase,
            case_insensitive,
            pattern,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    pub fn is_in(&self, text: &str) -> bool {
        if self.phrase.is_empty() {
            return false;
        }
        match &self.pattern {
            Some(re) => re.is_match(text),
            None if self.case_insensitive => text.to_lowercase().contains(&self.phrase.to_lowercase()),
            None => text.contains(&self.phrase),
        }
    }
}

/// Split into sentences on runs of `.`, `!`, `?` (closing quotes and
/// brackets stay with their sentence). Fragments without any letter or
/// digit are dropped.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if matches!(n, '.' | '!' | '?' | '"' | '\'' | ')' | '\u{201d}' | '\u{2019}') {
                end = j + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        push_sentence(&mut out, &text[start..end]);
        start = end;
    }
    push_sentence(&mut out, &text[start..]);
    out
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, fragment: &'a str) {
    let trimmed = fragment.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        out.push(trimmed);
    }
}

/// Lowercased word tokens; apostrophes inside words are kept.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_respects_word_boundaries() {
        assert!(mentions("Mara stepped aside.", "Mara", false));
        assert!(!mentions("Maranth stepped aside.", "Mara", false));
        assert!(!mentions("mara stepped aside.", "Mara", false));
        assert!(mentions("They reached the HARBOR.", "harbor", true));
        assert!(mentions("He rode to St. Albans.", "St. Albans", false));
        assert!(!mentions("anything", "   ", true));
    }

    #[test]
    fn compiled_phrase_is_reusable() {
        let harbor = Phrase::new("  the harbor ", true);
        assert_eq!(harbor.as_str(), "the harbor");
        assert!(harbor.is_in("They reached THE HARBOR at dusk."));
        assert!(harbor.is_in("Back to the harbor."));
        assert!(!harbor.is_in("The harbormaster waved."));
        assert!(!Phrase::new("", true).is_in("anything"));
    }

    #[test]
    fn mentions_escapes_metacharacters() {
        assert!(mentions("The (old) mill stood.", "(old) mill", true));
        assert!(!mentions("The old mill stood.", "(old) mill", true));
    }

    #[test]
    fn sentence_split_handles_runs_and_quotes() {
        let s = sentences("\"Run!\" she said. Why?! Because... it's late");
        assert_eq!(s, vec!["\"Run!\"", "she said.", "Why?!", "Because...", "it's late"]);
    }

    #[test]
    fn sentence_split_drops_empty_fragments() {
        assert!(sentences("  ... !! ").is_empty());
        assert_eq!(sentences("One sentence").len(), 1);
    }

    #[test]
    fn words_lowercase_and_keep_contractions() {
        assert_eq!(words("Don't STOP, 'now'."), vec!["don't", "stop", "now"]);
    }
}
