//! Post-processing of raw generated text before evaluation.

use async_trait::async_trait;
use inkweave_core::service::PostProcessor;
use regex_lite::Regex;

/// Strips wrapper noise the generator tends to add and normalises
/// whitespace.
///
/// - Surrounding code fences are removed.
/// - A leading "Here is the scene:" style preamble line is removed.
/// - Trailing spaces are trimmed, runs of spaces collapse to one, and
///   more than one blank line collapses to a single blank line.
pub struct TextCleanup {
    preamble: Option<Regex>,
}

impl TextCleanup {
    pub fn new() -> Self {
        let preamble = Regex::new(
            r"(?i)^\s*(sure|certainly|of course|here is|here's)\b[^\n]*:[ \t]*\n",
        )
        .ok();
        Self { preamble }
    }

    pub fn clean(&self, text: &str) -> String {
        let mut text = text.replace("\r\n", "\n");

        let trimmed = text.trim();
        if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() > 6 {
            let inner = &trimmed[3..trimmed.len() - 3];
            // Drop the info string after the opening fence.
            let inner = inner.split_once('\n').map_or(inner, |(_, rest)| rest);
            text = inner.to_string();
        }

        if let Some(re) = &self.preamble {
            text = re.replace(&text, "").into_owned();
        }

        let mut out = String::with_capacity(text.len());
        let mut blank_run = 0;
        for line in text.lines() {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            out.push_str(&line);
            out.push('\n');
        }
        out.trim().to_string()
    }
}

impl Default for TextCleanup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostProcessor for TextCleanup {
    fn name(&self) -> &str {
        "text_cleanup"
    }

    async fn process(&self, text: String) -> String {
        self.clean(&text)
    }
}
