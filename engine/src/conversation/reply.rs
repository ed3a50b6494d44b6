//! Reply post-processing
//!
//! Models sometimes echo the prompt's role labels (`AI: ...`) or wrap words
//! in markdown emphasis. Stored memory keeps the label text as returned; the
//! speech path removes both.

use regex::Regex;

/// Remove every `*` from `text`
pub fn strip_emphasis(text: &str) -> String {
    text.replace('*', "")
}

/// Removes role labels from text headed for speech output
#[derive(Debug, Clone)]
pub struct LabelStripper {
    labels: Regex,
}

impl LabelStripper {
    /// Build a stripper for the given role labels
    ///
    /// Labels match case-sensitively, at a word boundary, followed by a
    /// colon and any whitespace.
    pub fn new<'a>(labels: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let alternatives: Vec<String> = labels
            .into_iter()
            .filter(|label| !label.trim().is_empty())
            .map(|label| regex::escape(label.trim()))
            .collect();

        if alternatives.is_empty() {
            anyhow::bail!("at least one role label is required");
        }

        let labels = Regex::new(&format!(r"\b(?:{}):\s*", alternatives.join("|")))?;
        Ok(Self { labels })
    }

    /// Text to hand to the synthesizer
    ///
    /// Idempotent: running the result through again changes nothing.
    pub fn for_speech(&self, reply: &str) -> String {
        let text = strip_emphasis(reply);
        self.labels.replace_all(&text, "").trim().to_string()
    }
}
