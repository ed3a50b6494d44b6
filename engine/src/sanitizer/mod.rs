use regex::Regex;
use sdk::types::Utterance;
use std::fmt;

/// Default upper bound on utterance length, in characters
pub const DEFAULT_MAX_CHARS: usize = 500;

/// Why the sanitizer refused an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The trimmed text is longer than the configured limit
    TooLong { chars: usize, limit: usize },

    /// The text contains a character sequence that is never forwarded
    DisallowedSequence {
        /// The sequence that matched
        matched: String,
        /// Byte position in the trimmed text
        position: usize,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooLong { chars, limit } => {
                write!(f, "utterance is {} characters, limit is {}", chars, limit)
            }
            Rejection::DisallowedSequence { matched, position } => {
                write!(f, "disallowed sequence {:?} at byte {}", matched, position)
            }
        }
    }
}

/// Result of validating one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Accepted; the utterance carries `valid == true`
    Valid(Utterance),

    /// Nothing was said (empty or whitespace only)
    Empty,

    /// Refused before reaching the generator
    Rejected(Rejection),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid(_))
    }
}

/// Screens transcribed text before it is placed in a prompt
///
/// The checks are a heuristic against text that could corrupt log lines or
/// the role-labelled prompt format: a length cap and a fixed set of
/// disallowed characters (`;`, `--`, `<`, `>`, and the backtick).
///
/// # Example
///
/// ```
/// use parley_engine::sanitizer::{Sanitizer, Validation};
///
/// let sanitizer = Sanitizer::new().unwrap();
///
/// assert!(sanitizer.validate("what's the weather like").is_valid());
/// assert_eq!(sanitizer.validate("   "), Validation::Empty);
/// assert!(matches!(sanitizer.validate("drop table; --"), Validation::Rejected(_)));
/// ```
pub struct Sanitizer {
    disallowed: Regex,
    max_chars: usize,
}

impl Sanitizer {
    /// Create a sanitizer with the default length limit
    ///
    /// # Errors
    ///
    /// Returns an error if the disallowed-sequence pattern fails to compile.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_max_chars(DEFAULT_MAX_CHARS)
    }

    /// Create a sanitizer with a custom length limit
    pub fn with_max_chars(max_chars: usize) -> anyhow::Result<Self> {
        let disallowed = Regex::new(r"[;<>`]|--")?;

        Ok(Self {
            disallowed,
            max_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Find the first disallowed sequence in `text`
    pub fn scan(&self, text: &str) -> Option<Rejection> {
        self.disallowed
            .find(text)
            .map(|m| Rejection::DisallowedSequence {
                matched: m.as_str().to_string(),
                position: m.start(),
            })
    }

    /// Validate one transcribed utterance
    ///
    /// Emptiness is decided on the trimmed text and wins over every other
    /// check. Rejections are logged at `warn`; nothing else happens.
    pub fn validate(&self, raw: &str) -> Validation {
        let mut utterance = Utterance::new(raw);

        if utterance.is_empty() {
            tracing::debug!("No input detected");
            return Validation::Empty;
        }

        let chars = utterance.text.chars().count();
        if chars > self.max_chars {
            let rejection = Rejection::TooLong {
                chars,
                limit: self.max_chars,
            };
            tracing::warn!("Rejected utterance: {}", rejection);
            return Validation::Rejected(rejection);
        }

        if let Some(rejection) = self.scan(&utterance.text) {
            tracing::warn!("Rejected utterance: {}", rejection);
            return Validation::Rejected(rejection);
        }

        utterance.valid = true;
        Validation::Valid(utterance)
    }
}
