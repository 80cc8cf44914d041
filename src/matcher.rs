use regex::Regex;
use tracing::trace;

use crate::domain::CCError;

/// Characters that carry meaning in a regex and have to be escaped before a
/// target can be used as a literal.
pub const REGEX_SPECIAL_CHARS: &[char] = &[
    '.', '+', '*', '?', '^', '$', '(', ')', '[', ']', '{', '}', '|', '\\',
];

/// The compiled set of things to look for.
///
/// Built from free form user text where targets are separated by single
/// spaces. A target containing a space can therefore not be expressed.
#[derive(Debug, Clone)]
pub struct MatchSet {
    targets: Vec<String>,
    pattern: String,
    regex: Option<Regex>,
}

impl Default for MatchSet {
    fn default() -> Self {
        MatchSet::empty()
    }
}

impl MatchSet {
    pub fn empty() -> Self {
        MatchSet {
            targets: Vec::new(),
            pattern: String::new(),
            regex: None,
        }
    }

    pub fn compile(raw: &str) -> Result<Self, CCError> {
        let mut targets: Vec<String> = Vec::new();
        for token in raw.split(' ').filter(|t| !t.is_empty()) {
            let target = if token.contains(REGEX_SPECIAL_CHARS) {
                regex::escape(token)
            } else {
                token.to_string()
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        if targets.is_empty() {
            trace!("No check characters in \"{raw}\"");
            return Ok(MatchSet::empty());
        }

        let pattern = targets.join("|");
        let regex = Regex::new(&pattern)?;
        trace!("Compiled {} targets into \"{pattern}\"", targets.len());
        Ok(MatchSet {
            targets,
            pattern,
            regex: Some(regex),
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// An empty set matches nothing, callers should not scan with it.
    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(value))
    }

    /// Null cells never match.
    pub fn is_match_opt(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| self.is_match(v))
    }
}
