//! Path patterns that bypass the API-key gate.
//!
//! Patterns use Ant-style globs:
//! - `?` matches one character within a path segment
//! - `*` matches any run of characters within a path segment
//! - `**` matches any number of segments; `/docs/**` also matches `/docs` itself
//!
//! Matching is case-sensitive and anchored at both ends.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;

#[derive(Clone)]
pub struct ExclusionRule {
    pattern: String,
    regex: Regex,
}

impl ExclusionRule {
    /// Compile a single glob pattern.
    ///
    /// # Errors
    /// Returns an error if the pattern is empty or cannot be compiled.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            anyhow::bail!("exclusion pattern must not be empty");
        }

        let regex = Regex::new(&glob_to_regex(pattern))
            .with_context(|| format!("Invalid exclusion pattern: {pattern}"))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl fmt::Debug for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExclusionRule").field(&self.pattern).finish()
    }
}

/// Compile patterns in configuration order.
///
/// # Errors
/// Returns the first pattern that fails to compile.
pub fn compile<I, S>(patterns: I) -> Result<Vec<ExclusionRule>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| ExclusionRule::new(pattern.as_ref()))
        .collect()
}

/// First rule matching `path`, in configuration order.
#[must_use]
pub fn first_match<'a>(rules: &'a [ExclusionRule], path: &str) -> Option<&'a ExclusionRule> {
    rules.iter().find(|rule| rule.matches(path))
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2 + 2);
    regex.push('^');

    let mut rest = pattern;
    while !rest.is_empty() {
        // "/**" swallows zero or more whole segments, including the slash
        if let Some(tail) = rest.strip_prefix("/**") {
            if tail.is_empty() || tail.starts_with('/') {
                regex.push_str("(?:/.*)?");
                rest = tail;
                continue;
            }
        }

        if let Some(tail) = rest.strip_prefix("**") {
            regex.push_str(".*");
            rest = tail;
            continue;
        }

        let mut chars = rest.chars();
        match chars.next() {
            Some('*') => regex.push_str("[^/]*"),
            Some('?') => regex.push_str("[^/]"),
            Some(c) => {
                let mut buf = [0u8; 4];
                regex.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
            None => break,
        }
        rest = chars.as_str();
    }

    regex.push('$');
    regex
}
