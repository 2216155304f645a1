//! Secret-looking names.
//!
//! Trigger parameters are plain values, but some carry secrets (a trigger
//! token, for instance). Parameters whose names match these patterns are
//! masked in output exactly like resolved credentials.

use regex::Regex;

/// A pattern that identifies secret names.
#[derive(Debug, Clone)]
pub struct SecretPattern {
    /// Name of this pattern (for debugging).
    pub name: String,
    /// Regex matched against parameter or variable names.
    pub name_pattern: Regex,
}

/// Built-in patterns as (name, regex) pairs.
pub const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("api_key", r"(?i)(API_?KEY)$"),
    ("secret", r"(?i)SECRET(_KEY)?$"),
    ("token", r"(?i)TOKEN$"),
    ("password", r"(?i)(PASSWORD|PASSWD|PASS)$"),
    ("credential", r"(?i)CREDENTIALS?$"),
    ("private_key", r"(?i)PRIVATE_KEY$"),
];

/// Matches names against secret patterns.
///
/// # Example
///
/// ```
/// use stagegate::secrets::SecretMatcher;
///
/// let matcher = SecretMatcher::with_builtins();
/// assert!(matcher.is_secret("trigger_token"));
/// assert!(matcher.is_secret("SMTP_PASS"));
/// assert!(!matcher.is_secret("project_key"));
/// ```
#[derive(Debug, Clone)]
pub struct SecretMatcher {
    patterns: Vec<SecretPattern>,
}

impl SecretMatcher {
    /// Create a matcher with built-in patterns.
    pub fn with_builtins() -> Self {
        let patterns = BUILTIN_PATTERNS
            .iter()
            .filter_map(|(name, pattern)| {
                Regex::new(pattern).ok().map(|name_pattern| SecretPattern {
                    name: name.to_string(),
                    name_pattern,
                })
            })
            .collect();

        Self { patterns }
    }

    /// Add a custom pattern.
    pub fn add_pattern(&mut self, pattern: SecretPattern) {
        self.patterns.push(pattern);
    }

    /// Check whether a name matches any secret pattern.
    pub fn is_secret(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.name_pattern.is_match(name))
    }
}

impl Default for SecretMatcher {
    fn default() -> Self {
        Self::with_builtins()
    }
}
