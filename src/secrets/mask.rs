//! Redaction of credential values in captured output.

/// Replaces known secret values with a fixed mask.
///
/// Longer secrets are replaced first so a secret that contains another one
/// never leaks its remainder.
///
/// # Example
///
/// ```
/// use stagegate::secrets::OutputMasker;
///
/// let mut masker = OutputMasker::new();
/// masker.add_secret("s3cr3t-token");
///
/// let output = masker.mask("Authorization: Bearer s3cr3t-token");
/// assert_eq!(output, "Authorization: Bearer [REDACTED]");
/// ```
#[derive(Debug, Clone)]
pub struct OutputMasker {
    /// Secret values, longest first.
    secrets: Vec<String>,
    mask: String,
}

impl OutputMasker {
    /// Create a masker with the default `[REDACTED]` mask.
    pub fn new() -> Self {
        Self::with_mask("[REDACTED]")
    }

    /// Create a masker with a custom mask string.
    pub fn with_mask(mask: impl Into<String>) -> Self {
        Self {
            secrets: Vec::new(),
            mask: mask.into(),
        }
    }

    /// Register a secret value. Empty strings and duplicates are ignored.
    ///
    /// Output is masked one line at a time, so each line of a multi-line
    /// value (a PEM key, say) is registered as well.
    pub fn add_secret(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.contains('\n') {
            for line in value.lines() {
                self.insert(line);
            }
        }
        self.insert(&value);
    }

    fn insert(&mut self, value: &str) {
        if value.trim().is_empty() || self.secrets.iter().any(|s| s == value) {
            return;
        }
        let pos = self
            .secrets
            .iter()
            .position(|s| s.len() < value.len())
            .unwrap_or(self.secrets.len());
        self.secrets.insert(pos, value.to_string());
    }

    /// Register multiple secret values.
    pub fn add_secrets(&mut self, values: impl IntoIterator<Item = impl Into<String>>) {
        for value in values {
            self.add_secret(value);
        }
    }

    /// Mask every registered secret in `input`.
    pub fn mask(&self, input: &str) -> String {
        self.secrets
            .iter()
            .fold(input.to_string(), |acc, secret| acc.replace(secret, &self.mask))
    }

    /// Number of registered secrets.
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }
}

impl Default for OutputMasker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_every_occurrence() {
        let mut masker = OutputMasker::new();
        masker.add_secret("hunter2");

        let output = masker.mask("pass=hunter2 again=hunter2");
        assert_eq!(output, "pass=[REDACTED] again=[REDACTED]");
    }

    #[test]
    fn longer_secret_wins_over_contained_secret() {
        let mut masker = OutputMasker::new();
        masker.add_secret("abc");
        masker.add_secret("abcdef");

        let output = masker.mask("token abcdef");
        assert_eq!(output, "token [REDACTED]");
        assert!(!output.contains("def"));
    }

    #[test]
    fn ignores_empty_and_duplicate_secrets() {
        let mut masker = OutputMasker::new();
        masker.add_secrets(["", "one", "one"]);
        assert_eq!(masker.secret_count(), 1);
    }

    #[test]
    fn custom_mask() {
        let mut masker = OutputMasker::with_mask("****");
        masker.add_secret("smtp-pass");
        assert_eq!(masker.mask("login smtp-pass"), "login ****");
    }

    #[test]
    fn no_secrets_is_identity() {
        let masker = OutputMasker::default();
        assert_eq!(masker.mask("plain output"), "plain output");
    }

    #[test]
    fn multi_line_secret_is_masked_line_by_line() {
        let mut masker = OutputMasker::new();
        masker.add_secret("line-one-secret\r\nline-two-secret\n");

        assert_eq!(masker.mask("line-one-secret"), "[REDACTED]");
        assert_eq!(masker.mask("key: line-two-secret"), "key: [REDACTED]");
        assert_eq!(
            masker.mask("line-one-secret\r\nline-two-secret\n"),
            "[REDACTED]"
        );
    }
}
