//! Credential redaction for captured output.
//!
//! Every byte of captured stdout/stderr passes through a [`Redactor`] before
//! it can reach a log line, an error message, or the build report. This holds
//! on failure paths too, including messages thrown by underlying tools.

/// Replacement marker for redacted values.
pub const MASK: &str = "[REDACTED]";

/// Replaces configured secret literals in text with [`MASK`].
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

impl Redactor {
    /// Creates a redactor for the given secret values.
    ///
    /// Empty and whitespace-only values are ignored; masking them would turn
    /// every string into noise. Longer secrets are masked first so a secret
    /// that contains another secret as a substring is removed whole.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut secrets: Vec<String> = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s| !s.trim().is_empty())
            .collect();
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        secrets.dedup();
        Self { secrets }
    }

    /// Adds another secret value.
    pub fn add(&mut self, secret: impl Into<String>) {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.secrets.push(secret);
            self.secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
            self.secrets.dedup();
        }
    }

    /// Returns `text` with every secret occurrence replaced by [`MASK`].
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_every_occurrence() {
        let r = Redactor::new(["hunter2"]);
        let out = r.redact("password=hunter2 retry with hunter2");
        assert!(!out.contains("hunter2"));
        assert_eq!(out.matches(MASK).count(), 2);
    }

    #[test]
    fn longer_secret_masked_whole() {
        let r = Redactor::new(["abc", "abcdef"]);
        assert_eq!(r.redact("token abcdef"), format!("token {MASK}"));
    }

    #[test]
    fn empty_secret_ignored() {
        let r = Redactor::new(["", "  "]);
        assert_eq!(r.redact("plain text"), "plain text");
    }

    #[test]
    fn untouched_without_match() {
        let r = Redactor::new(["secret"]);
        assert_eq!(r.redact("nothing to hide"), "nothing to hide");
    }
}
