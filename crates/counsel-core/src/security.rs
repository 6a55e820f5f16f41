use std::fmt;

use crate::CounselError;

/// Provider credential. Never printed by `Debug` or `Display`.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<hidden>)")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<hidden>")
    }
}

/// Read a credential from the environment; blank values count as missing.
pub fn require_env(var: &str) -> Result<SecretValue, CounselError> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretValue)
        .ok_or_else(|| CounselError::MissingSecret(var.to_string()))
}
