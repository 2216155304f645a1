//! Credential resolution for a build.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Result, StagegateError};

use super::backend::SecretBackend;
use super::mask::OutputMasker;

const REDACTED: &str = "[REDACTED]";

/// A resolved credential.
///
/// The value is only reachable through [`Credential::expose`]; `Debug` and
/// `Display` never print it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    id: String,
    value: String,
}

impl Credential {
    /// Credential id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw secret value.
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("value", &REDACTED)
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id, REDACTED)
    }
}

/// Credentials resolved for one build, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCredentials {
    by_id: BTreeMap<String, Credential>,
}

impl ResolvedCredentials {
    /// Look up a credential by id.
    pub fn get(&self, id: &str) -> Option<&Credential> {
        self.by_id.get(id)
    }

    /// Number of resolved credentials.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Environment entries for `(id, env var)` bindings.
    ///
    /// Bindings naming an unresolved id are skipped.
    pub fn bind<'a>(
        &self,
        bindings: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> BTreeMap<String, String> {
        bindings
            .into_iter()
            .filter_map(|(id, env)| {
                self.by_id
                    .get(id)
                    .map(|c| (env.to_string(), c.value.clone()))
            })
            .collect()
    }

    /// A masker seeded with every resolved value.
    pub fn masker(&self) -> OutputMasker {
        let mut masker = OutputMasker::new();
        masker.add_secrets(self.by_id.values().map(|c| c.value.clone()));
        masker
    }
}

/// Resolves named credentials once per build.
pub struct SecretStore {
    backend: Box<dyn SecretBackend>,
    resolved: bool,
}

impl SecretStore {
    /// Create a store over a backend.
    pub fn new(backend: Box<dyn SecretBackend>) -> Self {
        Self {
            backend,
            resolved: false,
        }
    }

    /// Resolve every id, failing on the first one the backend cannot supply.
    ///
    /// Values are write-once: a second call on the same store is rejected.
    ///
    /// # Errors
    ///
    /// Returns `CredentialResolution` naming the first unresolvable id, or
    /// when the store has already resolved.
    pub fn resolve(&mut self, ids: &BTreeSet<String>) -> Result<ResolvedCredentials> {
        if self.resolved {
            return Err(StagegateError::CredentialResolution {
                id: ids.iter().next().cloned().unwrap_or_default(),
                message: "credentials were already resolved for this build".to_string(),
            });
        }
        self.resolved = true;

        let mut by_id = BTreeMap::new();
        for id in ids {
            let value = self.backend.fetch(id).map_err(|e| {
                tracing::error!(credential = %id, backend = self.backend.name(), "credential resolution failed");
                StagegateError::CredentialResolution {
                    id: id.clone(),
                    message: e.to_string(),
                }
            })?;
            by_id.insert(
                id.clone(),
                Credential {
                    id: id.clone(),
                    value,
                },
            );
        }

        tracing::info!(
            backend = self.backend.name(),
            count = by_id.len(),
            "resolved credentials"
        );

        Ok(ResolvedCredentials { by_id })
    }
}
