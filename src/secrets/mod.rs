//! Credential resolution and output masking.
//!
//! - [`SecretStore`] - resolves credential ids once per build through a
//!   [`SecretBackend`]
//! - [`OutputMasker`] - redacts resolved values from captured output
//! - [`SecretMatcher`] - flags secret-looking parameter names
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use stagegate::secrets::{MemoryBackend, SecretStore};
//!
//! let backend = MemoryBackend::new().with("jira-token", "t0k3n");
//! let mut store = SecretStore::new(Box::new(backend));
//!
//! let ids: BTreeSet<String> = ["jira-token".to_string()].into();
//! let creds = store.resolve(&ids).unwrap();
//!
//! let masker = creds.masker();
//! assert_eq!(masker.mask("token=t0k3n"), "token=[REDACTED]");
//! ```

pub mod backend;
pub mod mask;
pub mod pattern;
pub mod store;

pub use backend::{EnvBackend, FileBackend, MemoryBackend, SecretBackend, ENV_SECRET_PREFIX};
pub use mask::OutputMasker;
pub use pattern::{SecretMatcher, SecretPattern, BUILTIN_PATTERNS};
pub use store::{Credential, ResolvedCredentials, SecretStore};
