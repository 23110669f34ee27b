//! Domain model (manifests, retention policy, result accounting, errors).
//!
//! ネットワークや時計には依存しない純粋な型だけを置きます。

pub mod errors;
pub mod manifest;
pub mod policy;
pub mod result;

pub use errors::{ErrorKind, RegistryError};
pub use manifest::{ArtifactManifest, Digest};
pub use policy::{Classification, RetentionPolicy, classify};
pub use result::{CleanupResult, FailedDeletion, RunStatus, SweepMode};
