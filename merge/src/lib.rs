/// Structural equality over json values
mod compare;
pub use compare::deep_equal;

/// Per-field merge policy tables
mod policy;
pub use policy::{FieldPolicy, MergePolicy};

/// Applying a policy to attribute maps and typed structs
mod update;
pub use update::{merge_into, update_attributes, MergeReport, MergeWarning};

use serde::{de::DeserializeOwned, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}: expected an attribute map")]
    NotAnObject(String),
    #[error("{0}: unable to convert state: {1}")]
    Convert(String, serde_json::Error),
}

/// Implemented by every persisted state struct that takes part in recovery.
///
/// `MERGE_POLICY` says, field by field, what happens when the persisted copy
/// disagrees with the freshly configured one.
pub trait Reconcile: Serialize + DeserializeOwned {
    const MERGE_POLICY: MergePolicy;

    /// Merge a persisted copy of `self` into `self`.
    fn reconcile(&mut self, persisted: &serde_json::Value, label: &str) -> Result<MergeReport, Error> {
        merge_into(self, persisted, &Self::MERGE_POLICY, label)
    }
}
