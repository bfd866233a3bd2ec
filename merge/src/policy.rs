/// What to do with one field when the persisted copy differs from the fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Never touch the destination (fresh configuration wins silently).
    Skip,
    /// Copy the source value over the destination when they differ.
    TakeOnChange,
}

/// Table of field policies for one state struct.
///
/// Fields without an entry are protected: a differing value is rejected
/// with a warning and the destination keeps its value.
#[derive(Debug, Clone, Copy)]
pub struct MergePolicy {
    fields: &'static [(&'static str, FieldPolicy)],
}

impl MergePolicy {
    /// Create a policy from a static table.
    pub const fn new(fields: &'static [(&'static str, FieldPolicy)]) -> Self {
        Self { fields }
    }

    /// Policy for `field`, if the table names it.
    pub fn get(&self, field: &str) -> Option<FieldPolicy> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, policy)| *policy)
    }

    pub fn is_skipped(&self, field: &str) -> bool {
        self.get(field) == Some(FieldPolicy::Skip)
    }

    pub fn is_taken(&self, field: &str) -> bool {
        self.get(field) == Some(FieldPolicy::TakeOnChange)
    }
}
