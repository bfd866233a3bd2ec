use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{deep_equal, Error, FieldPolicy, MergePolicy};

/// A field that could not be merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWarning {
    /// The source has a field the destination doesn't know about.
    Drift { label: String, field: String },
    /// The field differs but the policy doesn't allow taking it.
    Rejected { label: String, field: String },
}

impl MergeWarning {
    pub fn field(&self) -> &str {
        match self {
            Self::Drift { field, .. } | Self::Rejected { field, .. } => field,
        }
    }
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drift { label, field } => write!(
                f,
                "{label}: attribute `{field}` was skipped because it doesn't exist in both objects"
            ),
            Self::Rejected { label, field } => write!(
                f,
                "{label}: update to attribute `{field}` cancelled, because it requires the job to be rerun"
            ),
        }
    }
}

/// Outcome of one `update_attributes` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Fields overwritten in the destination.
    pub taken: Vec<String>,
    pub warnings: Vec<MergeWarning>,
}

impl MergeReport {
    /// True if any destination field was overwritten.
    pub fn updated(&self) -> bool {
        !self.taken.is_empty()
    }

    /// True if any field other than those in `ignore` was overwritten.
    pub fn updated_besides(&self, ignore: &[&str]) -> bool {
        self.taken.iter().any(|field| !ignore.contains(&field.as_str()))
    }

    /// Append another report's results to this one.
    pub fn absorb(&mut self, other: MergeReport) {
        self.taken.extend(other.taken);
        self.warnings.extend(other.warnings);
    }
}

/// Merge the attributes of `src` into `dest` according to `policy`.
///
/// Every field of `src` is either skipped, taken (when it differs), or
/// rejected with a warning. Fields only present in `dest` are left alone.
pub fn update_attributes(
    dest: &mut Map<String, Value>,
    src: &Map<String, Value>,
    policy: &MergePolicy,
    label: &str,
) -> MergeReport {
    let mut report = MergeReport::default();
    for (field, src_val) in src {
        let field_policy = policy.get(field);
        if field_policy == Some(FieldPolicy::Skip) {
            log::trace!("{label}: skipping attribute `{field}`");
            continue;
        }
        let Some(dest_val) = dest.get_mut(field) else {
            let warning = MergeWarning::Drift {
                label: label.to_owned(),
                field: field.clone(),
            };
            log::warn!("{warning}");
            report.warnings.push(warning);
            continue;
        };
        if deep_equal(dest_val, src_val) {
            continue;
        }
        if field_policy == Some(FieldPolicy::TakeOnChange) {
            log::debug!("{label}: taking attribute `{field}`");
            *dest_val = src_val.clone();
            report.taken.push(field.clone());
        } else {
            let warning = MergeWarning::Rejected {
                label: label.to_owned(),
                field: field.clone(),
            };
            log::warn!("{warning}");
            report.warnings.push(warning);
        }
    }
    report
}

/// Run `update_attributes` on the serialized form of `dest`, then rebuild
/// `dest` if anything was taken.
pub fn merge_into<T>(
    dest: &mut T,
    src: &Value,
    policy: &MergePolicy,
    label: &str,
) -> Result<MergeReport, Error>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(src) = src else {
        return Err(Error::NotAnObject(label.to_owned()));
    };
    let mut attrs = match serde_json::to_value(&*dest) {
        Ok(Value::Object(attrs)) => attrs,
        Ok(_) => return Err(Error::NotAnObject(label.to_owned())),
        Err(e) => return Err(Error::Convert(label.to_owned(), e)),
    };

    let report = update_attributes(&mut attrs, src, policy, label);
    if report.updated() {
        *dest = serde_json::from_value(Value::Object(attrs))
            .map_err(|e| Error::Convert(label.to_owned(), e))?;
    }
    Ok(report)
}
