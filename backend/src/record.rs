use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SPINS: [&str; 2] = ["up", "down"];

/// Flat mapping from result name to value, as exported by a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The `completed` entry, false if missing.
    pub fn completed(&self) -> bool {
        self.get("completed").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Add the scalar entries of a reader's output (nested results are
    /// left for `project_qmc`).
    pub fn add_scalar_outputs(&mut self, output: &Map<String, Value>) {
        for (key, value) in output {
            if !(value.is_object() || value.is_array()) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    /// Project the standard QMC results of a reader's output.
    ///
    /// Energies come either from the top level or from
    /// `properties.total_energy`; a missing energy is reported as `null`.
    /// Density matrices come from `properties.tbdm_basis` and are left out
    /// if absent.
    pub fn project_qmc(&mut self, output: &Map<String, Value>) {
        let mut energy = output.get("total_energy").cloned();
        let mut energy_err = output.get("total_energy_err").cloned();

        let properties = output.get("properties").and_then(Value::as_object);
        if let Some(total) = properties.and_then(|p| p.get("total_energy")) {
            energy = total.pointer("/value/0").cloned().or(energy);
            energy_err = total.pointer("/error/0").cloned().or(energy_err);
        }
        self.insert("total_energy", energy.unwrap_or(Value::Null));
        self.insert("total_energy_err", energy_err.unwrap_or(Value::Null));

        let Some(basis) = properties.and_then(|p| p.get("tbdm_basis")) else {
            return;
        };
        if let Some(states) = basis.get("states") {
            self.insert("basis", states.clone());
        }
        if let Some(tbdm) = basis.get("tbdm") {
            self.insert("tbdm", spin_pairs(tbdm, ""));
            self.insert("tbdm_err", spin_pairs(tbdm, "_err"));
        }
        if let Some(obdm) = basis.get("obdm") {
            self.insert("obdm", spins(obdm, ""));
            self.insert("obdm_err", spins(obdm, "_err"));
        }
    }
}

/// [up, down]
fn spins(dm: &Value, suffix: &str) -> Value {
    SPINS
        .iter()
        .map(|s| dm.get(format!("{s}{suffix}")).cloned().unwrap_or(Value::Null))
        .collect()
}

/// [[upup, updown], [downup, downdown]]
fn spin_pairs(dm: &Value, suffix: &str) -> Value {
    SPINS
        .iter()
        .map(|i| {
            SPINS
                .iter()
                .map(|j| dm.get(format!("{i}{j}{suffix}")).cloned().unwrap_or(Value::Null))
                .collect::<Value>()
        })
        .collect()
}
