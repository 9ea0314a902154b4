use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vital_signs::{resting_means, VitalSign};

/// One snapshot of every tracked vital sign.
///
/// Values are keyed by parameter name. Names outside the parameter table are
/// allowed and carried along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    values: BTreeMap<String, f64>,
    timestamp: DateTime<Utc>,
}

impl Reading {
    /// A reading stamped with the current time.
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self::with_timestamp(values, Utc::now())
    }

    pub fn with_timestamp(values: BTreeMap<String, f64>, timestamp: DateTime<Utc>) -> Self {
        Self { values, timestamp }
    }

    /// The resting-mean reading for every tracked parameter.
    pub fn resting() -> Self {
        Self::new(resting_means())
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, f64> {
        self.values
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value for a tracked parameter, looked up by its canonical name.
    pub fn vital(&self, sign: VitalSign) -> Option<f64> {
        self.get(sign.name())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value equality, ignoring timestamps.
    pub fn same_values(&self, other: &Reading) -> bool {
        self.values == other.values
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Reading {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Reading::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
