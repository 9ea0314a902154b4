//! Tracked vital signs and their physiological constants.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VitalsError;

/// Immutable per-parameter constants.
///
/// `*_rest` fields describe the normal resting distribution, `abs_*` the
/// bounds beyond which a value is not survivable, and `mean_activity` /
/// `mean_sleep` the typical centers in those states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub mean_rest: f64,
    pub std_rest: f64,
    pub min_rest: f64,
    pub max_rest: f64,
    pub abs_min: f64,
    pub abs_max: f64,
    pub mean_activity: f64,
    pub mean_sleep: f64,
}

impl ParameterSpec {
    /// Whether `value` lies inside the normal resting band.
    pub fn in_resting_range(&self, value: f64) -> bool {
        self.min_rest <= value && value <= self.max_rest
    }

    /// Whether `value` lies inside the absolute physiological limits.
    pub fn in_absolute_range(&self, value: f64) -> bool {
        self.abs_min <= value && value <= self.abs_max
    }
}

const HEART_RATE: ParameterSpec = ParameterSpec {
    mean_rest: 80.0,
    std_rest: 6.7,
    min_rest: 60.0,
    max_rest: 100.0,
    abs_min: 0.0,
    abs_max: 300.0,
    mean_activity: 120.0,
    mean_sleep: 60.0,
};

const OXYGEN_SATURATION: ParameterSpec = ParameterSpec {
    mean_rest: 97.5,
    std_rest: 0.8,
    min_rest: 95.0,
    max_rest: 100.0,
    abs_min: 20.0,
    abs_max: 100.0,
    mean_activity: 98.0,
    mean_sleep: 96.5,
};

const BREATHING_RATE: ParameterSpec = ParameterSpec {
    mean_rest: 16.0,
    std_rest: 1.3,
    min_rest: 12.0,
    max_rest: 20.0,
    abs_min: 4.0,
    abs_max: 60.0,
    mean_activity: 24.0,
    mean_sleep: 12.0,
};

const BLOOD_PRESSURE_SYSTOLIC: ParameterSpec = ParameterSpec {
    mean_rest: 105.0,
    std_rest: 5.0,
    min_rest: 90.0,
    max_rest: 120.0,
    abs_min: 50.0,
    abs_max: 300.0,
    mean_activity: 150.0,
    mean_sleep: 95.0,
};

const BLOOD_PRESSURE_DIASTOLIC: ParameterSpec = ParameterSpec {
    mean_rest: 70.0,
    std_rest: 3.3,
    min_rest: 60.0,
    max_rest: 80.0,
    abs_min: 30.0,
    abs_max: 200.0,
    mean_activity: 70.0,
    mean_sleep: 60.0,
};

const BODY_TEMPERATURE: ParameterSpec = ParameterSpec {
    mean_rest: 36.7,
    std_rest: 0.2,
    min_rest: 36.1,
    max_rest: 37.2,
    abs_min: 21.0,
    abs_max: 50.0,
    mean_activity: 38.0,
    mean_sleep: 36.4,
};

/// A tracked physiological parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalSign {
    HeartRate,
    OxygenSaturation,
    BreathingRate,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    BodyTemperature,
}

impl VitalSign {
    pub const ALL: [VitalSign; 6] = [
        VitalSign::HeartRate,
        VitalSign::OxygenSaturation,
        VitalSign::BreathingRate,
        VitalSign::BloodPressureSystolic,
        VitalSign::BloodPressureDiastolic,
        VitalSign::BodyTemperature,
    ];

    /// Canonical parameter name, as used in readings and the shared file.
    pub fn name(self) -> &'static str {
        match self {
            VitalSign::HeartRate => "heart_rate",
            VitalSign::OxygenSaturation => "oxygen_saturation",
            VitalSign::BreathingRate => "breathing_rate",
            VitalSign::BloodPressureSystolic => "blood_pressure_systolic",
            VitalSign::BloodPressureDiastolic => "blood_pressure_diastolic",
            VitalSign::BodyTemperature => "body_temperature",
        }
    }

    /// Resolve a canonical name or one of the short front-end aliases
    /// (`systolic_bp`, `diastolic_bp`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "heart_rate" => Some(VitalSign::HeartRate),
            "oxygen_saturation" => Some(VitalSign::OxygenSaturation),
            "breathing_rate" => Some(VitalSign::BreathingRate),
            "blood_pressure_systolic" | "systolic_bp" => Some(VitalSign::BloodPressureSystolic),
            "blood_pressure_diastolic" | "diastolic_bp" => Some(VitalSign::BloodPressureDiastolic),
            "body_temperature" => Some(VitalSign::BodyTemperature),
            _ => None,
        }
    }

    pub fn spec(self) -> &'static ParameterSpec {
        match self {
            VitalSign::HeartRate => &HEART_RATE,
            VitalSign::OxygenSaturation => &OXYGEN_SATURATION,
            VitalSign::BreathingRate => &BREATHING_RATE,
            VitalSign::BloodPressureSystolic => &BLOOD_PRESSURE_SYSTOLIC,
            VitalSign::BloodPressureDiastolic => &BLOOD_PRESSURE_DIASTOLIC,
            VitalSign::BodyTemperature => &BODY_TEMPERATURE,
        }
    }
}

impl fmt::Display for VitalSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VitalSign {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VitalSign::from_name(s).ok_or_else(|| VitalsError::UnknownParameter(s.to_string()))
    }
}

/// Look up the constants for a parameter name. `None` for unknown names.
pub fn parameter_spec(name: &str) -> Option<&'static ParameterSpec> {
    VitalSign::from_name(name).map(VitalSign::spec)
}

/// Resting means for every tracked parameter, keyed by canonical name.
pub fn resting_means() -> BTreeMap<String, f64> {
    PhysiologicalState::Rest.base_values()
}

/// The state a simulated subject is in, selecting which mean each
/// parameter is centered on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhysiologicalState {
    #[default]
    Rest,
    Activity,
    Sleep,
}

impl PhysiologicalState {
    pub fn mean_of(self, sign: VitalSign) -> f64 {
        let spec = sign.spec();
        match self {
            PhysiologicalState::Rest => spec.mean_rest,
            PhysiologicalState::Activity => spec.mean_activity,
            PhysiologicalState::Sleep => spec.mean_sleep,
        }
    }

    pub fn base_values(self) -> BTreeMap<String, f64> {
        VitalSign::ALL
            .iter()
            .map(|&sign| (sign.name().to_string(), self.mean_of(sign)))
            .collect()
    }
}

impl FromStr for PhysiologicalState {
    type Err = VitalsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(PhysiologicalState::Rest),
            "activity" => Ok(PhysiologicalState::Activity),
            "sleep" => Ok(PhysiologicalState::Sleep),
            other => Err(VitalsError::Config(format!(
                "unknown simulation state '{other}' (expected rest, activity or sleep)"
            ))),
        }
    }
}
