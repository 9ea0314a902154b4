use thiserror::Error;

#[derive(Error, Debug)]
pub enum VitalsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown vital sign: {0}")]
    UnknownParameter(String),

    #[error("Value {value} for {name} is outside the physiological range [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

pub type VitalsResult<T> = Result<T, VitalsError>;
