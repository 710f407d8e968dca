use crate::constants::{instrument_bucket, UNSORTED_BUCKET};
use crate::error::{Result, SorterError};
use crate::parser::ScienceFile;

/// Deployment environment. Anything other than production gets the `dev-`
/// bucket prefix so staging runs never touch the real instrument buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "PRODUCTION" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn bucket_prefix(&self) -> &'static str {
        match self {
            Environment::Production => "",
            Environment::Development => "dev-",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "PRODUCTION",
            Environment::Development => "DEVELOPMENT",
        }
    }
}

/// Destination bucket for a parsed science file. Pure lookup, no I/O.
pub fn destination_bucket(file: &ScienceFile, environment: Environment) -> Result<String> {
    let bucket = instrument_bucket(&file.instrument)
        .ok_or_else(|| SorterError::UnknownInstrument(file.instrument.clone()))?;
    Ok(format!("{}{}", environment.bucket_prefix(), bucket))
}

/// Holding bucket for destination-key collisions.
pub fn holding_bucket(environment: Environment) -> String {
    format!("{}{}", environment.bucket_prefix(), UNSORTED_BUCKET)
}
