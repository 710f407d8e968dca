/// Instrument and bucket name constants to ensure consistency across the codebase.
/// These constants define the mapping between HERMES instruments and the
/// buckets their files are sorted into.

// HERMES instrument identifiers as they appear (lowercased) in file keys
pub const EEA: &str = "eea";
pub const NEMISIS: &str = "nemisis";
pub const MERIT: &str = "merit";
pub const SPANI: &str = "spani";

// Holding bucket for files whose destination key is already taken
pub const UNSORTED_BUCKET: &str = "swsoc-unsorted";

// Environment variable names
pub const ENV_ENVIRONMENT: &str = "SDC_ENVIRONMENT";
pub const ENV_SLACK_TOKEN: &str = "SDC_SLACK_TOKEN";
pub const ENV_SLACK_CHANNEL: &str = "SDC_SLACK_CHANNEL";

/// Unprefixed destination bucket for an instrument, if it is one we sort.
pub fn instrument_bucket(instrument: &str) -> Option<&'static str> {
    match instrument {
        EEA => Some("hermes-eea"),
        NEMISIS => Some("hermes-nemisis"),
        MERIT => Some("hermes-merit"),
        SPANI => Some("hermes-spani"),
        _ => None,
    }
}

/// Get all supported instrument identifiers.
pub fn supported_instruments() -> Vec<&'static str> {
    vec![EEA, NEMISIS, MERIT, SPANI]
}
