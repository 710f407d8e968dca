use crate::error::{Result, SorterError};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// HERMES science filename convention:
/// `hermes_<INSTRUMENT>_<level>_<YYYYDDD-HHMMSS>_v<NN>.<ext>`
/// e.g. `hermes_SPANI_l0_2023040-000018_v01.bin`
static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^hermes_(?P<instrument>[A-Za-z]+)_(?P<level>l0|l1|ql|l2|l3|l4)_(?P<year>\d{4})(?P<doy>\d{3})-(?P<hms>\d{6})_v(?P<version>\d{2})\.(?P<ext>[A-Za-z0-9]+)$",
    )
    .unwrap()
});

/// Attributes extracted from a HERMES science file key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScienceFile {
    /// Instrument identifier, lowercased (e.g. "spani")
    pub instrument: String,
    /// Data product level (e.g. "l0", "ql")
    pub level: String,
    /// UTC time of the first measurement in the file
    pub date: DateTime<Utc>,
    /// Two-digit file version (e.g. "01")
    pub version: String,
    /// File extension (e.g. "bin")
    pub extension: String,
}

/// Final path component of an object key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Parse a science file key into its attributes. Operates on the basename,
/// so keys with a staging prefix (`staging/hermes_...`) work unchanged.
pub fn parse_science_filename(key: &str) -> Result<ScienceFile> {
    let name = basename(key);

    let caps = FILENAME_RE.captures(name).ok_or_else(|| SorterError::UnparsableKey {
        key: key.to_string(),
        reason: "does not match the HERMES filename convention".to_string(),
    })?;

    let year: i32 = caps["year"].parse().map_err(|_| unparsable(key, "bad year"))?;
    let doy: u32 = caps["doy"].parse().map_err(|_| unparsable(key, "bad day-of-year"))?;
    let hms = &caps["hms"];
    let (h, m, s) = (
        hms[0..2].parse::<u32>().map_err(|_| unparsable(key, "bad hour"))?,
        hms[2..4].parse::<u32>().map_err(|_| unparsable(key, "bad minute"))?,
        hms[4..6].parse::<u32>().map_err(|_| unparsable(key, "bad second"))?,
    );

    let date = NaiveDate::from_yo_opt(year, doy)
        .ok_or_else(|| unparsable(key, "day-of-year out of range"))?;
    let time = NaiveTime::from_hms_opt(h, m, s)
        .ok_or_else(|| unparsable(key, "time of day out of range"))?;

    Ok(ScienceFile {
        instrument: caps["instrument"].to_lowercase(),
        level: caps["level"].to_string(),
        date: Utc.from_utc_datetime(&date.and_time(time)),
        version: caps["version"].to_string(),
        extension: caps["ext"].to_string(),
    })
}

fn unparsable(key: &str, reason: &str) -> SorterError {
    SorterError::UnparsableKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
