use chrono::{NaiveDate, NaiveTime};

/// Identity embedded in a session folder name,
/// `{station_id}_{YYYYMMDD}_{HHMMSS}_{suffix}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionName {
    pub station_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub suffix: String,
}

/// Result of parsing a folder name. Never an error: unexpected names are
/// reported as [`FolderName::Malformed`] and left for the caller to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderName {
    Session(SessionName),
    Malformed { reason: String },
}

pub fn parse_folder_name(name: &str) -> FolderName {
    match try_parse(name) {
        Ok(parsed) => FolderName::Session(parsed),
        Err(reason) => FolderName::Malformed { reason },
    }
}

fn try_parse(name: &str) -> Result<SessionName, String> {
    let mut parts = name.splitn(4, '_');
    let (Some(station), Some(date), Some(time), Some(suffix)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("expected {station}_{YYYYMMDD}_{HHMMSS}_{suffix}".to_string());
    };

    if station.is_empty()
        || !station
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(format!("station id `{station}` is not upper-case alphanumeric"));
    }
    if !is_digits(date, 8) {
        return Err(format!("date `{date}` is not YYYYMMDD"));
    }
    if !is_digits(time, 6) {
        return Err(format!("time `{time}` is not HHMMSS"));
    }
    if suffix.is_empty() {
        return Err("missing suffix".to_string());
    }

    let date = NaiveDate::parse_from_str(date, "%Y%m%d")
        .map_err(|e| format!("date `{date}` is not a calendar date: {e}"))?;
    let time = NaiveTime::parse_from_str(time, "%H%M%S")
        .map_err(|e| format!("time `{time}` is not a clock time: {e}"))?;

    Ok(SessionName {
        station_id: station.to_string(),
        date,
        time,
        suffix: suffix.to_string(),
    })
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}
