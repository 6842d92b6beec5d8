use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Location reported before anyone has ever parked the car.
pub const UNKNOWN_LOCATION: &str = "Desconocido";

pub const HOUSEHOLD_MEMBERS: [&str; 4] = ["Víctor", "Celia", "Chema", "Yoli"];

pub const PRESET_LOCATIONS: [&str; 6] = [
    "Óbolo (farmacia)",
    "Óbolo (guardería)",
    "C/ Dobla",
    "Petroprix",
    "Ballenoil",
    "Mercadona",
];

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "ene", "feb", "mar", "abr", "may", "jun", "jul", "ago", "sept", "oct", "nov", "dic",
];

/// The single shared record describing where the car was last left.
///
/// Field names follow the JSON wire format (`timestampRaw`), so the same type
/// is used by the HTTP API, the file backend and the clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingStatus {
    pub location: String,
    pub user: String,
    pub timestamp: String,
    pub timestamp_raw: i64,
}

impl Default for ParkingStatus {
    fn default() -> Self {
        Self {
            location: UNKNOWN_LOCATION.to_string(),
            user: String::new(),
            timestamp: String::new(),
            timestamp_raw: 0,
        }
    }
}

impl ParkingStatus {
    /// Builds a record stamped with `at`, both as epoch millis and display text.
    pub fn recorded_at<Tz: TimeZone>(
        location: impl Into<String>,
        user: impl Into<String>,
        at: &DateTime<Tz>,
    ) -> Self {
        Self {
            location: location.into(),
            user: user.into(),
            timestamp: format_timestamp(at),
            timestamp_raw: at.timestamp_millis(),
        }
    }

    /// True while the record is still the startup sentinel.
    pub fn is_unset(&self) -> bool {
        self.timestamp_raw == 0 && self.user.is_empty()
    }
}

/// Formats a write time the way every client displays it, e.g. `19:30 19 ene`.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    let month = MONTH_ABBREVIATIONS[at.month0() as usize];
    format!(
        "{:02}:{:02} {} {}",
        at.hour(),
        at.minute(),
        at.day(),
        month
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a member of this household")]
pub struct UnknownMember(pub String);

/// Resolves `name` to the canonical household member spelling.
pub fn household_member(name: &str) -> Result<&'static str, UnknownMember> {
    let trimmed = name.trim();
    HOUSEHOLD_MEMBERS
        .iter()
        .copied()
        .find(|member| *member == trimmed || member.to_lowercase() == trimmed.to_lowercase())
        .ok_or_else(|| UnknownMember(trimmed.to_string()))
}
