use serde::{Deserialize, Serialize};

use crate::domain::ParkingStatus;

pub const STATUS_ROUTE: &str = "/status";
pub const HEALTH_ROUTE: &str = "/healthz";

/// Body of `POST /status`.
///
/// Every field is optional on the wire so a partial body reaches validation
/// and is answered with a 400 instead of a deserialization rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub timestamp_raw: i64,
}

impl From<ParkingStatus> for StatusUpdateRequest {
    fn from(value: ParkingStatus) -> Self {
        Self {
            location: value.location,
            user: value.user,
            timestamp: value.timestamp,
            timestamp_raw: value.timestamp_raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub data: ParkingStatus,
}
