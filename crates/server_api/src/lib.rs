use chrono::{DateTime, Local, TimeZone, Utc};
use shared::{
    domain::{format_timestamp, ParkingStatus},
    error::{ApiError, ErrorCode},
    protocol::{StatusUpdateRequest, StatusUpdateResponse},
};
use storage::{StatusStore, StoreError};
use tracing::debug;

#[derive(Clone)]
pub struct ApiContext {
    pub store: StatusStore,
}

pub async fn get_status(ctx: &ApiContext) -> ParkingStatus {
    ctx.store.read().await
}

pub async fn post_status(
    ctx: &ApiContext,
    request: StatusUpdateRequest,
) -> Result<StatusUpdateResponse, ApiError> {
    let candidate = candidate_from_request(request, &Local::now());
    let data = ctx.store.write(candidate).await.map_err(store_error)?;
    Ok(StatusUpdateResponse {
        success: true,
        data,
    })
}

/// Turns a request body into a storable record.
///
/// Writers normally stamp their own time. A missing `timestampRaw` is filled
/// in from `now`, and a missing display `timestamp` is derived from whichever
/// raw time ends up on the record.
pub fn candidate_from_request<Tz: TimeZone>(
    request: StatusUpdateRequest,
    now: &DateTime<Tz>,
) -> ParkingStatus {
    let StatusUpdateRequest {
        location,
        user,
        timestamp,
        timestamp_raw,
    } = request;
    let location = location.trim().to_string();
    let user = user.trim().to_string();

    if timestamp_raw <= 0 {
        debug!("update carried no timestamp; stamping server time");
        return ParkingStatus::recorded_at(location, user, now);
    }

    let timestamp = if timestamp.trim().is_empty() {
        Utc.timestamp_millis_opt(timestamp_raw)
            .single()
            .map(|at| format_timestamp(&at.with_timezone(&now.timezone())))
            .unwrap_or_default()
    } else {
        timestamp
    };

    ParkingStatus {
        location,
        user,
        timestamp,
        timestamp_raw,
    }
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::MissingField { field } => ApiError::new(
            ErrorCode::Validation,
            format!("missing required field '{field}'"),
        ),
        StoreError::Storage { .. } => ApiError::new(ErrorCode::Storage, "database error"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::FixedOffset;
    use storage::SqliteBackend;

    use super::*;

    async fn setup() -> ApiContext {
        let backend = SqliteBackend::connect("sqlite::memory:").await.expect("db");
        ApiContext {
            store: StatusStore::with_backend(Arc::new(backend)).await,
        }
    }

    fn request(location: &str, user: &str, timestamp_raw: i64) -> StatusUpdateRequest {
        StatusUpdateRequest {
            location: location.into(),
            user: user.into(),
            timestamp: "19:30 19 ene".into(),
            timestamp_raw,
        }
    }

    #[tokio::test]
    async fn get_status_defaults_to_sentinel() {
        let ctx = setup().await;
        assert_eq!(get_status(&ctx).await, ParkingStatus::default());
    }

    #[tokio::test]
    async fn post_status_returns_stored_record() {
        let ctx = setup().await;
        let response = post_status(&ctx, request("Petroprix", "Celia", 1000))
            .await
            .expect("accepted");
        assert!(response.success);
        assert_eq!(response.data.location, "Petroprix");
        assert_eq!(get_status(&ctx).await, response.data);
    }

    #[tokio::test]
    async fn missing_location_maps_to_validation() {
        let ctx = setup().await;
        post_status(&ctx, request("Mercadona", "Víctor", 2000))
            .await
            .expect("accepted");

        let err = post_status(
            &ctx,
            StatusUpdateRequest {
                user: "Yoli".into(),
                ..StatusUpdateRequest::default()
            },
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
        assert!(err.error.contains("location"));
        assert_eq!(get_status(&ctx).await.location, "Mercadona");
    }

    #[test]
    fn candidate_keeps_writer_supplied_time() {
        let now = Utc::now();
        let candidate = candidate_from_request(request("  C/ Dobla ", "Chema", 1234), &now);
        assert_eq!(candidate.location, "C/ Dobla");
        assert_eq!(candidate.timestamp, "19:30 19 ene");
        assert_eq!(candidate.timestamp_raw, 1234);
    }

    #[test]
    fn candidate_without_raw_time_is_stamped_now() {
        let now = FixedOffset::east_opt(0)
            .expect("offset")
            .with_ymd_and_hms(2026, 8, 3, 8, 5, 0)
            .single()
            .expect("time");
        let candidate = candidate_from_request(
            StatusUpdateRequest {
                location: "Ballenoil".into(),
                user: "Yoli".into(),
                ..StatusUpdateRequest::default()
            },
            &now,
        );
        assert_eq!(candidate.timestamp_raw, now.timestamp_millis());
        assert_eq!(candidate.timestamp, "08:05 3 ago");
    }

    #[test]
    fn candidate_derives_display_time_from_raw() {
        let now = FixedOffset::east_opt(0)
            .expect("offset")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("time");
        let raw = now.timestamp_millis();
        let mut req = request("Mercadona", "Celia", raw);
        req.timestamp.clear();
        let candidate = candidate_from_request(req, &now);
        assert_eq!(candidate.timestamp, "00:00 1 ene");
    }
}
