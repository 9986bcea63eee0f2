//! Utility meter capture and the MIS dashboard under `/api/mis`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use permitdesk_core::access::{ensure, AccessRequest, Capability};
use permitdesk_core::audit::{AuditAction, AuditEntry, EntityType};
use permitdesk_core::domain::meter::{summarize, MeterFilter, NewMeterReading};
use permitdesk_core::domain::permit::parse_permit_date;
use permitdesk_core::domain::role::RoleName;
use permitdesk_db::PageRequest;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::permits::pagination_json;
use crate::state::AppState;

const RECENT_READINGS: u32 = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub meter_name: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn optional_date(field: &str, raw: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => parse_permit_date(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid {field}: {raw}"))),
        None => Ok(None),
    }
}

impl ReadingQuery {
    fn filter(&self) -> ApiResult<MeterFilter> {
        Ok(MeterFilter {
            meter_name: self
                .meter_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            from: optional_date("from", self.from.as_deref())?,
            to: optional_date("to", self.to.as_deref())?,
        })
    }
}

pub async fn list_readings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReadingQuery>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let filter = query.filter()?;
    let paged = state.meters.list(&filter, PageRequest::new(query.page, query.limit)).await?;
    Ok(ApiJson(json!({
        "readings": paged.items,
        "pagination": pagination_json(paged.page, paged.total),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRequest {
    pub meter_name: String,
    pub location: Option<String>,
    pub reading: Decimal,
    pub unit: String,
    pub reading_date: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_reading(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<ReadingRequest>,
) -> ApiResult<impl IntoResponse> {
    ensure(&AccessRequest::new(actor.role, &actor.id, Capability::RecordMeterReading))?;

    let now = Utc::now();
    let reading = NewMeterReading {
        meter_name: body.meter_name,
        location: body.location,
        reading: body.reading,
        unit: body.unit,
        reading_date: optional_date("reading date", body.reading_date.as_deref())?.unwrap_or(now),
        notes: body.notes,
    }
    .into_reading(actor.id.clone(), now)?;

    state.meters.insert(&reading).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Create, EntityType::MeterReading, reading.id.0.clone())
                .by(&actor.id)
                .with_new(&reading),
            &headers,
        )
        .await;

    info!(
        event_name = "mis.reading_recorded",
        meter_name = %reading.meter_name,
        reading = %reading.reading,
        unit = %reading.unit,
        recorded_by = %actor.id,
        "meter reading recorded"
    );
    Ok((
        StatusCode::CREATED,
        ApiJson(json!({ "message": "Reading recorded successfully", "reading": reading })),
    ))
}

/// Meter roll-ups for the window plus permit counts. Requestors only see their own permits.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<ReadingQuery>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let filter = query.filter()?;
    let readings = state.meters.all_matching(&filter).await?;
    let recent_page = PageRequest::new(Some(1), Some(RECENT_READINGS));
    let recent = state.meters.list(&filter, recent_page).await?;

    let scope = (actor.role == RoleName::Requestor).then_some(&actor.id);
    let permits = state.permits.status_counts(scope).await?;

    Ok(ApiJson(json!({
        "meters": summarize(&readings),
        "totalReadings": readings.len(),
        "recentReadings": recent.items,
        "permits": permits,
    })))
}
