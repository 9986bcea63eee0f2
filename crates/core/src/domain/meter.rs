use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterReadingId(pub String);

impl MeterReadingId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MeterReadingId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub id: MeterReadingId,
    pub meter_name: String,
    pub location: Option<String>,
    pub reading: Decimal,
    pub unit: String,
    pub reading_date: DateTime<Utc>,
    pub recorded_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMeterReading {
    pub meter_name: String,
    pub location: Option<String>,
    pub reading: Decimal,
    pub unit: String,
    pub reading_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewMeterReading {
    pub fn into_reading(
        self,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<MeterReading, DomainError> {
        let meter_name = self.meter_name.trim().to_string();
        if meter_name.is_empty() {
            return Err(DomainError::Validation("meterName is required".to_string()));
        }
        let unit = self.unit.trim().to_string();
        if unit.is_empty() {
            return Err(DomainError::Validation("unit is required".to_string()));
        }
        if self.reading.is_sign_negative() {
            return Err(DomainError::Validation("reading must not be negative".to_string()));
        }

        Ok(MeterReading {
            id: MeterReadingId::new(),
            meter_name,
            location: self.location,
            reading: self.reading,
            unit,
            reading_date: self.reading_date,
            recorded_by,
            notes: self.notes,
            created_at: now,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeterFilter {
    pub meter_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Per-meter roll-up for the dashboard. Consumption is latest minus earliest reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSummary {
    pub meter_name: String,
    pub location: Option<String>,
    pub unit: String,
    pub reading_count: usize,
    pub first_reading: Decimal,
    pub latest_reading: Decimal,
    pub consumption: Decimal,
    pub last_reading_date: DateTime<Utc>,
}

pub fn summarize(readings: &[MeterReading]) -> Vec<MeterSummary> {
    let mut grouped: BTreeMap<&str, Vec<&MeterReading>> = BTreeMap::new();
    for reading in readings {
        grouped.entry(reading.meter_name.as_str()).or_default().push(reading);
    }

    grouped
        .into_iter()
        .filter_map(|(meter_name, mut series)| {
            series.sort_by_key(|reading| (reading.reading_date, reading.created_at));
            let first = series.first()?;
            let latest = series.last()?;
            Some(MeterSummary {
                meter_name: meter_name.to_string(),
                location: latest.location.clone(),
                unit: latest.unit.clone(),
                reading_count: series.len(),
                first_reading: first.reading,
                latest_reading: latest.reading,
                consumption: latest.reading - first.reading,
                last_reading_date: latest.reading_date,
            })
        })
        .collect()
}
