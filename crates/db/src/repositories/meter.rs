use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use permitdesk_core::domain::meter::{MeterFilter, MeterReading, MeterReadingId};
use permitdesk_core::domain::user::UserId;

use super::{parse_timestamp, MeterRepository, PageRequest, Paged, RepositoryError};
use crate::DbPool;

const METER_COLUMNS: &str =
    "id, meter_name, location, reading, unit, reading_date, recorded_by, notes, created_at";

pub struct SqlMeterRepository {
    pool: DbPool,
}

impl SqlMeterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_reading(row: &SqliteRow) -> Result<MeterReading, RepositoryError> {
    let reading: String = row.try_get("reading")?;
    let reading_date: String = row.try_get("reading_date")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(MeterReading {
        id: MeterReadingId(row.try_get("id")?),
        meter_name: row.try_get("meter_name")?,
        location: row.try_get("location")?,
        reading: Decimal::from_str(&reading)
            .map_err(|e| RepositoryError::Decode(format!("invalid reading `{reading}`: {e}")))?,
        unit: row.try_get("unit")?,
        reading_date: parse_timestamp(&reading_date),
        recorded_by: UserId(row.try_get("recorded_by")?),
        notes: row.try_get("notes")?,
        created_at: parse_timestamp(&created_at),
    })
}

fn push_meter_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &MeterFilter) {
    builder.push(" WHERE 1=1");
    if let Some(meter_name) = filter.meter_name.as_deref().filter(|name| !name.trim().is_empty()) {
        builder.push(" AND meter_name = ").push_bind(meter_name.trim().to_string());
    }
    if let Some(from) = filter.from {
        builder.push(" AND reading_date >= ").push_bind(from.to_rfc3339());
    }
    if let Some(to) = filter.to {
        builder.push(" AND reading_date <= ").push_bind(to.to_rfc3339());
    }
}

#[async_trait::async_trait]
impl MeterRepository for SqlMeterRepository {
    async fn insert(&self, reading: &MeterReading) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO meter_readings (id, meter_name, location, reading, unit, reading_date,
                                         recorded_by, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&reading.id.0)
        .bind(&reading.meter_name)
        .bind(&reading.location)
        .bind(reading.reading.to_string())
        .bind(&reading.unit)
        .bind(reading.reading_date.to_rfc3339())
        .bind(&reading.recorded_by.0)
        .bind(&reading.notes)
        .bind(reading.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &MeterFilter,
        page: PageRequest,
    ) -> Result<Paged<MeterReading>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM meter_readings");
        push_meter_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {METER_COLUMNS} FROM meter_readings"));
        push_meter_filters(&mut select, filter);
        select
            .push(" ORDER BY reading_date DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let items = rows.iter().map(row_to_reading).collect::<Result<Vec<_>, _>>()?;
        Ok(Paged { items, total, page })
    }

    async fn all_matching(
        &self,
        filter: &MeterFilter,
    ) -> Result<Vec<MeterReading>, RepositoryError> {
        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {METER_COLUMNS} FROM meter_readings"));
        push_meter_filters(&mut select, filter);
        select.push(" ORDER BY meter_name ASC, reading_date ASC");
        let rows = select.build().fetch_all(&self.pool).await?;

        rows.iter().map(row_to_reading).collect()
    }
}
