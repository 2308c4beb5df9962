use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::EnergyReading;

/// Upper bound on rows returned by a single `readings_page` call.
pub const READINGS_PAGE_SIZE: i64 = 1000;

/// Latest reading for `channel` strictly before `before`, if any.
///
/// Used to anchor the first consumption delta of a query window.
pub async fn latest_before(
    pool: &PgPool,
    channel: i32,
    before: OffsetDateTime,
) -> Result<Option<EnergyReading>> {
    let row = sqlx::query_as::<_, EnergyReading>(
        r#"
        SELECT
            channel,
            ts,
            energy_total_wh,
            device_id,
            power_w,
            voltage
        FROM energy_readings
        WHERE channel = $1
          AND ts < $2
        ORDER BY ts DESC
        LIMIT 1
        "#,
    )
    .bind(channel)
    .bind(before)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// One page of readings for `channel` in the closed range `[start, end]`,
/// ascending by timestamp.
pub async fn readings_page(
    pool: &PgPool,
    channel: i32,
    start: OffsetDateTime,
    end: OffsetDateTime,
    offset: i64,
    limit: i64,
) -> Result<Vec<EnergyReading>> {
    let rows = sqlx::query_as::<_, EnergyReading>(
        r#"
        SELECT
            channel,
            ts,
            energy_total_wh,
            device_id,
            power_w,
            voltage
        FROM energy_readings
        WHERE channel = $1
          AND ts >= $2
          AND ts <= $3
        ORDER BY ts
        LIMIT $4
        OFFSET $5
        "#,
    )
    .bind(channel)
    .bind(start)
    .bind(end)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
