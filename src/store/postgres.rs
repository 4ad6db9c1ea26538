//! sqlx-backed `HostServiceStore`. Queries are runtime-checked and rows are
//! mapped by hand; status and schedule-unit columns are plain text parsed
//! into their enums, with a parse failure surfaced as a corrupt row.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{HostServiceStore, StoreError};
use crate::models::{Event, Host, HostService, ScheduleUnit, ServiceKind, StatusCounts};
use crate::status::ServiceStatus;

const HOST_SERVICE_COLUMNS: &str = "
    hs.id, hs.host_id, h.host_name, hs.service_id, hs.active,
    hs.schedule_number, hs.schedule_unit, hs.status, hs.last_check,
    hs.last_message, hs.created_at, hs.updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_host_service(row: &PgRow) -> Result<HostService, StoreError> {
    let service_id: i32 = row.try_get("service_id")?;
    let service = ServiceKind::from_id(service_id)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown service id {service_id}")))?;

    let status: String = row.try_get("status")?;
    let status = status
        .parse::<ServiceStatus>()
        .map_err(|e| StoreError::CorruptRow(e.to_string()))?;

    let unit: String = row.try_get("schedule_unit")?;
    let schedule_unit = ScheduleUnit::from_str(&unit)
        .ok_or_else(|| StoreError::CorruptRow(format!("unknown schedule unit {unit:?}")))?;

    Ok(HostService {
        id: row.try_get("id")?,
        host_id: row.try_get("host_id")?,
        host_name: row.try_get("host_name")?,
        service,
        active: row.try_get("active")?,
        schedule_number: row.try_get("schedule_number")?,
        schedule_unit,
        status,
        last_check: row.try_get("last_check")?,
        last_message: row.try_get("last_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl HostServiceStore for PgStore {
    async fn host(&self, id: i32) -> Result<Host, StoreError> {
        let row = sqlx::query(
            "SELECT id, host_name, url, active, created_at, updated_at
             FROM hosts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound { entity: "host", id })?;

        let service_rows = sqlx::query(&format!(
            "SELECT {HOST_SERVICE_COLUMNS}
             FROM host_services hs
             JOIN hosts h ON h.id = hs.host_id
             WHERE hs.host_id = $1
             ORDER BY hs.id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let services = service_rows
            .iter()
            .map(map_host_service)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Host {
            id: row.try_get("id")?,
            host_name: row.try_get("host_name")?,
            url: row.try_get("url")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            services,
        })
    }

    async fn host_service(&self, id: i32) -> Result<HostService, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {HOST_SERVICE_COLUMNS}
             FROM host_services hs
             JOIN hosts h ON h.id = hs.host_id
             WHERE hs.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "host service",
            id,
        })?;

        map_host_service(&row)
    }

    async fn update_host_service(&self, hs: &HostService) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE host_services
             SET status = $1, last_message = $2, last_check = $3, active = $4,
                 schedule_number = $5, schedule_unit = $6, updated_at = $7
             WHERE id = $8",
        )
        .bind(hs.status.as_str())
        .bind(&hs.last_message)
        .bind(hs.last_check)
        .bind(hs.active)
        .bind(hs.schedule_number)
        .bind(hs.schedule_unit.as_str())
        .bind(Utc::now())
        .bind(hs.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn services_to_monitor(&self) -> Result<Vec<HostService>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {HOST_SERVICE_COLUMNS}
             FROM host_services hs
             JOIN hosts h ON h.id = hs.host_id
             WHERE h.active = true AND hs.active = true
             ORDER BY h.host_name, hs.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_host_service).collect()
    }

    async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let row = sqlx::query(
            "SELECT
                count(*) FILTER (WHERE status = 'pending') AS pending,
                count(*) FILTER (WHERE status = 'healthy') AS healthy,
                count(*) FILTER (WHERE status = 'warning') AS warning,
                count(*) FILTER (WHERE status = 'problem') AS problem
             FROM host_services WHERE active = true",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StatusCounts {
            pending: row.try_get("pending")?,
            healthy: row.try_get("healthy")?,
            warning: row.try_get("warning")?,
            problem: row.try_get("problem")?,
        })
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events
                (event_type, host_service_id, host_id, service_name, host_name,
                 message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.event_type.as_str())
        .bind(event.host_service_id)
        .bind(event.host_id)
        .bind(&event.service_name)
        .bind(&event.host_name)
        .bind(&event.message)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
