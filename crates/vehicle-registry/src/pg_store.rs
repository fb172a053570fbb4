use crate::error::RegistryError;
use crate::store::VehicleStore;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::vehicles::{NewVehicle, Vehicle};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vehicles (
    id BIGSERIAL PRIMARY KEY,
    plate_number VARCHAR(20) NOT NULL UNIQUE,
    driver_name VARCHAR(100) NOT NULL,
    car_color VARCHAR(50),
    car_type VARCHAR(50),
    registration_date TIMESTAMPTZ NOT NULL DEFAULT now(),
    qr_code_path VARCHAR(200),
    driver_photo_path VARCHAR(200)
)
"#;

const INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_vehicles_registration_date \
                     ON vehicles (registration_date DESC, id DESC)";

const COLUMNS: &str = "id, plate_number, driver_name, car_color, car_type, \
                       registration_date, qr_code_path, driver_photo_path";

#[derive(Debug, FromRow)]
struct VehicleRow {
    id: i64,
    plate_number: String,
    driver_name: String,
    car_color: Option<String>,
    car_type: Option<String>,
    registration_date: DateTime<Utc>,
    qr_code_path: Option<String>,
    driver_photo_path: Option<String>,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: row.id,
            plate_number: row.plate_number,
            driver_name: row.driver_name,
            car_color: row.car_color,
            car_type: row.car_type,
            registration_date: row.registration_date,
            qr_code_path: row.qr_code_path,
            driver_photo_path: row.driver_photo_path,
        }
    }
}

/// Escape `LIKE` wildcards so the term matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// PostgreSQL-backed vehicle store
pub struct PgVehicleStore {
    pool: PgPool,
}

impl PgVehicleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to database")?;
        info!(max_connections, "connected to vehicle database");
        Ok(Self::new(pool))
    }

    /// Create the table and index when missing
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to create vehicles table")?;
        sqlx::query(INDEX)
            .execute(&self.pool)
            .await
            .context("failed to create vehicles index")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl VehicleStore for PgVehicleStore {
    async fn find_by_plate(&self, plate_number: &str) -> Result<Option<Vehicle>, RegistryError> {
        let row = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM vehicles WHERE plate_number = $1",
            COLUMNS
        ))
        .bind(plate_number)
        .fetch_optional(&self.pool)
        .await
        .context("failed to find vehicle by plate")?;

        Ok(row.map(Vehicle::from))
    }

    async fn get(&self, id: i64) -> Result<Option<Vehicle>, RegistryError> {
        let row = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM vehicles WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to get vehicle")?;

        Ok(row.map(Vehicle::from))
    }

    async fn insert(&self, vehicle: NewVehicle) -> Result<Vehicle, RegistryError> {
        let result = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            INSERT INTO vehicles (plate_number, driver_name, car_color, car_type,
                                  registration_date, qr_code_path, driver_photo_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(&vehicle.plate_number)
        .bind(&vehicle.driver_name)
        .bind(&vehicle.car_color)
        .bind(&vehicle.car_type)
        .bind(vehicle.registration_date)
        .bind(&vehicle.qr_code_path)
        .bind(&vehicle.driver_photo_path)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            // The UNIQUE constraint settles concurrent registrations
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RegistryError::DuplicatePlate(vehicle.plate_number))
            }
            Err(e) => Err(RegistryError::Storage(
                anyhow::Error::new(e).context("failed to insert vehicle"),
            )),
        }
    }

    async fn search(&self, term: &str) -> Result<Vec<Vehicle>, RegistryError> {
        if term.is_empty() {
            return self.list_sorted_by_date_desc().await;
        }

        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            SELECT {} FROM vehicles
            WHERE driver_name ILIKE $1 ESCAPE '\' OR plate_number ILIKE $1 ESCAPE '\'
            ORDER BY registration_date DESC, id DESC
            "#,
            COLUMNS
        ))
        .bind(like_pattern(term))
        .fetch_all(&self.pool)
        .await
        .context("failed to search vehicles")?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    async fn list_sorted_by_date_desc(&self) -> Result<Vec<Vehicle>, RegistryError> {
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM vehicles ORDER BY registration_date DESC, id DESC",
            COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list vehicles")?;

        Ok(rows.into_iter().map(Vehicle::from).collect())
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database health check failed")?;
        Ok(())
    }
}
