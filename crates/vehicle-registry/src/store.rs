use crate::error::RegistryError;
use async_trait::async_trait;
use common::vehicles::{NewVehicle, Vehicle};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable storage of vehicle records.
///
/// `plate_number` is unique: `insert` must reject a second record for the
/// same plate atomically, reporting [`RegistryError::DuplicatePlate`].
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn find_by_plate(&self, plate_number: &str) -> Result<Option<Vehicle>, RegistryError>;

    async fn get(&self, id: i64) -> Result<Option<Vehicle>, RegistryError>;

    async fn insert(&self, vehicle: NewVehicle) -> Result<Vehicle, RegistryError>;

    /// Case-insensitive substring match on driver name or plate number,
    /// newest registration first
    async fn search(&self, term: &str) -> Result<Vec<Vehicle>, RegistryError>;

    /// Every record, newest registration first
    async fn list_sorted_by_date_desc(&self) -> Result<Vec<Vehicle>, RegistryError>;

    async fn health_check(&self) -> Result<(), RegistryError>;
}

/// Newest first; equal timestamps fall back to the later id
pub(crate) fn sort_newest_first(vehicles: &mut [Vehicle]) {
    vehicles.sort_by(|a, b| {
        b.registration_date
            .cmp(&a.registration_date)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// In-process store used when no database is configured and in tests
#[derive(Default)]
pub struct MemoryVehicleStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    by_id: HashMap<i64, Vehicle>,
    plate_to_id: HashMap<String, i64>,
    next_id: i64,
}

impl MemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VehicleStore for MemoryVehicleStore {
    async fn find_by_plate(&self, plate_number: &str) -> Result<Option<Vehicle>, RegistryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .plate_to_id
            .get(plate_number)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn get(&self, id: i64) -> Result<Option<Vehicle>, RegistryError> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn insert(&self, vehicle: NewVehicle) -> Result<Vehicle, RegistryError> {
        // Check and insert under one write lock
        let mut inner = self.inner.write().await;
        if inner.plate_to_id.contains_key(&vehicle.plate_number) {
            return Err(RegistryError::DuplicatePlate(vehicle.plate_number));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let record = vehicle.into_vehicle(id);
        inner.plate_to_id.insert(record.plate_number.clone(), id);
        inner.by_id.insert(id, record.clone());
        Ok(record)
    }

    async fn search(&self, term: &str) -> Result<Vec<Vehicle>, RegistryError> {
        let needle = term.to_lowercase();
        let inner = self.inner.read().await;
        let mut found: Vec<Vehicle> = inner
            .by_id
            .values()
            .filter(|v| {
                needle.is_empty()
                    || v.driver_name.to_lowercase().contains(&needle)
                    || v.plate_number.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn list_sorted_by_date_desc(&self) -> Result<Vec<Vehicle>, RegistryError> {
        self.search("").await
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}
