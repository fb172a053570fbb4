use crate::blob::BlobStore;
use crate::credential::CredentialEncoder;
use crate::error::RegistryError;
use crate::store::VehicleStore;
use chrono::Utc;
use common::validation::{
    normalize_optional, sanitize_file_name, truncate_file_name, validate_attribute,
    validate_driver_name, validate_plate_number, MAX_PATH_LENGTH,
};
use common::vehicles::{CredentialPayload, DriverPhoto, NewVehicle, RegisterVehicleRequest, Vehicle};
use std::sync::Arc;
use telemetry::metrics::REGISTRY_REGISTRATIONS;
use tracing::{error, info, warn};

/// Registration input after validation and trimming
struct ValidatedRegistration {
    plate_number: String,
    driver_name: String,
    car_color: Option<String>,
    car_type: Option<String>,
    photo: DriverPhoto,
}

fn validate(request: RegisterVehicleRequest) -> Result<ValidatedRegistration, RegistryError> {
    let plate_number = request.plate_number.trim().to_string();
    let driver_name = request.driver_name.trim().to_string();
    let car_color = normalize_optional(request.car_color);
    let car_type = normalize_optional(request.car_type);

    validate_plate_number(&plate_number).map_err(|e| RegistryError::validation(e.to_string()))?;
    validate_driver_name(&driver_name).map_err(|e| RegistryError::validation(e.to_string()))?;
    validate_attribute(car_color.as_deref(), "car_color")
        .map_err(|e| RegistryError::validation(e.to_string()))?;
    validate_attribute(car_type.as_deref(), "car_type")
        .map_err(|e| RegistryError::validation(e.to_string()))?;

    let photo = match request.driver_photo {
        Some(photo) if !photo.bytes.is_empty() => photo,
        _ => return Err(RegistryError::validation("Driver photo is required")),
    };

    Ok(ValidatedRegistration {
        plate_number,
        driver_name,
        car_color,
        car_type,
        photo,
    })
}

/// Length of the suffix [`staging_key`] appends: `.{16 hex digits}.part`
const STAGING_SUFFIX_LEN: usize = 22;

/// Storage key of a driver photo.
///
/// The sanitized file name is shortened so that the key, its staged form and
/// its public path (`overhead` covers the longer addition) all fit
/// `MAX_PATH_LENGTH`.
fn photo_key(plate_number: &str, file_name: Option<&str>, overhead: usize) -> String {
    let prefix = format!("driver_photos/{}_", plate_number);
    let budget = MAX_PATH_LENGTH.saturating_sub(overhead + prefix.chars().count());
    let name = file_name
        .and_then(sanitize_file_name)
        .map(|name| truncate_file_name(&name, budget))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "photo".to_string());
    format!("{}{}", prefix, name)
}

/// Storage key of a QR credential
fn qr_key(plate_number: &str) -> String {
    format!("qr_codes/{}.png", plate_number)
}

/// Key an attempt writes to before its record is committed. The nonce keeps
/// concurrent attempts for the same plate from touching each other's files.
fn staging_key(key: &str, nonce: u64) -> String {
    format!("{}.{:016x}.part", key, nonce)
}

/// An artifact written under a staging key, waiting to be published
struct StagedArtifact {
    staged: String,
    key: String,
}

/// Registration workflow and registry queries
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn VehicleStore>,
    blobs: Arc<dyn BlobStore>,
    credentials: CredentialEncoder,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn VehicleStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            blobs,
            credentials: CredentialEncoder::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: CredentialEncoder) -> Self {
        self.credentials = credentials;
        self
    }

    /// validate → check uniqueness → store photo → store credential → insert.
    ///
    /// Nothing is inserted unless every step succeeds. Artifacts are written
    /// under per-attempt staging keys and only moved to their final keys
    /// once the insert has committed, so a losing attempt never overwrites or
    /// deletes the files of the vehicle that won the plate.
    pub async fn register_vehicle(
        &self,
        request: RegisterVehicleRequest,
    ) -> Result<Vehicle, RegistryError> {
        let result = self.register_inner(request).await;
        let outcome = match &result {
            Ok(_) => "registered",
            Err(e) => e.outcome(),
        };
        REGISTRY_REGISTRATIONS.with_label_values(&[outcome]).inc();
        result
    }

    async fn register_inner(
        &self,
        request: RegisterVehicleRequest,
    ) -> Result<Vehicle, RegistryError> {
        let input = validate(request)?;

        if self.store.find_by_plate(&input.plate_number).await?.is_some() {
            return Err(RegistryError::DuplicatePlate(input.plate_number));
        }

        let mut staged: Vec<StagedArtifact> = Vec::with_capacity(2);
        match self.stage_and_insert(input, &mut staged).await {
            Ok(vehicle) => {
                self.publish_artifacts(&staged).await;
                info!(
                    vehicle_id = vehicle.id,
                    plate = %vehicle.plate_number,
                    "vehicle registered"
                );
                Ok(vehicle)
            }
            Err(e) => {
                self.discard_artifacts(&staged).await;
                Err(e)
            }
        }
    }

    async fn stage_and_insert(
        &self,
        input: ValidatedRegistration,
        staged: &mut Vec<StagedArtifact>,
    ) -> Result<Vehicle, RegistryError> {
        let payload = CredentialPayload {
            plate_number: input.plate_number.clone(),
            driver_name: input.driver_name.clone(),
            car_color: input.car_color.clone(),
            car_type: input.car_type.clone(),
        };
        let png = self.credentials.encode_png(&payload)?;

        let overhead = self.blobs.public_path("").chars().count().max(STAGING_SUFFIX_LEN);
        let photo_key = photo_key(&input.plate_number, input.photo.file_name.as_deref(), overhead);
        let qr_key = qr_key(&input.plate_number);
        let photo_path = self.blobs.public_path(&photo_key);
        let qr_path = self.blobs.public_path(&qr_key);

        let nonce: u64 = rand::random();
        for (bytes, key) in [(&input.photo.bytes[..], photo_key), (&png[..], qr_key)] {
            let staged_key = staging_key(&key, nonce);
            self.blobs.save(bytes, &staged_key).await?;
            staged.push(StagedArtifact {
                staged: staged_key,
                key,
            });
        }

        self.store
            .insert(NewVehicle {
                plate_number: input.plate_number,
                driver_name: input.driver_name,
                car_color: input.car_color,
                car_type: input.car_type,
                registration_date: Utc::now(),
                qr_code_path: Some(qr_path),
                driver_photo_path: Some(photo_path),
            })
            .await
    }

    /// Move staged artifacts to their final keys. The record is already
    /// committed at this point, so failures are logged rather than returned.
    async fn publish_artifacts(&self, artifacts: &[StagedArtifact]) {
        for artifact in artifacts {
            if let Err(e) = self.blobs.promote(&artifact.staged, &artifact.key).await {
                error!(
                    key = %artifact.key,
                    error = %e,
                    "failed to publish registration artifact"
                );
                if let Err(e) = self.blobs.delete(&artifact.staged).await {
                    warn!(key = %artifact.staged, error = %e, "failed to remove staged artifact");
                }
            }
        }
    }

    async fn discard_artifacts(&self, artifacts: &[StagedArtifact]) {
        for artifact in artifacts {
            if let Err(e) = self.blobs.delete(&artifact.staged).await {
                warn!(
                    key = %artifact.staged,
                    error = %e,
                    "failed to clean up registration artifact"
                );
            }
        }
    }

    /// Vehicles whose driver name or plate contains `term` (case-insensitive),
    /// newest first. A blank term lists everything.
    pub async fn search_vehicles(&self, term: Option<&str>) -> Result<Vec<Vehicle>, RegistryError> {
        match term.map(str::trim).filter(|t| !t.is_empty()) {
            Some(term) => self.store.search(term).await,
            None => self.store.list_sorted_by_date_desc().await,
        }
    }

    pub async fn get_vehicle(&self, id: i64) -> Result<Option<Vehicle>, RegistryError> {
        self.store.get(id).await
    }

    pub async fn health_check(&self) -> Result<(), RegistryError> {
        self.store.health_check().await
    }
}
