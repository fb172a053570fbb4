//! Vehicle registry: durable vehicle records, stored artifacts and the
//! registration workflow that ties them together.

pub mod blob;
pub mod credential;
pub mod error;
pub mod pg_store;
pub mod service;
pub mod store;

pub use blob::{BlobStore, FsBlobStore};
pub use credential::CredentialEncoder;
pub use error::RegistryError;
pub use pg_store::PgVehicleStore;
pub use service::RegistrationService;
pub use store::{MemoryVehicleStore, VehicleStore};
