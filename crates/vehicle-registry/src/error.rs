use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Missing or malformed registration input
    #[error("{0}")]
    Validation(String),

    /// A vehicle with this plate number already exists
    #[error("vehicle with plate {0} already registered")]
    DuplicatePlate(String),

    /// Database or blob storage failure
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl RegistryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Label used for the registration outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid",
            Self::DuplicatePlate(_) => "duplicate",
            Self::Storage(_) => "error",
        }
    }
}

impl From<anyhow::Error> for RegistryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
