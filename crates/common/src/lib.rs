pub mod validation;
pub mod vehicles;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
