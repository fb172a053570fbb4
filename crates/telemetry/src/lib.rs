pub mod logging;
pub mod metrics;

pub use logging::{init_structured_logging, init_with_service, LogConfig, LogFormat};

/// Install the default subscriber for an unnamed service
pub fn init() {
    logging::init();
}
