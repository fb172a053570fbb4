use plate_recognition::RecognitionPipeline;
use std::sync::Arc;
use vehicle_registry::RegistrationService;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pipeline: RecognitionPipeline,
    registry: RegistrationService,
}

impl AppState {
    pub fn new(pipeline: RecognitionPipeline, registry: RegistrationService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { pipeline, registry }),
        }
    }

    pub fn pipeline(&self) -> &RecognitionPipeline {
        &self.inner.pipeline
    }

    pub fn registry(&self) -> &RegistrationService {
        &self.inner.registry
    }
}
