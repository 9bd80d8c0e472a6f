use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::nim_client::LlmGateway;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    llm: Arc<dyn LlmGateway>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, llm: Arc<dyn LlmGateway>) -> Self {
        Self { inner: Arc::new(InnerState { settings, llm }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn llm(&self) -> &dyn LlmGateway {
        self.inner.llm.as_ref()
    }
}
