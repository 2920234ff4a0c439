//! Process-wide model slot for a serving shell.
//!
//! The shell calls [`on_startup`] once, answers requests through
//! [`ServedModel::predict`], and calls [`on_shutdown`] when stopping. A load
//! failure at startup is returned to the caller; there is no partial service.

use tracing::{info, warn};

use crate::data::{Inputs, Output};
use crate::error::{ModelError, ModelResult};
use crate::logging::init_tracing;
use crate::model::ModelHandle;
use crate::registry::ModelRegistry;
use crate::settings::Settings;

#[derive(Debug)]
pub struct ServedModel {
    name: String,
    registry: ModelRegistry,
    handle: Option<ModelHandle>,
}

impl ServedModel {
    /// An empty slot for the model named in `settings`.
    pub fn new(settings: &Settings, registry: ModelRegistry) -> ModelResult<Self> {
        let name = settings
            .model_name
            .clone()
            .ok_or_else(|| ModelError::config("no model_name configured for serving"))?;
        Ok(Self {
            name,
            registry,
            handle: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the model from the registry, replacing any loaded one.
    pub fn loading(&mut self) -> ModelResult<()> {
        let handle = self.registry.load_model(&self.name)?;
        self.handle = Some(handle);
        info!(model_name = %self.name, "model loaded for serving");
        Ok(())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&ModelHandle> {
        self.handle.as_ref()
    }

    pub fn predict(&self, x: Inputs, return_proba: bool) -> ModelResult<Output> {
        let handle = self.handle.as_ref().ok_or_else(|| ModelError::NotFitted {
            model_name: self.name.clone(),
        })?;
        let model = handle.read();
        model.predict(x, return_proba)
    }

    pub fn unload(&mut self) {
        if self.handle.take().is_some() {
            info!(model_name = %self.name, "model unloaded");
        }
    }
}

/// Install logging at `settings.log_level`, build the slot and load the
/// configured model.
pub fn on_startup(settings: &Settings, registry: ModelRegistry) -> ModelResult<ServedModel> {
    if let Err(err) = init_tracing(&settings.log_level) {
        warn!(error = %err, "keeping the existing tracing subscriber");
    }
    info!(models_root = %settings.models_root.display(), "serving startup");
    let mut served = ServedModel::new(settings, registry)?;
    served.loading()?;
    Ok(served)
}

pub fn on_shutdown(served: &mut ServedModel) {
    if !served.is_model_loaded() {
        warn!(model_name = %served.name(), "shutdown without a loaded model");
    }
    served.unload();
}
