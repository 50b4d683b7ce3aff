use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RegistryError
/// Registration-time failures. Fatal at setup, never per instance.
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("'{model}' (target '{target}') is already registered under this strategy")]
    AlreadyRegistered {
        model: &'static str,
        target: String,
    },

    #[error("'{model}' is missing a required capability: {capability}")]
    CapabilityMissing {
        model: &'static str,
        capability: String,
    },
}

///
/// Registration
/// One blessed model: its schema path, stable name, persisted target,
/// and the field used as its persisted identity.
///

#[derive(Clone, Debug)]
pub struct Registration {
    pub model_path: &'static str,
    pub model_name: &'static str,
    pub target: String,
    pub identity_field: Option<&'static str>,
}

///
/// StrategyRegistry
///
/// Bidirectional model/target registry for one strategy instance.
/// One-to-one within the instance; the same target may back different
/// models across separate strategy instances.
///

#[derive(Debug, Default)]
pub struct StrategyRegistry {
    by_model: BTreeMap<&'static str, Registration>,
    by_target: BTreeMap<String, &'static str>,
}

impl StrategyRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            by_model: BTreeMap::new(),
            by_target: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, registration: Registration) -> Result<(), RegistryError> {
        if self.by_model.contains_key(registration.model_path) {
            return Err(RegistryError::AlreadyRegistered {
                model: registration.model_path,
                target: registration.target,
            });
        }
        if let Some(existing) = self.by_target.get(registration.target.as_str()) {
            return Err(RegistryError::AlreadyRegistered {
                model: existing,
                target: registration.target,
            });
        }

        self.by_target
            .insert(registration.target.clone(), registration.model_path);
        self.by_model
            .insert(registration.model_path, registration);

        Ok(())
    }

    #[must_use]
    pub fn by_model(&self, model_path: &str) -> Option<&Registration> {
        self.by_model.get(model_path)
    }

    #[must_use]
    pub fn model_for_target(&self, target: &str) -> Option<&'static str> {
        self.by_target.get(target).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_model.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }
}
