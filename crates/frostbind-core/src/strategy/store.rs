use crate::{
    model::ModelDescriptor,
    row::RowRef,
    store::RecordStore,
    strategy::{
        BindingStrategy, Registration, RegistryError, StrategyError, StrategyRegistry,
        new_counterpart_row,
    },
    traits::Record,
    value::Value,
};
use std::{any::Any, cell::RefCell, rc::Rc};

///
/// StoreStrategy
///
/// Store-backed binding: blessed models get a counterpart row registered
/// with the record store at construction time, and materialized instances
/// are registered as the canonical proxy of their row.
///

pub struct StoreStrategy {
    store: Rc<dyn RecordStore>,
    registry: RefCell<StrategyRegistry>,
}

impl StoreStrategy {
    #[must_use]
    pub fn new(store: Rc<dyn RecordStore>) -> Self {
        Self {
            store,
            registry: RefCell::new(StrategyRegistry::new()),
        }
    }

    /// Register a model against a persisted store target.
    ///
    /// Capability checks run here, not at use time: the model must declare
    /// an identity field and the store must expose the target.
    pub fn bless<M: Record>(&self, target: impl Into<String>) -> Result<(), RegistryError> {
        let target = target.into();
        let model = M::MODEL;

        let Some(identity) = model.identity_name() else {
            return Err(RegistryError::CapabilityMissing {
                model: model.path,
                capability: "a declared identity field".to_string(),
            });
        };
        if !self.store.has_target(&target) {
            return Err(RegistryError::CapabilityMissing {
                model: model.path,
                capability: format!("store target '{target}'"),
            });
        }

        self.registry.borrow_mut().insert(Registration {
            model_path: M::PATH,
            model_name: model.model_name,
            target,
            identity_field: Some(identity),
        })
    }
}

impl BindingStrategy for StoreStrategy {
    fn name(&self) -> &'static str {
        "store"
    }

    fn create_counterpart(
        &self,
        model: &'static ModelDescriptor,
        fields: &[(&'static str, Value)],
    ) -> Result<Option<RowRef>, StrategyError> {
        // Unblessed models carry no counterpart under this strategy.
        let Some(registration) = self.registration(model.path) else {
            return Ok(None);
        };

        let row = new_counterpart_row(&registration.target, model, fields);
        self.store.add(&row)?;

        tracing::debug!(
            model = model.path,
            target = registration.target.as_str(),
            "counterpart row created"
        );

        Ok(Some(row))
    }

    fn registration(&self, model_path: &str) -> Option<Registration> {
        self.registry.borrow().by_model(model_path).cloned()
    }

    fn model_for_target(&self, target: &str) -> Option<&'static str> {
        self.registry.borrow().model_for_target(target)
    }

    fn after_materialize(
        &self,
        _model: &'static ModelDescriptor,
        row: &RowRef,
        instance: &Rc<dyn Any>,
    ) {
        // The freshly materialized instance becomes the canonical proxy
        // for its row.
        row.borrow_mut().set_proxy(Rc::downgrade(instance));
    }

    fn store(&self) -> Option<Rc<dyn RecordStore>> {
        Some(Rc::clone(&self.store))
    }
}
