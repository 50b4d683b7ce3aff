use crate::{
    materialize,
    model::ModelDescriptor,
    row::{RowIdentity, RowRef},
    store::CacheService,
    strategy::{
        BindingStrategy, Registration, RegistryError, StrategyError, StrategyRegistry,
        new_counterpart_row,
    },
    traits::Record,
    value::Value,
};
use std::{cell::RefCell, rc::Rc, time::Duration};

///
/// CacheStrategy
///
/// Cache-backed binding: blessed models are keyed by a named identifier
/// field and persisted write-through as JSON payloads under
/// `"{prefix}:{model-name}:{identity}"`.
///

pub struct CacheStrategy {
    cache: Rc<dyn CacheService>,
    prefix: String,
    ttl: Option<Duration>,
    registry: RefCell<StrategyRegistry>,
}

impl CacheStrategy {
    #[must_use]
    pub fn new(cache: Rc<dyn CacheService>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl: None,
            registry: RefCell::new(StrategyRegistry::new()),
        }
    }

    /// TTL passed through to every cache write.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Register a model against a named identifier field.
    ///
    /// The field must exist on the model; checked here, not at use time.
    pub fn bless<M: Record>(&self, identity_field: &'static str) -> Result<(), RegistryError> {
        let model = M::MODEL;

        if model.field(identity_field).is_none() {
            return Err(RegistryError::CapabilityMissing {
                model: model.path,
                capability: format!("identifier field '{identity_field}'"),
            });
        }

        self.registry.borrow_mut().insert(Registration {
            model_path: M::PATH,
            model_name: model.model_name,
            target: model.model_name.to_string(),
            identity_field: Some(identity_field),
        })
    }

    /// Cache key for one identity: `"{prefix}:{model-name}:{identity}"`.
    #[must_use]
    pub fn key_for(&self, model_name: &str, identity: &Value) -> String {
        format!("{}:{model_name}:{identity}", self.prefix)
    }

    /// Fetch a cached payload back into a counterpart row.
    pub fn fetch_row<M: Record>(&self, identity: &Value) -> Result<Option<RowRef>, StrategyError> {
        let model = M::MODEL;
        let Some(registration) = self.registration(model.path) else {
            return Ok(None);
        };

        let key = self.key_for(registration.model_name, identity);
        let Some(bytes) = self.cache.get(&key)? else {
            return Ok(None);
        };

        let payload: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|err| StrategyError::Serialize {
                model: model.path,
                message: err.to_string(),
            })?;
        let serde_json::Value::Object(object) = payload else {
            return Err(StrategyError::Serialize {
                model: model.path,
                message: "cached payload is not an object".to_string(),
            });
        };

        let fields: Vec<(&'static str, Value)> = model
            .fields
            .iter()
            .filter_map(|field| {
                object
                    .get(field.name)
                    .map(|value| (field.name, Value::from_json(value)))
            })
            .collect();

        Ok(Some(new_counterpart_row(&registration.target, model, &fields)))
    }

    /// Fetch and materialize a cached record in the current episode.
    pub fn lookup<M: Record>(&self, identity: &Value) -> Result<Option<Rc<M>>, StrategyError> {
        let Some(row) = self.fetch_row::<M>(identity)? else {
            return Ok(None);
        };

        materialize::record::<M>(&row)
            .map(Some)
            .map_err(|err| StrategyError::Materialize(Box::new(err)))
    }

    /// Drop one cached record.
    pub fn evict<M: Record>(&self, identity: &Value) -> Result<(), StrategyError> {
        let key = self.key_for(M::MODEL.model_name, identity);
        self.cache.delete(&key)?;
        Ok(())
    }

    /// Drop every cached record of a model.
    pub fn evict_all<M: Record>(&self) -> Result<(), StrategyError> {
        let pattern = format!("{}:{}:*", self.prefix, M::MODEL.model_name);
        self.cache.delete_matching(&pattern)?;
        Ok(())
    }

    fn write_through(
        &self,
        registration: &Registration,
        fields: &[(&'static str, Value)],
    ) -> Result<(), StrategyError> {
        let Some(identity_field) = registration.identity_field else {
            return Ok(());
        };
        let Some((_, identity)) = fields.iter().find(|(name, _)| *name == identity_field) else {
            return Ok(());
        };
        if identity.is_null() {
            // No key material yet; nothing addressable to cache.
            return Ok(());
        }

        let object: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.to_json()))
            .collect();
        let bytes = serde_json::to_vec(&serde_json::Value::Object(object)).map_err(|err| {
            StrategyError::Serialize {
                model: registration.model_path,
                message: err.to_string(),
            }
        })?;

        let key = self.key_for(registration.model_name, identity);
        self.cache.set(&key, &bytes, self.ttl)?;

        Ok(())
    }
}

impl BindingStrategy for CacheStrategy {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn create_counterpart(
        &self,
        model: &'static ModelDescriptor,
        fields: &[(&'static str, Value)],
    ) -> Result<Option<RowRef>, StrategyError> {
        let Some(registration) = self.registration(model.path) else {
            return Ok(None);
        };

        self.write_through(&registration, fields)?;

        Ok(Some(new_counterpart_row(&registration.target, model, fields)))
    }

    fn registration(&self, model_path: &str) -> Option<Registration> {
        self.registry.borrow().by_model(model_path).cloned()
    }

    fn model_for_target(&self, target: &str) -> Option<&'static str> {
        self.registry.borrow().model_for_target(target)
    }

    fn identity_of(&self, model: &'static ModelDescriptor, row: &RowRef) -> RowIdentity {
        let identity_field = self
            .registration(model.path)
            .and_then(|r| r.identity_field)
            .or_else(|| model.identity_name());

        RowIdentity::of(row, identity_field)
    }
}
