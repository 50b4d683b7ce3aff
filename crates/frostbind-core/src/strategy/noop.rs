use crate::{
    model::ModelDescriptor,
    row::RowRef,
    strategy::{BindingStrategy, StrategyError},
    value::Value,
};

///
/// NoopStrategy
///
/// Default strategy: no persisted counterpart exists for any model, so
/// the library behaves as a pure validated-value layer.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStrategy;

impl BindingStrategy for NoopStrategy {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn create_counterpart(
        &self,
        _model: &'static ModelDescriptor,
        _fields: &[(&'static str, Value)],
    ) -> Result<Option<RowRef>, StrategyError> {
        Ok(None)
    }
}
