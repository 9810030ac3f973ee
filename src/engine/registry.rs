//! Step registry: named handlers the engine resolves while sequencing a run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessingError;

/// Trait implemented by workflow step handlers that can be invoked by the
/// engine.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn invoke(&self, input: String) -> Result<(), ProcessingError>;
}

/// Function wrapper that implements [`StepHandler`].
pub struct FnStep<F, Fut>(pub F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), ProcessingError>> + Send + 'static;

#[async_trait]
impl<F, Fut> StepHandler for FnStep<F, Fut>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), ProcessingError>> + Send + 'static,
{
    async fn invoke(&self, input: String) -> Result<(), ProcessingError> {
        (self.0)(input).await
    }
}

/// Immutable registry mapping step names to handlers.
#[derive(Clone, Default)]
pub struct StepRegistry {
    inner: Arc<HashMap<String, Arc<dyn StepHandler>>>,
}

impl StepRegistry {
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder { map: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.inner.get(name).cloned()
    }
}

pub struct StepRegistryBuilder {
    map: HashMap<String, Arc<dyn StepHandler>>,
}

impl StepRegistryBuilder {
    pub fn register<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ProcessingError>> + Send + 'static,
    {
        self.map.insert(name.into(), Arc::new(FnStep(f)));
        self
    }

    pub fn build(self) -> StepRegistry {
        StepRegistry {
            inner: Arc::new(self.map),
        }
    }
}
