//! Name-keyed transfer factories.

use crate::adapter::AdapterRegistry;
use crate::error::{ReplicaError, Result};
use crate::model::{RESOURCE_TYPE_ARTIFACT, RESOURCE_TYPE_IMAGE};
use crate::transfer::{ImageTransfer, Logger, StopSignal, Transfer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a transfer for one job.
pub type TransferFactory =
    Arc<dyn Fn(Arc<dyn Logger>, StopSignal) -> Result<Box<dyn Transfer>> + Send + Sync>;

/// Maps resource types to transfer factories.
///
/// Populated once at startup. Lookups afterwards only read, so a registry can
/// be shared by concurrent jobs behind an `Arc` without locking.
#[derive(Clone, Default)]
pub struct TransferRegistry {
    factories: HashMap<String, TransferFactory>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the image transfer for both image and artifact resources.
    pub fn builtin(adapters: AdapterRegistry) -> Self {
        let factory: TransferFactory =
            Arc::new(
                move |logger: Arc<dyn Logger>, stop: StopSignal| -> Result<Box<dyn Transfer>> {
                    Ok(Box::new(ImageTransfer::new(adapters.clone(), logger, stop)))
                },
            );

        let factories = [RESOURCE_TYPE_IMAGE, RESOURCE_TYPE_ARTIFACT]
            .into_iter()
            .map(|name| (name.to_string(), factory.clone()))
            .collect();
        Self { factories }
    }

    /// Registers `factory` under `name`.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(Arc<dyn Logger>, StopSignal) -> Result<Box<dyn Transfer>> + Send + Sync + 'static,
    {
        self.register_factory(name, Arc::new(factory))
    }

    /// Registers an already shared factory, so one factory can serve several names.
    pub fn register_factory(&mut self, name: &str, factory: TransferFactory) -> Result<()> {
        if name.is_empty() {
            return Err(ReplicaError::registration("empty transfer name"));
        }
        if self.factories.contains_key(name) {
            return Err(ReplicaError::registration(format!(
                "transfer factory for {name} already registered"
            )));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<TransferFactory> {
        self.factories.get(name).cloned().ok_or_else(|| {
            ReplicaError::registration(format!("no transfer factory registered for {name}"))
        })
    }

    /// Looks up `name` and builds a transfer with it.
    pub fn create(
        &self,
        name: &str,
        logger: Arc<dyn Logger>,
        stop: StopSignal,
    ) -> Result<Box<dyn Transfer>> {
        let factory = self.get(name)?;
        factory(logger, stop)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TransferRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRegistry")
            .field("names", &self.names())
            .finish()
    }
}
