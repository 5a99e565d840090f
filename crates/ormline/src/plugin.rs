//! Plugins.
//!
//! A plugin is a named bundle of callback changes. It is registered on a
//! [`DbBuilder`](crate::DbBuilder) before the handle is built, initializes
//! itself against the callback chains once, and stays reachable by name
//! from every handle derived from that root.

use crate::callbacks::Callbacks;
use ormline_core::{ConfigError, Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An extension installed into a handle's callback chains.
pub trait Plugin: Send + Sync {
    /// Registry key. Names are unique per root handle.
    fn name(&self) -> &str;

    /// Install the plugin's steps. An error leaves it unregistered.
    fn initialize(&self, callbacks: &mut Callbacks) -> Result<()>;
}

/// The plugins of one root handle, by name.
#[derive(Clone, Default)]
pub(crate) struct Plugins {
    by_name: BTreeMap<String, Arc<dyn Plugin>>,
}

impl Plugins {
    pub(crate) fn register(
        &mut self,
        plugin: Arc<dyn Plugin>,
        callbacks: &mut Callbacks,
    ) -> Result<()> {
        let name = plugin.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(Error::Config(ConfigError {
                message: format!("plugin {name} is already registered"),
                source: None,
            }));
        }
        plugin.initialize(callbacks)?;
        tracing::debug!(plugin = %name, "Registered plugin");
        self.by_name.insert(name, plugin);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.by_name.get(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.by_name.keys()).finish()
    }
}
