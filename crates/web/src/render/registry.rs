use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::render::{Driver, JinjaDriver, RenderError};

/// Creates a driver for a template directory.
pub type DriverFactory = Arc<dyn Fn(&Path) -> Result<Arc<dyn Driver>, RenderError> + Send + Sync>;

/// Render drivers by name.
///
/// [`DriverRegistry::default`] knows the `jinja` driver, [`DriverRegistry::new`]
/// starts empty.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Registers `factory` under `name`, returning the factory it replaces.
    pub fn register<S, F>(&mut self, name: S, factory: F) -> Option<DriverFactory>
    where
        S: Into<String>,
        F: Fn(&Path) -> Result<Arc<dyn Driver>, RenderError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(driver = %name, "register render driver");
        self.factories.insert(name, Arc::new(factory))
    }

    pub fn get(&self, name: &str) -> Option<&DriverFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates the driver registered as `name` against `tmpl_dir`.
    pub fn create<P: AsRef<Path>>(&self, name: &str, tmpl_dir: P) -> Result<Arc<dyn Driver>, RenderError> {
        let factory = self.get(name).ok_or_else(|| RenderError::unknown_driver(name))?;
        factory(tmpl_dir.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("jinja", |tmpl_dir: &Path| -> Result<Arc<dyn Driver>, RenderError> {
            Ok(Arc::new(JinjaDriver::new(tmpl_dir)?))
        });
        registry
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry").field("names", &self.names()).finish()
    }
}
