use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use ahash::HashMap;
use parking_lot::RwLock;

use super::{Datasource, DatasourceError, MemoryDatasource};

/// Parameters a datasource is created with (`type`, `file`, `encoding` etc).
pub type DatasourceParams = BTreeMap<String, String>;

/// Function creating a datasource from parameters.
pub type DatasourceFactory =
    Arc<dyn Fn(&DatasourceParams) -> Result<Arc<dyn Datasource>, DatasourceError> + Send + Sync>;

static INSTANCE: OnceLock<DatasourceRegistry> = OnceLock::new();

/// Registry of datasource types.
///
/// Registration must happen before concurrent renders start using the registry: lookups take a read
/// lock, and a registration blocks them for its duration.
pub struct DatasourceRegistry {
    factories: RwLock<HashMap<String, DatasourceFactory>>,
}

impl Default for DatasourceRegistry {
    fn default() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::default()),
        };
        registry.register("memory", |_| {
            Ok(Arc::new(MemoryDatasource::new()) as Arc<dyn Datasource>)
        });
        registry
    }
}

impl DatasourceRegistry {
    /// Creates a registry with built-in datasource types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, created on first access.
    pub fn global() -> &'static Self {
        INSTANCE.get_or_init(|| {
            log::debug!("Initializing global datasource registry");
            Self::default()
        })
    }

    /// Registers a datasource type. Registering the same name twice replaces the factory.
    pub fn register(
        &self,
        name: &str,
        factory: impl Fn(&DatasourceParams) -> Result<Arc<dyn Datasource>, DatasourceError>
            + Send
            + Sync
            + 'static,
    ) {
        let previous = self
            .factories
            .write()
            .insert(name.to_string(), Arc::new(factory));
        if previous.is_some() {
            log::warn!("Datasource type '{name}' was registered twice, the old one is replaced");
        }
    }

    /// Returns true if the type is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Names of registered types, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Creates a datasource. The type is taken from the `type` parameter.
    pub fn create(&self, params: &DatasourceParams) -> Result<Arc<dyn Datasource>, DatasourceError> {
        let kind = params
            .get("type")
            .ok_or_else(|| DatasourceError::Config("missing 'type' parameter".to_string()))?;
        let factory = self
            .factories
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| DatasourceError::Config(format!("unknown datasource type '{kind}'")))?;

        factory(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn create_registered_types() {
        let registry = DatasourceRegistry::new();
        let params = DatasourceParams::from([("type".to_string(), "memory".to_string())]);
        let ds = registry.create(&params).unwrap();
        assert!(!ds.envelope().is_valid());

        assert_matches!(
            registry.create(&DatasourceParams::new()).err(),
            Some(DatasourceError::Config(_))
        );

        let params = DatasourceParams::from([("type".to_string(), "shape".to_string())]);
        assert_matches!(registry.create(&params).err(), Some(DatasourceError::Config(_)));

        registry.register("shape", |p| {
            Err(DatasourceError::Io(format!(
                "cannot open {}",
                p.get("file").cloned().unwrap_or_default()
            )))
        });
        assert_eq!(registry.names(), vec!["memory", "shape"]);
        assert_matches!(registry.create(&params).err(), Some(DatasourceError::Io(_)));
    }
}
