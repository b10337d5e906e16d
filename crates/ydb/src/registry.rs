//! Process-wide engine registry.
//!
//! Maps an engine name to the connection string a session opens it with.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

static ENGINES: Lazy<RwLock<HashMap<String, String>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `dsn` under `name`. A later registration of the same name
/// replaces the earlier one.
pub fn register_engine(name: impl Into<String>, dsn: impl Into<String>) {
    let name = name.into();
    let dsn = dsn.into();
    debug!(engine = %name, dsn = %dsn, "Registering engine");
    ENGINES.write().insert(name, dsn);
}

/// Returns the connection string registered under `name`.
#[must_use]
pub fn engine_dsn(name: &str) -> Option<String> {
    ENGINES.read().get(name).cloned()
}

/// Returns the registered engine names, sorted.
#[must_use]
pub fn engine_names() -> Vec<String> {
    let mut names: Vec<String> = ENGINES.read().keys().cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_overwrites() {
        register_engine("registry-test", "sqlite::memory:");
        register_engine("registry-test", "sqlite://other.db");
        assert_eq!(
            engine_dsn("registry-test").as_deref(),
            Some("sqlite://other.db")
        );
        assert!(engine_names().contains(&"registry-test".to_string()));
        assert!(engine_dsn("registry-missing").is_none());
    }
}
