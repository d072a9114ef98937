//! Connection configuration for the adapter factory.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use textbench_core::BackendKind;

/// Default number of graph entities removed per clear batch.
pub const DEFAULT_CLEAR_BATCH_SIZE: usize = 10_000;

/// Tuning passed to adapters at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Maximum edges or nodes deleted per graph clear batch.
    pub clear_batch_size: usize,
}

impl AdapterOptions {
    pub fn new() -> Self {
        Self {
            clear_batch_size: DEFAULT_CLEAR_BATCH_SIZE,
        }
    }

    /// Set the graph clear batch size.
    pub fn with_clear_batch_size(mut self, size: usize) -> Self {
        self.clear_batch_size = size.max(1);
        self
    }
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a backend keeps its data.
///
/// All engines are embedded, so only `path` selects storage; `None` means a
/// temporary store dropped with the adapter. Host and credentials are kept
/// for configurations shared with server-based deployments.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub path: Option<PathBuf>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl ConnectionTarget {
    /// A temporary store.
    pub fn temporary() -> Self {
        Self::default()
    }

    /// A store persisted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Whether any server-only field is set.
    pub fn has_remote_fields(&self) -> bool {
        self.host.is_some() || self.user.is_some() || self.password.is_some() || self.database.is_some()
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("path", &self.path)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

/// Backend kind plus its connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub kind: BackendKind,
    pub target: ConnectionTarget,
    pub options: AdapterOptions,
}

impl ConnectionConfig {
    /// A temporary store of the given kind.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            target: ConnectionTarget::temporary(),
            options: AdapterOptions::default(),
        }
    }

    pub fn with_target(mut self, target: ConnectionTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.target.path = Some(path.into());
        self
    }

    pub fn with_options(mut self, options: AdapterOptions) -> Self {
        self.options = options;
        self
    }
}

/// Parses `kind` or `kind=path`, e.g. `graph` or `relational=./corpus.sqlite`.
impl FromStr for ConnectionConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, path) = match s.split_once('=') {
            Some((kind, path)) => (kind, Some(path.trim())),
            None => (s, None),
        };
        let config = Self::new(kind.trim().parse()?);
        Ok(match path {
            Some(path) if !path.is_empty() => config.with_path(path),
            _ => config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_and_path() {
        let config: ConnectionConfig = "relational=/tmp/corpus.sqlite".parse().unwrap();
        assert_eq!(config.kind, BackendKind::Relational);
        assert_eq!(config.target.path, Some(PathBuf::from("/tmp/corpus.sqlite")));

        let config: ConnectionConfig = "wide_column".parse().unwrap();
        assert_eq!(config.kind, BackendKind::WideColumn);
        assert!(config.target.path.is_none());

        assert!("mongo".parse::<ConnectionConfig>().is_err());
    }

    #[test]
    fn test_password_redacted() {
        let target = ConnectionTarget::temporary().with_credentials("bench", "hunter2");
        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
        assert!(target.has_remote_fields());
    }

    #[test]
    fn test_remote_target_fields() {
        let target = ConnectionTarget::temporary()
            .with_host("db.local")
            .with_database("corpus");
        let config = ConnectionConfig::new(BackendKind::Graph).with_target(target.clone());
        assert!(config.target.has_remote_fields());
        assert!(config.target.path.is_none());
        assert!(!ConnectionTarget::at("/tmp/graph").has_remote_fields());
        assert_eq!(config.target, target);
    }

    #[test]
    fn test_clear_batch_size_floor() {
        assert_eq!(AdapterOptions::new().with_clear_batch_size(0).clear_batch_size, 1);
        assert_eq!(AdapterOptions::default().clear_batch_size, DEFAULT_CLEAR_BATCH_SIZE);
    }
}
