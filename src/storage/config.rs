use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the SQLite store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    /// Create the database file if it doesn't exist
    pub create_if_missing: bool,
    pub max_connections: u32,
    /// How long a writer waits for SQLite's write lock before failing
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            create_if_missing: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}
