use crate::registry::ReturnsPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Rows per ingestion chunk; each chunk commits as one transaction.
    pub chunk_size: usize,
    pub max_upload_bytes: u64,
    /// Run the row-counting pass before ingesting so progress has a denominator.
    pub count_rows: bool,
    pub reject_duplicate_uploads: bool,
    /// Number of row errors quoted in an upload history message.
    pub error_digest_limit: usize,
    pub return_centers: Vec<String>,
    pub return_carriers: Vec<String>,
    pub tracking_prefixes: Vec<String>,
}

impl AppConfig {
    /// The closed value sets enforced on returns reports.
    #[must_use]
    pub fn returns_policy(&self) -> ReturnsPolicy {
        ReturnsPolicy {
            return_centers: self.return_centers.clone(),
            return_carriers: self.return_carriers.clone(),
            tracking_prefixes: self.tracking_prefixes.clone(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("count_rows", &self.count_rows)
            .field("reject_duplicate_uploads", &self.reject_duplicate_uploads)
            .field("error_digest_limit", &self.error_digest_limit)
            .field("return_centers", &self.return_centers)
            .field("return_carriers", &self.return_carriers)
            .field("tracking_prefixes", &self.tracking_prefixes)
            .finish()
    }
}
