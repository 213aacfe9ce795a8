use std::net::SocketAddr;

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
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Preferred marketplace token source.
    pub marketplace_token: Option<String>,
    /// Used only when `marketplace_token` is unset.
    pub marketplace_token_fallback: Option<String>,
    pub catalog_base_url: String,
    pub catalog_list_path: String,
    pub supplies_base_url: String,
    pub request_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub page_limit: u32,
    pub max_pages: usize,
    pub full_scan_max_pages: usize,
    pub pacing_ms: u64,
    pub patch_batch_size: usize,
    pub pass_deadline_secs: Option<u64>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field(
                "marketplace_token",
                &self.marketplace_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "marketplace_token_fallback",
                &self.marketplace_token_fallback.as_ref().map(|_| "[redacted]"),
            )
            .field("catalog_base_url", &self.catalog_base_url)
            .field("catalog_list_path", &self.catalog_list_path)
            .field("supplies_base_url", &self.supplies_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_delay_ms", &self.retry_initial_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("page_limit", &self.page_limit)
            .field("max_pages", &self.max_pages)
            .field("full_scan_max_pages", &self.full_scan_max_pages)
            .field("pacing_ms", &self.pacing_ms)
            .field("patch_batch_size", &self.patch_batch_size)
            .field("pass_deadline_secs", &self.pass_deadline_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
