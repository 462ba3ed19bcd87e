#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// Base URL of the geolocation provider; the client appends
    /// `/<escaped-ip>/json`.
    pub geo_base_url: String,
    pub cors_origins: Vec<String>,
    pub duckdb_memory_limit: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("TELEMETRICS_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("TELEMETRICS_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            geo_base_url: std::env::var("TELEMETRICS_GEO_BASE_URL")
                .unwrap_or_else(|_| "https://ipinfo.io".to_string()),
            cors_origins: std::env::var("TELEMETRICS_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            duckdb_memory_limit: std::env::var("TELEMETRICS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
        })
    }
}
