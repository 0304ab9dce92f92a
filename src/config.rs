use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub query: QueryConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the DuckDB file holding uploaded tables
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origin, `*` for any
    pub cors_origin: String,
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub timeout_secs: u64,
    /// Row cap appended to generated queries without a LIMIT; 0 disables it
    pub default_limit: u64,
    /// Reject anything but a single SELECT over the target table
    pub read_only: bool,
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn limit(&self) -> Option<u64> {
        (self.default_limit > 0).then_some(self.default_limit)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub upload_dir: String,
    /// Number of self-insert rounds after loading; each round doubles the rows
    pub duplication_rounds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file first so its values take part in the overrides
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("database.path", "database.duckdb")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origin", "http://localhost:5173")?
            .set_default("server.max_upload_mb", 50)?
            .set_default("llm.api_url", "https://api.openai.com/v1")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.timeout_secs", 30)?
            .set_default("query.timeout_secs", 30)?
            .set_default("query.default_limit", 10_000)?
            .set_default("query.read_only", true)?
            .set_default("ingest.upload_dir", "./uploads")?
            .set_default("ingest.duplication_rounds", 0)?
            .set_default("logging.level", "info")?;

        let overrides = [
            ("DATABASE_PATH", "database.path"),
            ("HOST", "server.host"),
            ("CORS_ORIGIN", "server.cors_origin"),
            ("MAX_UPLOAD_MB", "server.max_upload_mb"),
            ("LLM_API_URL", "llm.api_url"),
            ("LLM_MODEL", "llm.model"),
            ("LLM_TIMEOUT_SECS", "llm.timeout_secs"),
            ("QUERY_TIMEOUT_SECS", "query.timeout_secs"),
            ("QUERY_DEFAULT_LIMIT", "query.default_limit"),
            ("QUERY_READ_ONLY", "query.read_only"),
            ("UPLOAD_DIR", "ingest.upload_dir"),
            ("INGEST_DUPLICATION_ROUNDS", "ingest.duplication_rounds"),
            ("RUST_LOG", "logging.level"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        // OPENAI_API_KEY is what the OpenAI tooling uses; LLM_API_KEY wins when both are set
        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }
        if let Ok(api_key) = env::var("LLM_API_KEY") {
            builder = builder.set_override("llm.api_key", Some(api_key))?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        url::Url::parse(&self.llm.api_url).map_err(|e| {
            config::ConfigError::Message(format!("Invalid llm.api_url '{}': {}", self.llm.api_url, e))
        })?;
        if self.ingest.duplication_rounds > 20 {
            return Err(config::ConfigError::Message(format!(
                "ingest.duplication_rounds must be at most 20, got {}",
                self.ingest.duplication_rounds
            )));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
