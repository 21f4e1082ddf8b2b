use std::env;

use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &[&str] =
    &["http://localhost:5173", "http://localhost:3000", "http://localhost:8080"];

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    server: ServerSettings,
    runtime: RuntimeSettings,
    api: ApiSettings,
    cors: CorsSettings,
    database: DatabaseSettings,
    scoring: ScoringSettings,
    grading: GradingSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    host: String,
    port: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoringSettings {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
    pub(crate) request_timeout: u64,
    pub(crate) max_retries: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct GradingSettings {
    pub(crate) worker_concurrency: usize,
    pub(crate) ai_max_attempts: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required setting {0}")]
    MissingRequired(&'static str),
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMINA_HOST", "0.0.0.0");
        let port = parse_u16("EXAMINA_PORT", env_or_default("EXAMINA_PORT", "8000"))?;

        let environment =
            parse_environment(env_optional("EXAMINA_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config = env_optional("EXAMINA_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let api = ApiSettings {
            project_name: env_or_default("PROJECT_NAME", "Examina API"),
            version: env_or_default("VERSION", env!("CARGO_PKG_VERSION")),
            api_v1_str: env_or_default("API_V1_STR", "/api/v1"),
        };

        let cors = CorsSettings { origins: parse_cors_origins(env_optional("CORS_ORIGINS")) };

        let database = DatabaseSettings {
            postgres_server: env_or_default("POSTGRES_SERVER", "localhost"),
            postgres_port: parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?,
            postgres_user: env_or_default("POSTGRES_USER", "examina"),
            postgres_password: env_or_default("POSTGRES_PASSWORD", ""),
            postgres_db: env_or_default("POSTGRES_DB", "examina_db"),
            database_url: env_optional("DATABASE_URL"),
        };

        let scoring = ScoringSettings {
            api_key: env_or_default("SCORING_API_KEY", ""),
            base_url: env_or_default("SCORING_BASE_URL", "https://api.openai.com/v1"),
            model: env_or_default("SCORING_MODEL", "gpt-4o-mini"),
            max_tokens: parse_u32(
                "SCORING_MAX_TOKENS",
                env_or_default("SCORING_MAX_TOKENS", "2000"),
            )?,
            request_timeout: parse_u64(
                "SCORING_REQUEST_TIMEOUT",
                env_or_default("SCORING_REQUEST_TIMEOUT", "120"),
            )?,
            max_retries: parse_u32(
                "SCORING_MAX_RETRIES",
                env_or_default("SCORING_MAX_RETRIES", "2"),
            )?,
        };

        let grading = GradingSettings {
            worker_concurrency: parse_u64(
                "GRADING_WORKER_CONCURRENCY",
                env_or_default("GRADING_WORKER_CONCURRENCY", "3"),
            )? as usize,
            ai_max_attempts: parse_u32(
                "GRADING_AI_MAX_ATTEMPTS",
                env_or_default("GRADING_AI_MAX_ATTEMPTS", "3"),
            )? as i32,
        };

        let telemetry = TelemetrySettings {
            log_level: env_or_default("LOG_LEVEL", "info"),
            json: env_optional("LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false),
            prometheus_enabled: env_optional("PROMETHEUS_ENABLED")
                .map(|value| parse_bool(&value))
                .unwrap_or(false),
        };

        let settings = Self {
            server: ServerSettings { host, port },
            runtime: RuntimeSettings { environment, strict_config },
            api,
            cors,
            database,
            scoring,
            grading,
            telemetry,
        };

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.strict_config {
            if self.scoring.api_key.is_empty() {
                return Err(ConfigError::MissingRequired("SCORING_API_KEY"));
            }
            if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
                return Err(ConfigError::MissingRequired("POSTGRES_PASSWORD"));
            }
        }
        Ok(())
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn scoring(&self) -> &ScoringSettings {
        &self.scoring
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|value| value.to_ascii_lowercase()) {
        Some(ref value) if value == "production" || value == "prod" => Environment::Production,
        Some(ref value) if value == "staging" => Environment::Staging,
        Some(ref value) if value == "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_cors_origins(value: Option<String>) -> Vec<String> {
    let Some(raw) = value else {
        return DEFAULT_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect();
    };

    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_truthy_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }

    #[test]
    fn cors_origins_fall_back_to_defaults() {
        let origins = parse_cors_origins(None);
        assert_eq!(origins.len(), DEFAULT_CORS_ORIGINS.len());
    }

    #[test]
    fn cors_origins_split_and_trim() {
        let origins = parse_cors_origins(Some("https://a.example/, https://b.example".to_string()));
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(parse_environment(None), Environment::Development);
        assert_eq!(parse_environment(Some("prod".into())), Environment::Production);
        assert_eq!(parse_environment(Some("TEST".into())), Environment::Test);
    }
}
