use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_stages, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    ApiSettings, BatchSettings, ConfigError, CorsSettings, DatabaseSettings, InferenceSettings,
    InteractiveSettings, ProviderSettings, RedisSettings, RuntimeSettings, S3Settings,
    SchedulerSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings,
    TelemetrySettings,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("SCRIPTORIUM_HOST", "0.0.0.0");
        let port = env_or_default("SCRIPTORIUM_PORT", "8000");

        let environment = parse_environment(
            env_optional("SCRIPTORIUM_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("SCRIPTORIUM_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Scriptorium API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let operator_secret = env_optional("OPERATOR_SECRET");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "scriptorium");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "scriptorium_db");
        let database_url = env_optional("DATABASE_URL");
        let db_max_connections =
            parse_u32("DB_MAX_CONNECTIONS", env_or_default("DB_MAX_CONNECTIONS", "20"))?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let s3_endpoint = env_or_default("S3_ENDPOINT", "https://storage.yandexcloud.net");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "scriptorium-pages");
        let s3_region = env_or_default("S3_REGION", "ru-central1");

        let gemini_api_key = env_or_default("GEMINI_API_KEY", "");
        let provider_api_key = env_optional("BATCH_PROVIDER_API_KEY")
            .unwrap_or_else(|| gemini_api_key.clone());
        let provider_base_url = env_or_default("BATCH_PROVIDER_BASE_URL", GEMINI_BASE_URL);
        let provider_model = env_or_default("BATCH_PROVIDER_MODEL", "gemini-2.5-flash");
        let provider_timeout = parse_u64(
            "BATCH_PROVIDER_TIMEOUT_SECONDS",
            env_or_default("BATCH_PROVIDER_TIMEOUT_SECONDS", "120"),
        )?;
        let retention_hours = parse_u64(
            "BATCH_RETENTION_HOURS",
            env_or_default("BATCH_RETENTION_HOURS", "48"),
        )?;

        let inference_api_key =
            env_optional("INFERENCE_API_KEY").unwrap_or_else(|| gemini_api_key.clone());
        let inference_base_url = env_or_default("INFERENCE_BASE_URL", GEMINI_BASE_URL);
        let inference_model = env_or_default("INFERENCE_MODEL", "gemini-2.5-flash");
        let inference_timeout = parse_u64(
            "INFERENCE_TIMEOUT_SECONDS",
            env_or_default("INFERENCE_TIMEOUT_SECONDS", "90"),
        )?;
        let inference_max_output_tokens = parse_u32(
            "INFERENCE_MAX_OUTPUT_TOKENS",
            env_or_default("INFERENCE_MAX_OUTPUT_TOKENS", "8192"),
        )?;

        let batch_size =
            parse_usize("SCRIPTORIUM_BATCH_SIZE", env_or_default("SCRIPTORIUM_BATCH_SIZE", "25"))?;
        let max_active_jobs = parse_u64(
            "SCRIPTORIUM_BATCH_MAX_ACTIVE_JOBS",
            env_or_default("SCRIPTORIUM_BATCH_MAX_ACTIVE_JOBS", "10"),
        )?;
        let max_new_jobs = parse_u64(
            "SCRIPTORIUM_BATCH_MAX_NEW_JOBS",
            env_or_default("SCRIPTORIUM_BATCH_MAX_NEW_JOBS", "5"),
        )?;
        let stages = parse_stages(env_optional("SCRIPTORIUM_BATCH_STAGES"))?;

        let concurrency = parse_usize(
            "INTERACTIVE_CONCURRENCY",
            env_or_default("INTERACTIVE_CONCURRENCY", "5"),
        )?;
        let max_attempts = parse_u32(
            "INTERACTIVE_MAX_ATTEMPTS",
            env_or_default("INTERACTIVE_MAX_ATTEMPTS", "3"),
        )?;
        let base_delay_ms = parse_u64(
            "INTERACTIVE_BASE_DELAY_MS",
            env_or_default("INTERACTIVE_BASE_DELAY_MS", "1000"),
        )?;
        let attempt_timeout_seconds = parse_u64(
            "INTERACTIVE_ATTEMPT_TIMEOUT_SECONDS",
            env_or_default("INTERACTIVE_ATTEMPT_TIMEOUT_SECONDS", "60"),
        )?;
        let wave_pause_ms = parse_u64(
            "INTERACTIVE_WAVE_PAUSE_MS",
            env_or_default("INTERACTIVE_WAVE_PAUSE_MS", "500"),
        )?;
        let progress_interval_ms = parse_u64(
            "INTERACTIVE_PROGRESS_INTERVAL_MS",
            env_or_default("INTERACTIVE_PROGRESS_INTERVAL_MS", "2000"),
        )?;
        let progress_ttl_seconds = parse_u64(
            "INTERACTIVE_PROGRESS_TTL_SECONDS",
            env_or_default("INTERACTIVE_PROGRESS_TTL_SECONDS", "86400"),
        )?;
        let max_items =
            parse_usize("INTERACTIVE_MAX_ITEMS", env_or_default("INTERACTIVE_MAX_ITEMS", "500"))?;

        let scheduler_enabled = env_optional("SCHEDULER_ENABLED")
            .map(|value| parse_bool(&value))
            .unwrap_or(true);
        let scheduler_interval = parse_u64(
            "SCHEDULER_INTERVAL_SECONDS",
            env_or_default("SCHEDULER_INTERVAL_SECONDS", "300"),
        )?;

        let log_level = env_or_default("SCRIPTORIUM_LOG_LEVEL", "info");
        let json =
            env_optional("SCRIPTORIUM_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { operator_secret },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections: db_max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
            },
            provider: ProviderSettings {
                api_key: provider_api_key,
                base_url: provider_base_url,
                model: provider_model,
                request_timeout_seconds: provider_timeout,
                retention_hours,
            },
            inference: InferenceSettings {
                api_key: inference_api_key,
                base_url: inference_base_url,
                model: inference_model,
                request_timeout_seconds: inference_timeout,
                max_output_tokens: inference_max_output_tokens,
            },
            batch: BatchSettings { batch_size, max_active_jobs, max_new_jobs, stages },
            interactive: InteractiveSettings {
                concurrency,
                max_attempts,
                base_delay_ms,
                attempt_timeout_seconds,
                wave_pause_ms,
                progress_interval_ms,
                progress_ttl_seconds,
                max_items,
            },
            scheduler: SchedulerSettings {
                enabled: scheduler_enabled,
                interval_seconds: scheduler_interval,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn provider(&self) -> &ProviderSettings {
        &self.provider
    }

    pub(crate) fn inference(&self) -> &InferenceSettings {
        &self.inference
    }

    pub(crate) fn batch(&self) -> &BatchSettings {
        &self.batch
    }

    pub(crate) fn interactive(&self) -> &InteractiveSettings {
        &self.interactive
    }

    pub(crate) fn scheduler(&self) -> &SchedulerSettings {
        &self.scheduler
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCRIPTORIUM_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        if self.batch.stages.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "SCRIPTORIUM_BATCH_STAGES",
                value: String::from("<empty>"),
            });
        }

        if self.interactive.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "INTERACTIVE_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.interactive.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "INTERACTIVE_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.interactive.attempt_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "INTERACTIVE_ATTEMPT_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.scheduler.interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCHEDULER_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.provider.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("BATCH_PROVIDER_API_KEY"));
        }
        if self.inference.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("INFERENCE_API_KEY"));
        }
        if self.s3.access_key.is_empty() || self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }
        if self.security.operator_secret.is_none() {
            return Err(ConfigError::MissingSecret("OPERATOR_SECRET"));
        }

        Ok(())
    }
}
