use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

// ============================================================================
// Process Configuration
// ============================================================================
//
// Everything is read from the environment (after loading an optional `.env`).
// Every variable has a default suitable for a local docker-compose stack.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub sslmode: PgSslMode,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Connection options built field by field, so credentials need no URL escaping.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(self.sslmode)
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub dlq_topic: String,
    pub topic_partitions: i32,
    pub topic_replication: i32,
}

impl KafkaConfig {
    /// Broker list in librdkafka's `bootstrap.servers` form.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    /// `None` disables the background sweep
    pub sweep_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub retry_attempts: u32,
    pub max_redeliveries: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub ingest: IngestConfig,
}

/// Load `.env` into the process environment.
///
/// Runs before logging is set up (the file may carry `RUST_LOG`), so the
/// outcome is returned for the caller to log. `Ok(None)` means no file.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    optional_env_file(dotenvy::dotenv())
}

fn optional_env_file<T>(loaded: Result<T, dotenvy::Error>) -> Result<Option<T>, dotenvy::Error> {
    match loaded {
        Ok(found) => Ok(Some(found)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl Config {
    /// Read the process environment. Call [`load_dotenv`] first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database = DatabaseConfig {
            host: env.string("DB_HOST", "localhost"),
            port: env.parse("DB_PORT", 5432)?,
            user: env.string("DB_USER", "postgres"),
            password: env.string("DB_PASSWORD", "postgres"),
            name: env.string("DB_NAME", "orders"),
            sslmode: env.parse("DB_SSLMODE", PgSslMode::Disable)?,
            max_connections: env.positive("DB_MAX_CONNECTIONS", 10)?,
        };

        let brokers = env
            .string("KAFKA_BROKERS", "127.0.0.1:9092")
            .split(',')
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        if brokers.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "KAFKA_BROKERS",
                value: String::new(),
            });
        }

        let kafka = KafkaConfig {
            brokers,
            topic: env.string("KAFKA_TOPIC", "orders"),
            group_id: env.string("KAFKA_GROUP_ID", "order-service"),
            dlq_topic: env.string("KAFKA_DLQ_TOPIC", "orders-dlq"),
            topic_partitions: env.positive("KAFKA_TOPIC_PARTITIONS", 1)?,
            topic_replication: env.positive("KAFKA_TOPIC_REPLICATION", 1)?,
        };

        let server = ServerConfig {
            host: env.string("SERVER_HOST", "0.0.0.0"),
            port: env.parse("SERVER_PORT", 8080)?,
            shutdown_timeout: Duration::from_secs(env.parse("SERVER_SHUTDOWN_TIMEOUT_SECS", 10)?),
        };

        let sweep_secs: u64 = env.parse("CACHE_SWEEP_INTERVAL_SECS", 60)?;
        let cache = CacheConfig {
            capacity: env.positive("CACHE_CAPACITY", 1000)?,
            ttl: Duration::from_secs(env.positive("CACHE_TTL_SECS", 300)?),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        };

        let ingest = IngestConfig {
            retry_attempts: env.positive("INGEST_RETRY_ATTEMPTS", 3)?,
            max_redeliveries: env.parse("INGEST_MAX_REDELIVERIES", 5)?,
        };

        Ok(Self { database, kafka, server, cache, ingest })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str, default: &str) -> String {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match (self.lookup)(name).map(|v| v.trim().to_string()) {
            None => Ok(default),
            Some(v) if v.is_empty() => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value: v }),
        }
    }

    fn positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
    {
        let value = self.parse(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::MustBePositive(name));
        }
        Ok(value)
    }
}
