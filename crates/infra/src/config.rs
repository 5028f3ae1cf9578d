//! Environment configuration.
//!
//! ```bash
//! ENVIRONMENT=development          # development | test | production
//! LOG_LEVEL=info
//! LOG_FORMAT=json                  # json | compact
//! API_HOST=0.0.0.0
//! API_PORT=8080
//! TLS_ENABLE=true                  # required in production
//! TLS_CERT_PATH=/etc/tls/cert.pem
//! TLS_KEY_PATH=/etc/tls/key.pem
//! JWT_SECRET=...                   # required, 32..=512 chars
//! JWT_EXPIRATION_HOURS=24          # 1..=8760
//! STORE_BACKEND=postgres           # postgres | memory
//! DATABASE_URL=postgres://...      # or POSTGRES_HOST/PORT/USER/PASSWORD/DB
//! REDIS_URL=redis://localhost:6379 # or REDIS_HOST/REDIS_PORT
//! DB_TIMEOUT_MS=5000
//! HEALTH_TIMEOUT_MS=2000
//! REVOCATION_FAIL_CLOSED=false
//! PASSWORD_HASH_MEMORY_KIB=19456
//! PASSWORD_HASH_ITERATIONS=2
//! PASSWORD_HASH_PARALLELISM=1
//! ```
//!
//! Empty variables count as unset. Unparsable or non-positive integers fall
//! back to their defaults.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use algoshield_auth::{AuthorityConfig, PasswordHasherConfig, RevocationReadPolicy};
use algoshield_observability::LogFormat;

const JWT_SECRET_MIN_LEN: usize = 32;
const DB_PASSWORD_MIN_LEN: usize = 16;
const SECRET_MAX_LEN: usize = 512;
const MAX_JWT_EXPIRATION_HOURS: u32 = 24 * 365;

const WEAK_SECRETS: &[&str] = &[
    "change-me-in-production",
    "change-me",
    "secret",
    "password",
    "algoshield_secret",
    "default",
    "test",
    "12345678",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required and must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{var} {reason}")]
    WeakSecret { var: &'static str, reason: String },

    #[error("TLS misconfigured: {0}")]
    Tls(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Invalid {
                var: "ENVIRONMENT",
                reason: format!("'{other}' is not one of development, test, production"),
            }),
        }
    }
}

/// Where principals and revocation entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Postgres principal store and Redis side-channel.
    Postgres,
    /// Process-local maps. Dev/test only; revocations do not survive restarts.
    Memory,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub log_level: String,
    pub log_format: LogFormat,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    pub jwt_secret: SecretString,
    pub jwt_expiration_hours: u32,
    pub store_backend: StoreBackend,
    /// Present for the Postgres backend.
    pub database_url: Option<SecretString>,
    pub redis_url: String,
    pub db_timeout: Duration,
    pub health_timeout: Duration,
    pub revocation_fail_closed: bool,
    pub password_hash: PasswordHasherConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let environment = match vars.get("ENVIRONMENT") {
            Some(value) => Environment::parse(&value)?,
            None => Environment::Development,
        };
        let production = environment == Environment::Production;

        let jwt_secret = vars.get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        validate_secret_strength("JWT_SECRET", &jwt_secret, production, JWT_SECRET_MIN_LEN)?;

        let store_backend = match vars.get("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORE_BACKEND",
                    reason: format!("'{other}' is not one of postgres, memory"),
                });
            }
        };
        if production && store_backend == StoreBackend::Memory {
            return Err(ConfigError::Invalid {
                var: "STORE_BACKEND",
                reason: "the memory backend is not allowed in production".to_string(),
            });
        }

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(database_url(&vars, production)?),
            StoreBackend::Memory => None,
        };

        let redis_url = vars.get("REDIS_URL").unwrap_or_else(|| {
            format!(
                "redis://{}:{}",
                vars.get_or("REDIS_HOST", "localhost"),
                vars.positive("REDIS_PORT", 6379u16)
            )
        });

        let tls = tls_config(&vars, production)?;

        let log_format = match vars.get("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("compact") => LogFormat::Compact,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("'{other}' is not one of json, compact"),
                });
            }
        };

        let jwt_expiration_hours = vars.positive("JWT_EXPIRATION_HOURS", 24u32);
        if jwt_expiration_hours > MAX_JWT_EXPIRATION_HOURS {
            return Err(ConfigError::Invalid {
                var: "JWT_EXPIRATION_HOURS",
                reason: format!("must be at most {MAX_JWT_EXPIRATION_HOURS}"),
            });
        }

        let defaults = PasswordHasherConfig::default();
        let password_hash = PasswordHasherConfig {
            memory_kib: vars.positive("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib),
            iterations: vars.positive("PASSWORD_HASH_ITERATIONS", defaults.iterations),
            parallelism: vars.positive("PASSWORD_HASH_PARALLELISM", defaults.parallelism),
        };

        Ok(Self {
            environment,
            log_level: vars.get_or("LOG_LEVEL", "info"),
            log_format,
            host: vars.get_or("API_HOST", "0.0.0.0"),
            port: vars.positive("API_PORT", 8080u16),
            tls,
            jwt_secret: SecretString::new(jwt_secret),
            jwt_expiration_hours,
            store_backend,
            database_url,
            redis_url,
            db_timeout: Duration::from_millis(vars.positive("DB_TIMEOUT_MS", 5000u64)),
            health_timeout: Duration::from_millis(vars.positive("HEALTH_TIMEOUT_MS", 2000u64)),
            revocation_fail_closed: vars.flag("REVOCATION_FAIL_CLOSED"),
            password_hash,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }

    pub fn authority_config(&self) -> AuthorityConfig {
        AuthorityConfig {
            lifetime: chrono::Duration::hours(i64::from(self.jwt_expiration_hours)),
            read_policy: if self.revocation_fail_closed {
                RevocationReadPolicy::FailClosed
            } else {
                RevocationReadPolicy::FailOpen
            },
            hasher: self.password_hash,
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn positive<T>(&self, key: &str, default: T) -> T
    where
        T: std::str::FromStr + PartialOrd + Default,
    {
        self.get(key)
            .and_then(|v| v.trim().parse::<T>().ok())
            .filter(|v| *v > T::default())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

fn database_url<F>(vars: &Vars<F>, production: bool) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = vars.get("DATABASE_URL") {
        return Ok(SecretString::new(url));
    }

    let password = vars
        .get("POSTGRES_PASSWORD")
        .ok_or(ConfigError::Missing("POSTGRES_PASSWORD"))?;
    validate_secret_strength("POSTGRES_PASSWORD", &password, production, DB_PASSWORD_MIN_LEN)?;

    Ok(SecretString::new(format!(
        "postgres://{}:{}@{}:{}/{}?sslmode=disable",
        vars.get_or("POSTGRES_USER", "algoshield"),
        password,
        vars.get_or("POSTGRES_HOST", "localhost"),
        vars.positive("POSTGRES_PORT", 5432u16),
        vars.get_or("POSTGRES_DB", "algoshield"),
    )))
}

fn tls_config<F>(vars: &Vars<F>, production: bool) -> Result<Option<TlsConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = vars.flag("TLS_ENABLE");
    let cert = vars.get("TLS_CERT_PATH");
    let key = vars.get("TLS_KEY_PATH");

    if production && !enabled {
        return Err(ConfigError::Tls("TLS_ENABLE=true is required in production".to_string()));
    }
    if !enabled {
        return Ok(None);
    }
    match (cert, key) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig { cert_path, key_path })),
        _ => Err(ConfigError::Tls(
            "both TLS_CERT_PATH and TLS_KEY_PATH must be provided when TLS_ENABLE=true".to_string(),
        )),
    }
}

/// Length bounds always; weak values, complexity and simple patterns in production.
pub fn validate_secret_strength(
    var: &'static str,
    secret: &str,
    production: bool,
    min_len: usize,
) -> Result<(), ConfigError> {
    let len = secret.chars().count();
    if len < min_len {
        return Err(ConfigError::WeakSecret {
            var,
            reason: format!("must be at least {min_len} characters long"),
        });
    }
    if len > SECRET_MAX_LEN {
        return Err(ConfigError::WeakSecret {
            var,
            reason: format!("must be at most {SECRET_MAX_LEN} characters long"),
        });
    }
    if !production {
        return Ok(());
    }

    let lower = secret.to_lowercase();
    if WEAK_SECRETS.iter().any(|weak| lower.contains(weak)) {
        return Err(ConfigError::WeakSecret {
            var,
            reason: "contains a weak or default value which is not allowed in production".to_string(),
        });
    }

    let classes = [
        secret.chars().any(char::is_uppercase),
        secret.chars().any(char::is_lowercase),
        secret.chars().any(char::is_numeric),
        secret
            .chars()
            .any(|c| c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace())),
    ];
    if classes.iter().filter(|present| **present).count() < 3 {
        return Err(ConfigError::WeakSecret {
            var,
            reason: "must contain at least 3 of: uppercase letters, lowercase letters, digits, special characters"
                .to_string(),
        });
    }

    if has_repeated_pattern(secret) {
        return Err(ConfigError::WeakSecret {
            var,
            reason: "contains repeated or sequential runs which are not allowed in production".to_string(),
        });
    }
    Ok(())
}

/// Any 4-byte window of one repeated byte, or where each step moves by exactly one.
fn has_repeated_pattern(s: &str) -> bool {
    s.as_bytes().windows(4).any(|w| {
        let same = w.iter().all(|b| *b == w[0]);
        let sequential = w
            .windows(2)
            .all(|pair| (i16::from(pair[1]) - i16::from(pair[0])).abs() == 1);
        same || sequential
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const STRONG: &str = "Zq7!mK2#vR9@wL4$xT6%yN8^pB3&hJ5*";

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    fn dev(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let mut pairs: Vec<(&str, &str)> = vec![
            ("JWT_SECRET", "a-development-secret-of-32-chars!"),
            ("DATABASE_URL", "postgres://u:p@localhost/db"),
        ];
        pairs.extend_from_slice(extra);
        load(&pairs)
    }

    #[test]
    fn jwt_secret_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
        assert_eq!(load(&[("JWT_SECRET", "")]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn jwt_secret_length_bounds() {
        let short = load(&[("JWT_SECRET", "too-short")]).unwrap_err();
        assert!(matches!(short, ConfigError::WeakSecret { var: "JWT_SECRET", .. }));

        let long = "x".repeat(513);
        let err = load(&[("JWT_SECRET", &long)]).unwrap_err();
        assert!(matches!(err, ConfigError::WeakSecret { .. }));
    }

    #[test]
    fn defaults() {
        let cfg = dev(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.jwt_expiration_hours, 24);
        assert_eq!(cfg.store_backend, StoreBackend::Postgres);
        assert_eq!(cfg.redis_url, "redis://localhost:6379");
        assert_eq!(cfg.db_timeout, Duration::from_secs(5));
        assert_eq!(cfg.health_timeout, Duration::from_secs(2));
        assert!(!cfg.revocation_fail_closed);
        assert!(cfg.tls.is_none());
        assert_eq!(cfg.password_hash, PasswordHasherConfig::default());

        let authority = cfg.authority_config();
        assert_eq!(authority.lifetime, chrono::Duration::hours(24));
        assert_eq!(authority.read_policy, RevocationReadPolicy::FailOpen);
    }

    #[test]
    fn bad_integers_fall_back_to_defaults() {
        let cfg = dev(&[("JWT_EXPIRATION_HOURS", "abc"), ("API_PORT", "0"), ("DB_TIMEOUT_MS", "-5")]).unwrap();
        assert_eq!(cfg.jwt_expiration_hours, 24);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_timeout, Duration::from_secs(5));

        let cfg = dev(&[("JWT_EXPIRATION_HOURS", "2")]).unwrap();
        assert_eq!(cfg.authority_config().lifetime, chrono::Duration::hours(2));
    }

    #[test]
    fn fail_closed_switch() {
        let cfg = dev(&[("REVOCATION_FAIL_CLOSED", "true")]).unwrap();
        assert_eq!(cfg.authority_config().read_policy, RevocationReadPolicy::FailClosed);
    }

    #[test]
    fn database_url_from_parts_requires_password() {
        let err = load(&[("JWT_SECRET", "a-development-secret-of-32-chars!")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("POSTGRES_PASSWORD"));

        let cfg = load(&[
            ("JWT_SECRET", "a-development-secret-of-32-chars!"),
            ("POSTGRES_PASSWORD", "dev-password-16ch"),
            ("POSTGRES_HOST", "db"),
        ])
        .unwrap();
        assert_eq!(
            cfg.database_url.unwrap().expose_secret(),
            "postgres://algoshield:dev-password-16ch@db:5432/algoshield?sslmode=disable"
        );
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let cfg = load(&[
            ("JWT_SECRET", "a-development-secret-of-32-chars!"),
            ("STORE_BACKEND", "memory"),
        ])
        .unwrap();
        assert_eq!(cfg.store_backend, StoreBackend::Memory);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn tls_requires_both_paths() {
        let err = dev(&[("TLS_ENABLE", "true"), ("TLS_CERT_PATH", "/c.pem")]).unwrap_err();
        assert!(matches!(err, ConfigError::Tls(_)));

        let cfg = dev(&[("TLS_ENABLE", "true"), ("TLS_CERT_PATH", "/c.pem"), ("TLS_KEY_PATH", "/k.pem")]).unwrap();
        assert_eq!(cfg.tls.unwrap().key_path, "/k.pem");
    }

    #[test]
    fn production_rules() {
        let base = [
            ("ENVIRONMENT", "production"),
            ("DATABASE_URL", "postgres://u:p@db/algoshield"),
            ("TLS_ENABLE", "true"),
            ("TLS_CERT_PATH", "/c.pem"),
            ("TLS_KEY_PATH", "/k.pem"),
        ];
        let with_secret = |secret: &str| {
            let mut pairs: Vec<(&str, &str)> = base.to_vec();
            pairs.push(("JWT_SECRET", secret));
            load(&pairs)
        };

        let cfg = with_secret(STRONG).unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert!(!cfg.is_development());

        // weak value
        assert!(with_secret("Zq7!mK2#vR9@wL4$xT6%yN8^-password").is_err());
        // one character class
        assert!(with_secret("qwertyuiopqwertyuiopqwertyuiopqw").is_err());
        // sequential run
        assert!(with_secret("Zq7!mK2#vR9@wL4$xT6%yN8^pB3&abcd").is_err());
        // repeated run
        assert!(with_secret("Zq7!mK2#vR9@wL4$xT6%yN8^pB3&hJ5*zzzz").is_err());

        let mut no_tls = base[..2].to_vec();
        no_tls.push(("JWT_SECRET", STRONG));
        assert!(matches!(load(&no_tls).unwrap_err(), ConfigError::Tls(_)));
    }

    #[test]
    fn production_rejects_memory_backend() {
        let err = load(&[
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", STRONG),
            ("STORE_BACKEND", "memory"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "STORE_BACKEND", .. }));
    }

    #[test]
    fn secret_never_appears_in_debug() {
        let cfg = dev(&[]).unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("a-development-secret-of-32-chars!"));
    }

    #[test]
    fn jwt_expiration_hours_is_bounded() {
        let cfg = dev(&[("JWT_EXPIRATION_HOURS", "8760")]).unwrap();
        assert_eq!(cfg.authority_config().lifetime, chrono::Duration::hours(8760));

        let err = dev(&[("JWT_EXPIRATION_HOURS", "8761")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "JWT_EXPIRATION_HOURS", .. }));

        let err = dev(&[("JWT_EXPIRATION_HOURS", "4000000000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "JWT_EXPIRATION_HOURS", .. }));

        assert_eq!(dev(&[("JWT_EXPIRATION_HOURS", "0")]).unwrap().jwt_expiration_hours, 24);
        assert_eq!(dev(&[("JWT_EXPIRATION_HOURS", "soon")]).unwrap().jwt_expiration_hours, 24);
    }

    #[test]
    fn log_format_selection() {
        assert_eq!(dev(&[("LOG_FORMAT", "compact")]).unwrap().log_format, LogFormat::Compact);
        assert_eq!(dev(&[("LOG_FORMAT", "json")]).unwrap().log_format, LogFormat::Json);
        let err = dev(&[("LOG_FORMAT", "pretty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "LOG_FORMAT", .. }));
    }

    #[test]
    fn repeated_pattern_detection() {
        assert!(has_repeated_pattern("xx1111xx"));
        assert!(has_repeated_pattern("xx4321xx"));
        assert!(has_repeated_pattern("xxabcbxx"));
        assert!(!has_repeated_pattern("Zq7!mK2#"));
        assert!(!has_repeated_pattern("abc"));
    }
}
