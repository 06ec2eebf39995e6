use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::consent::service::{LinkSettings, MAX_LINK_EXPIRY_HOURS, MIN_LINK_EXPIRY_HOURS};

const DEFAULT_LINK_EXPIRY_HOURS: u32 = 48;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub links: LinkConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let public_base_url = env::var("APP_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim()
            .trim_end_matches('/')
            .to_string();

        let default_expiry_hours = match env::var("APP_LINK_EXPIRY_HOURS") {
            Ok(raw) => parse_expiry_hours(&raw)?,
            Err(_) => DEFAULT_LINK_EXPIRY_HOURS,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            links: LinkConfig {
                public_base_url,
                default_expiry_hours,
            },
        })
    }
}

fn parse_expiry_hours(raw: &str) -> Result<u32, ConfigError> {
    let hours = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidLinkExpiry)?;
    if (MIN_LINK_EXPIRY_HOURS..=MAX_LINK_EXPIRY_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(ConfigError::InvalidLinkExpiry)
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Public link construction and default lifetime for issued consent links.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub public_base_url: String,
    pub default_expiry_hours: u32,
}

impl LinkConfig {
    pub fn settings(&self) -> LinkSettings {
        LinkSettings {
            base_url: self.public_base_url.clone(),
            default_expiry_hours: self.default_expiry_hours,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLinkExpiry,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLinkExpiry => write!(
                f,
                "APP_LINK_EXPIRY_HOURS must be between {MIN_LINK_EXPIRY_HOURS} and {MAX_LINK_EXPIRY_HOURS}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidLinkExpiry => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
