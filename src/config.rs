use std::env;

use serde::Deserialize;

use crate::services::assignment::TieBreak;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
    pub reminders: ReminderConfig,
    pub assignment: AssignmentConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub directory: DirectoryConfig,
    pub video: VideoConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Shared secret used to verify payment webhook signatures.
    /// The webhook endpoint refuses every request while this is unset.
    pub webhook_secret: Option<String>,
    /// Maximum accepted age (seconds) of a signed webhook timestamp.
    pub webhook_tolerance_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// Operator key required by the reminder trigger and the operator API.
    pub api_key: Option<String>,
    /// Lead-time offsets in minutes before a booking's start.
    pub lead_times_minutes: Vec<i64>,
    /// Whether the in-process reminder worker runs next to the HTTP trigger.
    pub worker_enabled: bool,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentConfig {
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub daily_api_url: String,
    pub daily_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the payment webhook
    pub webhook_per_second: u32,
    /// Burst size for the payment webhook
    pub webhook_burst: u32,
}

/// Longest accepted reminder lead time: one year.
pub const MAX_LEAD_TIME_MINUTES: i64 = 366 * 24 * 60;

/// Parse a comma separated list of minute offsets ("1440,120").
/// Blank entries are ignored. Anything that is not an integer in
/// `1..=MAX_LEAD_TIME_MINUTES` is an error.
pub fn parse_lead_times(raw: &str) -> Result<Vec<i64>, ConfigError> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let minutes: i64 = part
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REMINDER_LEAD_TIMES_MINUTES".to_string()))?;
        if minutes <= 0 || minutes > MAX_LEAD_TIME_MINUTES {
            return Err(ConfigError::InvalidValue(
                "REMINDER_LEAD_TIMES_MINUTES".to_string(),
            ));
        }
        if !out.contains(&minutes) {
            out.push(minutes);
        }
    }
    Ok(out)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let lead_times_minutes = match env::var("REMINDER_LEAD_TIMES_MINUTES") {
            Ok(raw) => parse_lead_times(&raw)?,
            Err(_) => defaults.reminders.lead_times_minutes.clone(),
        };

        let tie_break = match env::var("ASSIGNMENT_TIE_BREAK") {
            Ok(raw) => raw
                .parse::<TieBreak>()
                .map_err(|_| ConfigError::InvalidValue("ASSIGNMENT_TIE_BREAK".to_string()))?,
            Err(_) => defaults.assignment.tie_break,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/bookings.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            payments: PaymentsConfig {
                webhook_secret: env_opt("PAYMENT_WEBHOOK_SECRET"),
                webhook_tolerance_seconds: env::var("PAYMENT_WEBHOOK_TOLERANCE_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            },
            reminders: ReminderConfig {
                api_key: env_opt("CRON_API_KEY"),
                lead_times_minutes,
                worker_enabled: env_flag("REMINDER_WORKER_ENABLED", false),
                poll_interval_seconds: env::var("REMINDER_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300u64),
            },
            assignment: AssignmentConfig { tie_break },
            email: EmailConfig {
                api_url: env_opt("EMAIL_API_URL"),
                api_key: env_opt("EMAIL_API_KEY"),
                from: env::var("EMAIL_FROM").unwrap_or(defaults.email.from),
                reply_to: env_opt("EMAIL_REPLY_TO"),
            },
            sms: SmsConfig {
                api_url: env_opt("SMS_API_URL"),
                api_key: env_opt("SMS_API_KEY"),
            },
            directory: DirectoryConfig {
                api_url: env_opt("DIRECTORY_API_URL"),
                api_key: env_opt("DIRECTORY_API_KEY"),
            },
            video: VideoConfig {
                daily_api_url: env::var("DAILY_API_URL").unwrap_or(defaults.video.daily_api_url),
                daily_api_key: env_opt("DAILY_API_KEY"),
            },
            rate_limit: RateLimitConfig {
                webhook_per_second: env::var("RATE_LIMIT_WEBHOOKS_PER_SECOND")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                webhook_burst: env::var("RATE_LIMIT_WEBHOOKS_BURST")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/bookings.db".to_string(),
                max_connections: 5,
            },
            payments: PaymentsConfig {
                webhook_secret: None,
                webhook_tolerance_seconds: 300,
            },
            reminders: ReminderConfig {
                api_key: None,
                lead_times_minutes: vec![24 * 60, 120],
                worker_enabled: false,
                poll_interval_seconds: 300,
            },
            assignment: AssignmentConfig {
                tie_break: TieBreak::FirstSeen,
            },
            email: EmailConfig {
                api_url: None,
                api_key: None,
                from: "notifications@localhost".to_string(),
                reply_to: None,
            },
            sms: SmsConfig {
                api_url: None,
                api_key: None,
            },
            directory: DirectoryConfig {
                api_url: None,
                api_key: None,
            },
            video: VideoConfig {
                daily_api_url: "https://api.daily.co/v1".to_string(),
                daily_api_key: None,
            },
            rate_limit: RateLimitConfig {
                webhook_per_second: 10,
                webhook_burst: 50,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lead_times() {
        assert_eq!(parse_lead_times("1440,120").unwrap(), vec![1440, 120]);
        assert_eq!(parse_lead_times(" 60 , ,30").unwrap(), vec![60, 30]);
        // duplicates collapse, first position wins
        assert_eq!(parse_lead_times("120,60,120").unwrap(), vec![120, 60]);
    }

    #[test]
    fn rejects_bad_lead_times() {
        assert!(parse_lead_times("abc").is_err());
        assert!(parse_lead_times("0").is_err());
        assert!(parse_lead_times("-5").is_err());
        assert!(matches!(
            parse_lead_times("1440,9999999999999999"),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(parse_lead_times(&(MAX_LEAD_TIME_MINUTES + 1).to_string()).is_err());
        assert_eq!(
            parse_lead_times(&MAX_LEAD_TIME_MINUTES.to_string()).unwrap(),
            vec![MAX_LEAD_TIME_MINUTES]
        );
    }

    #[test]
    fn defaults_match_reference_offsets() {
        let cfg = Config::default();
        assert_eq!(cfg.reminders.lead_times_minutes, vec![1440, 120]);
        assert!(cfg.payments.webhook_secret.is_none());
    }
}
