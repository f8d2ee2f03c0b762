//! Ingestion configuration
//!
//! Everything is read from environment variables; the binary loads `.env`
//! before calling [`IngestConfig::from_env`]. All problems are collected and
//! reported together so an operator can fix a deployment in one pass.
//!
//! Database parts are only required once a connection is built
//! ([`DatabaseConfig::connect_options`]), so runs against the in-memory store
//! need no database settings.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `MTA_LOG_DIR` (or `LOG_DIR`) | directory holding the MTA logs | required |
//! | `MTA_METADATA_FILE` | metadata log file name | `full_subjects.log` |
//! | `MTA_EVENT_FILES` | comma-separated event log file names | `mail.log` |
//! | `TZ` | IANA time zone for the daily schedule | required |
//! | `SCHEDULE_TYPE` | `minutes` or `time` | required |
//! | `SCHEDULE_INTERVAL_MINUTES` | positive integer, for `minutes` | |
//! | `SCHEDULE_TIME` | `HH:MM`, for `time` | |
//! | `SCHEDULER_POLL_SECS` | seconds between due checks | `60` |
//! | `DATABASE_URL` | `mysql://...`; overrides the `DB_*` set | |
//! | `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` | connection parts, required without `DATABASE_URL` | port `3306` |
//! | `DATABASE_MAX_CONNECTIONS` | pool size | `5` |
//! | `DATABASE_CONNECT_TIMEOUT` | seconds | `10` |

use chrono::NaiveTime;
use chrono_tz::Tz;
use mtalog_common::MtalogError;
use sqlx::mysql::MySqlConnectOptions;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::IngestResult;
use crate::scheduler::Cadence;

/// Default metadata log file name
pub const DEFAULT_METADATA_FILE: &str = "full_subjects.log";

/// Default event log file name
pub const DEFAULT_EVENT_FILE: &str = "mail.log";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_DB_PORT: u16 = 3306;

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Which cadence drives the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleConfig {
    /// Every `minutes` minutes
    Interval { minutes: u32 },
    /// Once a day at `at`, local to the configured time zone
    Daily { at: NaiveTime },
}

impl ScheduleConfig {
    pub fn cadence(&self) -> Cadence {
        match *self {
            ScheduleConfig::Interval { minutes } => {
                Cadence::Interval(Duration::from_secs(u64::from(minutes) * 60))
            },
            ScheduleConfig::Daily { at } => Cadence::DailyAt(at),
        }
    }
}

/// MySQL connection settings
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual parts
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Connection options from `DATABASE_URL`, or from the `DB_*` parts.
    ///
    /// Fails naming every missing part when no URL is set.
    pub fn connect_options(&self) -> IngestResult<MySqlConnectOptions> {
        match &self.url {
            Some(url) => url.parse::<MySqlConnectOptions>().map_err(|e| {
                MtalogError::Config(format!("Invalid DATABASE_URL: {}", e)).into()
            }),
            None => {
                let missing = self.missing_parts();
                if !missing.is_empty() {
                    return Err(MtalogError::Config(format!(
                        "DATABASE_URL is not set and neither is {}",
                        missing.join(", ")
                    ))
                    .into());
                }
                Ok(MySqlConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.name))
            },
        }
    }

    fn missing_parts(&self) -> Vec<&'static str> {
        [
            ("DB_HOST", &self.host),
            ("DB_USER", &self.user),
            ("DB_PASSWORD", &self.password),
            ("DB_NAME", &self.name),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub log_dir: PathBuf,
    pub metadata_file: String,
    pub event_files: Vec<String>,
    pub timezone: Tz,
    pub schedule: ScheduleConfig,
    pub poll_interval_secs: u64,
    pub database: DatabaseConfig,
}

impl IngestConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut problems = Vec::new();

        let log_dir = get("MTA_LOG_DIR").or_else(|| get("LOG_DIR"));
        if log_dir.is_none() {
            problems.push("MTA_LOG_DIR (or LOG_DIR) is not set".to_string());
        }

        let metadata_file = get("MTA_METADATA_FILE").unwrap_or_else(|| DEFAULT_METADATA_FILE.to_string());

        let event_files: Vec<String> = get("MTA_EVENT_FILES")
            .map(|files| {
                files
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_EVENT_FILE.to_string()]);
        if event_files.is_empty() {
            problems.push("MTA_EVENT_FILES lists no files".to_string());
        }

        let timezone = match get("TZ") {
            None => {
                problems.push("TZ is not set".to_string());
                None
            },
            Some(name) => match name.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    problems.push(format!("Invalid time zone: {}", name));
                    None
                },
            },
        };

        let schedule = match parse_schedule(&get) {
            Ok(schedule) => Some(schedule),
            Err(problem) => {
                problems.push(problem);
                None
            },
        };

        let poll_interval_secs = match get("SCHEDULER_POLL_SECS") {
            None => DEFAULT_POLL_INTERVAL_SECS,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    problems.push(format!("SCHEDULER_POLL_SECS must be a positive integer: {}", raw));
                    DEFAULT_POLL_INTERVAL_SECS
                },
            },
        };

        let database = parse_database(&get, &mut problems);

        match (log_dir, timezone, schedule) {
            (Some(log_dir), Some(timezone), Some(schedule)) if problems.is_empty() => Ok(Self {
                log_dir: PathBuf::from(log_dir),
                metadata_file,
                event_files,
                timezone,
                schedule,
                poll_interval_secs,
                database,
            }),
            _ => Err(MtalogError::Config(problems.join("; ")).into()),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.log_dir.join(&self.metadata_file)
    }

    pub fn event_paths(&self) -> Vec<PathBuf> {
        self.event_files.iter().map(|f| self.log_dir.join(f)).collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn parse_schedule<G>(get: &G) -> Result<ScheduleConfig, String>
where
    G: Fn(&str) -> Option<String>,
{
    match get("SCHEDULE_TYPE").as_deref() {
        Some("minutes") => {
            let raw = get("SCHEDULE_INTERVAL_MINUTES").ok_or_else(|| {
                "SCHEDULE_INTERVAL_MINUTES is required when SCHEDULE_TYPE=minutes".to_string()
            })?;
            match raw.parse::<u32>() {
                Ok(minutes) if minutes > 0 => Ok(ScheduleConfig::Interval { minutes }),
                _ => Err(format!("SCHEDULE_INTERVAL_MINUTES must be a positive integer: {}", raw)),
            }
        },
        Some("time") => {
            let raw = get("SCHEDULE_TIME")
                .ok_or_else(|| "SCHEDULE_TIME is required when SCHEDULE_TYPE=time".to_string())?;
            parse_hh_mm(&raw)
                .map(|at| ScheduleConfig::Daily { at })
                .ok_or_else(|| format!("SCHEDULE_TIME must be HH:MM: {}", raw))
        },
        Some(other) => Err(format!("Invalid SCHEDULE_TYPE: {} (expected 'minutes' or 'time')", other)),
        None => Err("SCHEDULE_TYPE is not set".to_string()),
    }
}

fn parse_database<G>(get: &G, problems: &mut Vec<String>) -> DatabaseConfig
where
    G: Fn(&str) -> Option<String>,
{
    let url = get("DATABASE_URL");

    let port = match get("DB_PORT") {
        None => DEFAULT_DB_PORT,
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port > 0 => port,
            _ => {
                problems.push(format!("DB_PORT must be between 1 and 65535: {}", raw));
                DEFAULT_DB_PORT
            },
        },
    };

    let part = |key: &str| get(key).unwrap_or_default();

    let max_connections = get("DATABASE_MAX_CONNECTIONS")
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS);

    let connect_timeout_secs = get("DATABASE_CONNECT_TIMEOUT")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS);

    DatabaseConfig {
        url,
        host: part("DB_HOST"),
        port,
        user: part("DB_USER"),
        password: part("DB_PASSWORD"),
        name: part("DB_NAME"),
        max_connections,
        connect_timeout_secs,
    }
}

/// Strict `HH:MM`, 00:00 through 23:59
pub fn parse_hh_mm(raw: &str) -> Option<NaiveTime> {
    let (hours, minutes) = raw.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}
