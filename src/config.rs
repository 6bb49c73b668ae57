use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::entities::Windows;
use crate::error::{config_error, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub settings: Settings,
    pub event_buffer: usize,
}

/// Engine tunables shared by every store implementation.
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    pub lock_timeout: StdDuration,
    pub windows: Windows,
    pub max_booking_attempts: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock_timeout: StdDuration::from_millis(2000),
            windows: Windows::default(),
            max_booking_attempts: 3,
        }
    }
}

impl Config {
    #[tracing::instrument(name = "Config::from_env")]
    pub fn from_env() -> Result<Self, Error> {
        if let Err(err) = dotenv::dotenv() {
            tracing::debug!(%err, "no .env file loaded");
        }

        let store = match optional("SEATSHARE_STORE")?.as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(config_error(format!("unknown store {other}"))),
        };

        let database_url = optional("DATABASE_URL")?;
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(config_error("DATABASE_URL is required for the postgres store"));
        }

        let defaults = Settings::default();

        let settings = Settings {
            lock_timeout: StdDuration::from_millis(parsed(
                "SEATSHARE_LOCK_TIMEOUT_MS",
                defaults.lock_timeout.as_millis() as u64,
            )?),
            windows: Windows {
                otp_validity: Duration::hours(parsed("SEATSHARE_OTP_VALIDITY_HOURS", 24)?),
                start_window: Duration::minutes(parsed("SEATSHARE_START_WINDOW_MINUTES", 30)?),
                otp_max_attempts: parsed("SEATSHARE_OTP_MAX_ATTEMPTS", defaults.windows.otp_max_attempts)?,
            },
            max_booking_attempts: parsed(
                "SEATSHARE_MAX_BOOKING_ATTEMPTS",
                defaults.max_booking_attempts,
            )?,
        };

        Ok(Self {
            listen_addr: parsed("SEATSHARE_LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            store,
            database_url,
            max_connections: parsed("SEATSHARE_DB_MAX_CONNECTIONS", 5)?,
            settings,
            event_buffer: parsed("SEATSHARE_EVENT_BUFFER", 1024)?,
        })
    }
}

fn optional(key: &str) -> Result<Option<String>, Error> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match optional(key)? {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| config_error(format!("{key} has an invalid value: {raw}"))),
    }
}
