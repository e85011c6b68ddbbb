//! Runtime settings, read from the environment after `.env` is loaded.
//!
//! - `BIND_ADDR`      listen address (default `0.0.0.0:8000`)
//! - `DATABASE_URL`   SQLite url for playback state; unset keeps it in memory
//! - `IMPLICIT_ROOMS` `true` lets a websocket materialise an unknown room
//! - `LOG_LEVEL`      fallback filter when `RUST_LOG` is unset

use std::net::SocketAddr;

use crate::error::{AppErr, AppResult};

const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind:           SocketAddr,
    pub database_url:   Option<String>,
    pub implicit_rooms: bool,
    pub log_level:      String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind:           ([0, 0, 0, 0], 8000).into(),
            database_url:   None,
            implicit_rooms: false,
            log_level:      "info".into(),
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let bind = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND.into())
            .parse()
            .map_err(|e| AppErr::Config(format!("BIND_ADDR: {e}")))?;

        let implicit_rooms = match get("IMPLICIT_ROOMS").as_deref().map(str::trim) {
            None | Some("") => false,
            Some(v) => v.parse().map_err(|_| AppErr::Config(format!("IMPLICIT_ROOMS: `{v}` is not a bool")))?,
        };

        Ok(Self {
            bind,
            database_url: get("DATABASE_URL").filter(|u| !u.trim().is_empty()),
            implicit_rooms,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert!(cfg.database_url.is_none());
        assert!(!cfg.implicit_rooms);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "sqlite://rooms.db"),
            ("IMPLICIT_ROOMS", "true"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite://rooms.db"));
        assert!(cfg.implicit_rooms);
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])),
            Err(AppErr::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("IMPLICIT_ROOMS", "maybe")])),
            Err(AppErr::Config(_))
        ));
    }
}
