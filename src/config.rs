//! Runtime configuration, read from the environment (after `.env` is loaded).

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const CHAT_CHANNEL: &str = "chat_messages";
pub const CHAT_HISTORY_KEY: &str = "chat_history";
pub const HISTORY_CAP: usize = 50;
pub const BODY_LIMIT: usize = 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("CHAT_HISTORY_CAP must be at least 1")]
    ZeroCap,
}

/// Which service backs the history store and the fan-out bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Redis,
    /// Single process only, nothing is shared with other instances.
    Memory,
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Backend::Redis),
            "memory" | "mem" => Ok(Backend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind:        SocketAddr,
    pub backend:     Backend,
    pub redis_url:   String,
    pub channel:     String,
    pub history_key: String,
    pub history_cap: usize,
    pub static_dir:  PathBuf,
    pub body_limit:  usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind:        SocketAddr::from(([0, 0, 0, 0], 3000)),
            backend:     Backend::Redis,
            redis_url:   DEFAULT_REDIS_URL.into(),
            channel:     CHAT_CHANNEL.into(),
            history_key: CHAT_HISTORY_KEY.into(),
            history_cap: HISTORY_CAP,
            static_dir:  PathBuf::from("static"),
            body_limit:  BODY_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = get("BIND_ADDR") { cfg.bind = parse("BIND_ADDR", v)?; }
        if let Some(v) = get("CHAT_BACKEND") { cfg.backend = parse("CHAT_BACKEND", v)?; }
        if let Some(v) = get("REDIS_URL") { cfg.redis_url = v; }
        if let Some(v) = get("CHAT_CHANNEL") { cfg.channel = v; }
        if let Some(v) = get("CHAT_HISTORY_KEY") { cfg.history_key = v; }
        if let Some(v) = get("CHAT_HISTORY_CAP") { cfg.history_cap = parse("CHAT_HISTORY_CAP", v)?; }
        if let Some(v) = get("STATIC_DIR") { cfg.static_dir = PathBuf::from(v); }
        if let Some(v) = get("BODY_LIMIT") { cfg.body_limit = parse("BODY_LIMIT", v)?; }

        if cfg.history_cap == 0 {
            return Err(ConfigError::ZeroCap);
        }
        Ok(cfg)
    }
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind.port(), 3000);
        assert_eq!(cfg.backend, Backend::Redis);
        assert_eq!(cfg.channel, "chat_messages");
        assert_eq!(cfg.history_key, "chat_history");
        assert_eq!(cfg.history_cap, 50);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("CHAT_BACKEND", "Memory"),
            ("CHAT_HISTORY_CAP", "2"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind.port(), 8080);
        assert_eq!(cfg.backend, Backend::Memory);
        assert_eq!(cfg.history_cap, 2);
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_lookup(lookup(&[("CHAT_BACKEND", "postgres")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CHAT_BACKEND", .. }));

        let err = Config::from_lookup(lookup(&[("CHAT_HISTORY_CAP", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCap));
    }
}
