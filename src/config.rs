//! Startup configuration from environment variables

use std::path::PathBuf;

/// Where session records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionBackend {
    /// In-process map; sessions are lost on restart
    #[default]
    Memory,
    /// `sessions` table in the returns database
    Sqlite,
}

impl SessionBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(SessionBackend::Memory),
            "sqlite" | "database" => Some(SessionBackend::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub session_backend: SessionBackend,
    pub return_window_days: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source. Unparseable values fall back to the
    /// default with a warning.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("RETURN_DESK_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.return-desk/returns.db"))
            },
            PathBuf::from,
        );

        let port = parse_or("RETURN_DESK_PORT", lookup("RETURN_DESK_PORT"), 8000, |v| {
            v.parse().ok()
        });

        let session_backend = parse_or(
            "RETURN_DESK_SESSION_BACKEND",
            lookup("RETURN_DESK_SESSION_BACKEND"),
            SessionBackend::default(),
            SessionBackend::parse,
        );

        let return_window_days = parse_or(
            "RETURN_DESK_RETURN_WINDOW_DAYS",
            lookup("RETURN_DESK_RETURN_WINDOW_DAYS"),
            crate::returns::policy::DEFAULT_RETURN_WINDOW_DAYS,
            |v| v.parse().ok().filter(|days: &i64| *days >= 0),
        );

        Self {
            port,
            db_path,
            session_backend,
            return_window_days,
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    let Some(raw) = raw else {
        return default;
    };
    parse(&raw).unwrap_or_else(|| {
        tracing::warn!(variable = key, value = %raw, "Ignoring invalid setting");
        default
    })
}
