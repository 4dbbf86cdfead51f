//! Configuration file management for mhmng.
//!
//! Provides a TOML-based config file at `~/.config/mhmng/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use mhmng_core::plan::parse_utc_offset;
use mhmng_db::config::DbConfig;

pub const BIND_ENV: &str = "MHMNG_BIND";
pub const PORT_ENV: &str = "MHMNG_PORT";
pub const UTC_OFFSET_ENV: &str = "MHMNG_UTC_OFFSET";

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_UTC_OFFSET: &str = "+00:00";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Hub time zone as a fixed UTC offset, e.g. `+09:00`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mhmng config directory: `$XDG_CONFIG_HOME/mhmng` or
/// `~/.config/mhmng`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mhmng");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mhmng")
}

/// Return the path to the mhmng config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file holds database credentials, so it is made owner-only on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MhmngConfig {
    pub db_config: DbConfig,
    pub bind: String,
    pub port: u16,
    pub time_zone: FixedOffset,
}

impl MhmngConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `MHMNG_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Bind: `cli_bind` > `MHMNG_BIND` > `server.bind` > `0.0.0.0`
    /// - Port: `cli_port` > `MHMNG_PORT` > `server.port` > `80`
    /// - Hub time zone: `MHMNG_UTC_OFFSET` > `server.utc_offset` > `+00:00`
    pub fn resolve(
        cli_db_url: Option<&str>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
    ) -> Result<Self> {
        let file_config = load_config().ok();
        let server = file_config.as_ref().map(|cfg| &cfg.server);

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let bind = if let Some(bind) = cli_bind {
            bind.to_string()
        } else if let Ok(bind) = std::env::var(BIND_ENV) {
            bind
        } else {
            server
                .and_then(|s| s.bind.clone())
                .unwrap_or_else(|| DEFAULT_BIND.to_string())
        };

        let port = if let Some(port) = cli_port {
            port
        } else if let Ok(raw) = std::env::var(PORT_ENV) {
            raw.trim()
                .parse()
                .with_context(|| format!("{PORT_ENV} is not a valid port: {raw:?}"))?
        } else {
            server.and_then(|s| s.port).unwrap_or(DEFAULT_PORT)
        };

        let offset = if let Ok(raw) = std::env::var(UTC_OFFSET_ENV) {
            raw
        } else {
            server
                .and_then(|s| s.utc_offset.clone())
                .unwrap_or_else(|| DEFAULT_UTC_OFFSET.to_string())
        };
        let time_zone = parse_utc_offset(&offset)
            .with_context(|| format!("invalid UTC offset {offset:?} (expected e.g. +09:00)"))?;

        Ok(Self {
            db_config: DbConfig::new(db_url),
            bind,
            port,
            time_zone,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Point the config dir at an empty temp dir and clear the mhmng env vars.
    /// The returned dir must outlive the test body.
    fn isolated_env() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        for var in [DbConfig::ENV_VAR, BIND_ENV, PORT_ENV, UTC_OFFSET_ENV] {
            unsafe { std::env::remove_var(var) };
        }
        tmp
    }

    fn restore_env() {
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
        for var in [DbConfig::ENV_VAR, BIND_ENV, PORT_ENV, UTC_OFFSET_ENV] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn config_file_roundtrip() {
        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            server: ServerSection {
                bind: Some("127.0.0.1".to_string()),
                port: Some(8080),
                utc_offset: Some("+09:00".to_string()),
            },
        };
        let contents = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.server.port, Some(8080));
        assert_eq!(loaded.server.utc_offset.as_deref(), Some("+09:00"));
    }

    #[test]
    fn server_section_is_optional() {
        let loaded: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://h/db\"\n").unwrap();
        assert!(loaded.server.bind.is_none());
        assert!(loaded.server.port.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let _tmp = isolated_env();

        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://h/db".to_string(),
            },
            server: ServerSection::default(),
        };
        let result = save_config(&cfg);
        let meta = std::fs::metadata(config_path());
        let loaded = load_config();
        restore_env();

        result.unwrap();
        assert_eq!(meta.unwrap().permissions().mode() & 0o777, 0o600);
        assert_eq!(loaded.unwrap().database.url, "postgresql://h/db");
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        let _tmp = isolated_env();

        let config = MhmngConfig::resolve(None, None, None);
        restore_env();

        let config = config.unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.time_zone.local_minus_utc(), 0);
    }

    #[test]
    fn resolve_cli_overrides_env_overrides_file() {
        let _lock = lock_env();
        let _tmp = isolated_env();

        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://file:5432/filedb".to_string(),
            },
            server: ServerSection {
                bind: Some("10.0.0.1".to_string()),
                port: Some(7000),
                utc_offset: Some("+09:00".to_string()),
            },
        };
        save_config(&cfg).unwrap();

        let from_file = MhmngConfig::resolve(None, None, None);

        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(PORT_ENV, "7001") };
        unsafe { std::env::set_var(UTC_OFFSET_ENV, "-05:00") };
        let from_env = MhmngConfig::resolve(None, None, None);

        let from_cli =
            MhmngConfig::resolve(Some("postgresql://cli:5432/clidb"), Some("127.0.0.1"), Some(7002));

        restore_env();

        let from_file = from_file.unwrap();
        assert_eq!(from_file.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(from_file.bind, "10.0.0.1");
        assert_eq!(from_file.port, 7000);
        assert_eq!(from_file.time_zone.local_minus_utc(), 9 * 3600);

        let from_env = from_env.unwrap();
        assert_eq!(from_env.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(from_env.bind, "10.0.0.1");
        assert_eq!(from_env.port, 7001);
        assert_eq!(from_env.time_zone.local_minus_utc(), -5 * 3600);

        let from_cli = from_cli.unwrap();
        assert_eq!(from_cli.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(from_cli.bind, "127.0.0.1");
        assert_eq!(from_cli.port, 7002);
    }

    #[test]
    fn resolve_rejects_bad_env_values() {
        let _lock = lock_env();
        let _tmp = isolated_env();

        unsafe { std::env::set_var(PORT_ENV, "eighty") };
        let bad_port = MhmngConfig::resolve(None, None, None);
        unsafe { std::env::remove_var(PORT_ENV) };

        unsafe { std::env::set_var(UTC_OFFSET_ENV, "JST") };
        let bad_offset = MhmngConfig::resolve(None, None, None);

        restore_env();

        assert!(bad_port.is_err());
        let msg = format!("{:#}", bad_offset.unwrap_err());
        assert!(msg.contains("invalid UTC offset"), "unexpected error: {msg}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("mhmng/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
