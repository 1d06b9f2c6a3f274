use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, transport::DeviceProfile, Result};

/// Typed configuration for the service.
///
/// Everything is sourced from the environment, with an optional `.env` file
/// loaded first (existing variables are never overridden).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub database_url: String,
    pub operator_user: i64,

    // Transport selection ("fake" ships in-process; an MTProto adapter plugs
    // in behind the same port).
    pub transport: String,
    pub fake_directory_file: Option<PathBuf>,

    // Verification behavior
    pub country_prefixes: Vec<String>,
    pub probe_delay_min: Duration,
    pub probe_delay_max: Duration,
    pub report_chunk_limit: usize,

    // Flow hygiene
    pub auth_idle_ttl: Duration,
    pub pending_ttl: Duration,
    pub sweep_interval: Duration,

    // Liveness endpoint
    pub health_port: u16,

    // Device identity presented to the platform on connect.
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let database_url = env_str("DATABASE_URL").and_then(non_empty).ok_or_else(|| {
            Error::Config("DATABASE_URL environment variable is required".to_string())
        })?;

        let operator_user = env_i64("OPERATOR_USER_ID").unwrap_or(0);

        let transport = env_str("TRANSPORT")
            .and_then(non_empty)
            .unwrap_or_else(|| "fake".to_string());
        let fake_directory_file = env_path("FAKE_DIRECTORY_FILE");

        let country_prefixes = parse_csv(env_str("COUNTRY_PREFIXES"))
            .unwrap_or_else(|| vec!["38".to_string(), "7".to_string()]);

        let probe_delay_min = Duration::from_millis(env_u64("PROBE_DELAY_MIN_MS").unwrap_or(1_000));
        let probe_delay_max = Duration::from_millis(env_u64("PROBE_DELAY_MAX_MS").unwrap_or(4_000));
        let report_chunk_limit = env_usize("REPORT_CHUNK_LIMIT").unwrap_or(4_000);

        let auth_idle_ttl = Duration::from_secs(env_u64("AUTH_IDLE_TTL_SECS").unwrap_or(1_800));
        let pending_ttl = Duration::from_secs(env_u64("PENDING_TTL_SECS").unwrap_or(86_400));
        let sweep_interval = Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS").unwrap_or(300));

        let health_port = env_u16("HEALTH_PORT").unwrap_or(3000);

        let device_model =
            env_str("DEVICE_MODEL").unwrap_or_else(|| "Samsung Galaxy S21".to_string());
        let system_version = env_str("SYSTEM_VERSION").unwrap_or_else(|| "Android 12".to_string());
        let app_version = env_str("APP_VERSION").unwrap_or_else(|| "8.4.1".to_string());

        Ok(Self {
            database_url,
            operator_user,
            transport,
            fake_directory_file,
            country_prefixes,
            probe_delay_min,
            probe_delay_max,
            report_chunk_limit,
            auth_idle_ttl,
            pending_ttl,
            sweep_interval,
            health_port,
            device_model,
            system_version,
            app_version,
        })
    }

    pub fn device_profile(&self) -> DeviceProfile {
        DeviceProfile {
            device_model: self.device_model.clone(),
            system_version: self.system_version.clone(),
            app_version: self.app_version.clone(),
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv(v: Option<String>) -> Option<Vec<String>> {
    let v = v?;
    let out = v
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/unused".to_string(),
        operator_user: 0,
        transport: "fake".to_string(),
        fake_directory_file: None,
        country_prefixes: vec!["38".to_string(), "7".to_string()],
        probe_delay_min: Duration::ZERO,
        probe_delay_max: Duration::ZERO,
        report_chunk_limit: 4_000,
        auth_idle_ttl: Duration::from_secs(1_800),
        pending_ttl: Duration::from_secs(86_400),
        sweep_interval: Duration::from_secs(300),
        health_port: 0,
        device_model: "Test Device".to_string(),
        system_version: "1.0".to_string(),
        app_version: "0.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_csv_trims_and_drops_empty() {
        let parsed = parse_csv(Some(" 38, 7 ,,48".to_string()));
        assert_eq!(
            parsed,
            Some(vec!["38".to_string(), "7".to_string(), "48".to_string()])
        );
        assert_eq!(parse_csv(Some("  ,".to_string())), None);
        assert_eq!(parse_csv(None), None);
    }

    #[test]
    fn non_empty_rejects_whitespace() {
        assert_eq!(non_empty("  ".to_string()), None);
        assert_eq!(non_empty("x".to_string()), Some("x".to_string()));
    }
}
