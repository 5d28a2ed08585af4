//! Environment-driven configuration, resolved once at startup.

use std::path::PathBuf;

/// Transport used to reach the PULSAR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulsarMode {
    Subprocess,
    Fifo,
}

impl PulsarMode {
    fn from_env_str(s: &str) -> Option<Self> {
        match s {
            "subprocess" => Some(Self::Subprocess),
            "fifo" => Some(Self::Fifo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub osc_port: u16,
    pub pulsar_mode: PulsarMode,
    pub pulsar_fifo_path: PathBuf,
    pub pulsar_bin: PathBuf,
    pub runtime_dir: PathBuf,
    pub verbose: bool,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "failed to parse env var, using default");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    /// Read configuration from the environment, falling back to documented
    /// defaults for anything missing or malformed. Never fails.
    pub fn from_env() -> Self {
        let runtime_dir: PathBuf = std::env::var("QUASAR_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.quasar-runtime"));

        let pulsar_mode = std::env::var("QUASAR_PULSAR_MODE")
            .ok()
            .and_then(|s| PulsarMode::from_env_str(&s))
            .unwrap_or(PulsarMode::Subprocess);

        let pulsar_fifo_path = std::env::var("QUASAR_PULSAR_FIFO_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| runtime_dir.join("pulsar.fifo"));

        let pulsar_bin = std::env::var("QUASAR_PULSAR_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./pulsar/engine"));

        Self {
            http_port: env_parsed("QUASAR_HTTP_PORT", 1985),
            osc_port: env_parsed("QUASAR_OSC_PORT", 1986),
            pulsar_mode,
            pulsar_fifo_path,
            pulsar_bin,
            runtime_dir,
            verbose: std::env::var("QUASAR_VERBOSE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Directory under which the supervisor writes `processes/<name>/...`.
    pub fn processes_dir(&self) -> PathBuf {
        self.runtime_dir.join("processes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        std::env::remove_var("QUASAR_HTTP_PORT");
        std::env::remove_var("QUASAR_PULSAR_MODE");
        let cfg = Config::from_env();
        assert_eq!(cfg.http_port, 1985);
        assert_eq!(cfg.pulsar_mode, PulsarMode::Subprocess);
    }

    #[test]
    fn malformed_port_falls_back_to_default() {
        std::env::set_var("QUASAR_HTTP_PORT", "not-a-port");
        let cfg = Config::from_env();
        assert_eq!(cfg.http_port, 1985);
        std::env::remove_var("QUASAR_HTTP_PORT");
    }
}
