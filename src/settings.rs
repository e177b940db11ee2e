use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RULES_FILE: &str = "/etc/agent/rules.yaml";
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the reconciliation rules YAML (`RULES_FILE`).
    pub rules_file: PathBuf,
    /// Directory artifacts are pulled into and applied from (`FILE_STORE_PATH`).
    pub file_store_path: PathBuf,
    /// Path to the base64-encoded PEM ECDSA public key (`COSIGN_PUBLIC_KEY`).
    pub cosign_public_key: PathBuf,
    /// Reconcile tick period (`RECONCILE_INTERVAL_SECS`, default 60).
    pub reconcile_interval: Duration,
    /// Port for the liveness/readiness HTTP surface (`HTTP_PORT`, default 8080).
    pub http_port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let rules_file = env::var("RULES_FILE")
            .unwrap_or_else(|_| DEFAULT_RULES_FILE.to_string())
            .into();

        let file_store_path = env::var("FILE_STORE_PATH")
            .context("FILE_STORE_PATH must be set to the local artifact store directory")?
            .into();

        let cosign_public_key = env::var("COSIGN_PUBLIC_KEY")
            .context("COSIGN_PUBLIC_KEY must be set to the public key file path")?
            .into();

        let reconcile_interval = match env::var("RECONCILE_INTERVAL_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("Invalid RECONCILE_INTERVAL_SECS: {raw:?}"))?;
                anyhow::ensure!(secs > 0, "RECONCILE_INTERVAL_SECS must be at least 1");
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
        };

        let http_port = match env::var("HTTP_PORT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid HTTP_PORT: {raw:?}"))?,
            Err(_) => DEFAULT_HTTP_PORT,
        };

        Ok(Self {
            rules_file,
            file_store_path,
            cosign_public_key,
            reconcile_interval,
            http_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the process-global environment is only touched from one place.
    #[test]
    fn test_from_env() {
        env::remove_var("FILE_STORE_PATH");
        env::remove_var("COSIGN_PUBLIC_KEY");
        env::remove_var("RULES_FILE");
        env::remove_var("RECONCILE_INTERVAL_SECS");
        env::remove_var("HTTP_PORT");

        // Required variables missing
        assert!(Settings::from_env().is_err());

        env::set_var("FILE_STORE_PATH", "/var/agent/store");
        env::set_var("COSIGN_PUBLIC_KEY", "/etc/agent/cosign.pub");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.rules_file, PathBuf::from(DEFAULT_RULES_FILE));
        assert_eq!(settings.file_store_path, PathBuf::from("/var/agent/store"));
        assert_eq!(settings.reconcile_interval, Duration::from_secs(60));
        assert_eq!(settings.http_port, 8080);

        env::set_var("RULES_FILE", "/tmp/rules.yaml");
        env::set_var("RECONCILE_INTERVAL_SECS", "5");
        env::set_var("HTTP_PORT", "9090");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.rules_file, PathBuf::from("/tmp/rules.yaml"));
        assert_eq!(settings.reconcile_interval, Duration::from_secs(5));
        assert_eq!(settings.http_port, 9090);

        env::set_var("RECONCILE_INTERVAL_SECS", "not-a-number");
        assert!(Settings::from_env().is_err());

        env::remove_var("FILE_STORE_PATH");
        env::remove_var("COSIGN_PUBLIC_KEY");
        env::remove_var("RULES_FILE");
        env::remove_var("RECONCILE_INTERVAL_SECS");
        env::remove_var("HTTP_PORT");
    }
}
