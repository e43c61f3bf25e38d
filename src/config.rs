use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::cli::{BackendArgs, Cli};
use crate::ledger;

const LEDGER_FILE: &str = "captures.db";
const SPOOL_DIR: &str = "captures";

/// Local paths. Enough for commands that never touch the network.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_directory: PathBuf,
}

impl Paths {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            data_directory: expand_tilde(&cli.data_directory),
        }
    }

    pub fn ledger(&self) -> PathBuf {
        self.data_directory.join(LEDGER_FILE)
    }

    pub fn spool(&self) -> PathBuf {
        self.data_directory.join(SPOOL_DIR)
    }
}

/// Validated configuration for networked commands.
pub struct Config {
    pub backend_url: Url,
    pub api_key: String,
    pub upload_url: Url,
    pub upload_preset: String,
    pub paths: Paths,
    pub timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("api_key", &"<redacted>")
            .field("upload_url", &self.upload_url)
            .field("upload_preset", &self.upload_preset)
            .field("paths", &self.paths)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn required(value: &Option<String>, flag: &str, env: &str) -> anyhow::Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => anyhow::bail!("{flag} is required (or set {env})"),
    }
}

fn parse_url(value: &str, flag: &str) -> anyhow::Result<Url> {
    let url = Url::parse(value).map_err(|e| anyhow::anyhow!("Invalid {flag} '{value}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{flag} must be an http(s) URL, got '{value}'");
    }
    Ok(url)
}

impl Config {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let BackendArgs {
            backend_url,
            api_key,
            upload_url,
            upload_preset,
        } = &cli.backend;

        let backend_url = parse_url(
            &required(backend_url, "--backend-url", "EVENTCAM_BACKEND_URL")?,
            "--backend-url",
        )?;
        let upload_url = parse_url(
            &required(upload_url, "--upload-url", "EVENTCAM_UPLOAD_URL")?,
            "--upload-url",
        )?;
        if cli.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        Ok(Self {
            backend_url,
            api_key: required(api_key, "--api-key", "EVENTCAM_API_KEY")?,
            upload_url,
            upload_preset: required(upload_preset, "--upload-preset", "EVENTCAM_UPLOAD_PRESET")?,
            paths: Paths::from_cli(cli),
            timeout: Duration::from_secs(cli.timeout),
        })
    }
}

/// Open the ledger, creating the data directory if needed.
pub async fn open_ledger(paths: &Paths) -> anyhow::Result<ledger::SqliteLedger> {
    tokio::fs::create_dir_all(&paths.data_directory).await?;
    Ok(ledger::SqliteLedger::open(&paths.ledger()).await?)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["eventcam"];
        argv.extend_from_slice(args);
        argv.push("events");
        Cli::try_parse_from(argv).unwrap()
    }

    const FULL: &[&str] = &[
        "--backend-url",
        "https://db.example",
        "--api-key",
        "anon",
        "--upload-url",
        "https://media.example/v1_1/demo/image/upload",
        "--upload-preset",
        "party",
    ];

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Documents");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Documents"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/var/lib/eventcam"), PathBuf::from("/var/lib/eventcam"));
    }

    #[test]
    fn test_from_cli_full() {
        let mut args = FULL.to_vec();
        args.extend(["--data-directory", "/tmp/ec", "--timeout", "5"]);
        let config = Config::from_cli(&cli(&args)).unwrap();
        assert_eq!(config.backend_url.as_str(), "https://db.example/");
        assert_eq!(config.upload_preset, "party");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.paths.ledger(), PathBuf::from("/tmp/ec/captures.db"));
        assert_eq!(config.paths.spool(), PathBuf::from("/tmp/ec/captures"));
    }

    #[test]
    fn test_from_cli_missing_backend() {
        let err = Config::from_cli(&cli(&["--api-key", "anon"])).unwrap_err();
        assert!(err.to_string().contains("--backend-url"));
    }

    #[test]
    fn test_from_cli_rejects_non_http_url() {
        let mut args = FULL.to_vec();
        args[1] = "ftp://db.example";
        let err = Config::from_cli(&cli(&args)).unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn test_from_cli_zero_timeout() {
        let mut args = FULL.to_vec();
        args.extend(["--timeout", "0"]);
        assert!(Config::from_cli(&cli(&args)).is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::from_cli(&cli(FULL)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("anon"));
        assert!(debug.contains("<redacted>"));
    }
}
