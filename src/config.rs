//! 設定載入。
//!
//! 優先順序為 CLI > 環境變數 > 設定檔 > 預設值。設定檔為 TOML：
//!
//! ```toml
//! [certcenter]
//! client_id = "..."
//! client_secret = "..."
//! product_code = "AlwaysOnSSL.AlwaysOnSSL"
//! cert_validity_period = 365
//!
//! [dns]
//! poll_interval_secs = 30
//! max_attempts = 20
//! ```

use std::{
    env, fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{resolver::DohResolver, retry::RetryPolicy};

/// 設定相關錯誤。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("client_id or client_secret not defined (config file or CERTCENTER_CLIENT_ID / CERTCENTER_CLIENT_SECRET)")]
    MissingCredentials,
    #[error("Validity period must be between 1 and 365 days, got {0}")]
    InvalidValidity(u32),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// 經銷商 API 相關設定。
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CertCenterConfig {
    pub client_id: String,
    pub client_secret: String,
    pub product_code: String,
    pub cert_validity_period: u32,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for CertCenterConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            product_code: Config::DEFAULT_PRODUCT_CODE.to_string(),
            cert_validity_period: Config::MAX_VALIDITY_DAYS,
            api_base: "https://api.certcenter.com".to_string(),
            timeout_secs: 30,
        }
    }
}

// client_secret 不可出現在日誌中
impl fmt::Debug for CertCenterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertCenterConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("product_code", &self.product_code)
            .field("cert_validity_period", &self.cert_validity_period)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// DNS 輪詢設定。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub resolver_url: String,
    pub timeout_secs: u64,
    pub initial_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub max_attempts: usize,
    pub max_elapsed_secs: Option<u64>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolver_url: DohResolver::DEFAULT_URL.to_string(),
            timeout_secs: 10,
            initial_delay_secs: 30,
            poll_interval_secs: 30,
            max_attempts: 20,
            max_elapsed_secs: None,
        }
    }
}

/// 憑證取回（等待簽發）設定。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub poll_interval_secs: u64,
    pub max_attempts: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_attempts: 30,
        }
    }
}

/// 完整設定。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub certcenter: CertCenterConfig,
    pub dns: DnsConfig,
    pub retrieval: RetrievalConfig,
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "request_cert.toml";
    pub const DEFAULT_PRODUCT_CODE: &'static str = "AlwaysOnSSL.AlwaysOnSSL";
    pub const MAX_VALIDITY_DAYS: u32 = 365;
    const ENV_CLIENT_ID: &'static str = "CERTCENTER_CLIENT_ID";
    const ENV_CLIENT_SECRET: &'static str = "CERTCENTER_CLIENT_SECRET";

    /// 載入設定並套用環境變數。
    ///
    /// 明確指定的路徑必須存在；未指定時讀取 [`Config::DEFAULT_PATH`]，不存在則使用預設值。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(Self::DEFAULT_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    log::debug!("No config file at {}, using defaults", Self::DEFAULT_PATH);
                    Self::default()
                }
            }
        };
        config.apply_env_with(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config file {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 以環境變數覆寫憑證資訊；空字串不覆寫。
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(Self::ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.certcenter.client_id = id;
        }
        if let Some(secret) = lookup(Self::ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.certcenter.client_secret = secret;
        }
    }

    /// 檢查設定是否完整且合理，應在任何網路請求之前呼叫。
    pub fn validate(&self) -> Result<()> {
        let cc = &self.certcenter;
        if cc.client_id.trim().is_empty() || cc.client_secret.trim().is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        if cc.product_code.trim().is_empty() {
            return Err(ConfigError::Invalid("product_code is empty".into()));
        }
        check_validity(cc.cert_validity_period)?;
        if self.dns.max_attempts == 0 {
            return Err(ConfigError::Invalid("dns.max_attempts must be at least 1".into()));
        }
        if self.retrieval.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// 決定實際使用的有效天數：CLI 指定值優先，否則使用設定檔。
    ///
    /// # 錯誤
    ///
    /// 結果不在 1 到 365 之間時回傳 `ConfigError::InvalidValidity`。
    pub fn validity_period(&self, cli: Option<u32>) -> Result<u32> {
        let days = cli.unwrap_or(self.certcenter.cert_validity_period);
        check_validity(days)?;
        Ok(days)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.certcenter.timeout_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns.timeout_secs)
    }

    pub fn dns_initial_delay(&self) -> Duration {
        Duration::from_secs(self.dns.initial_delay_secs)
    }

    pub fn dns_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.dns.poll_interval_secs),
            self.dns.max_attempts,
        )
        .max_elapsed(self.dns.max_elapsed_secs.map(Duration::from_secs))
    }

    pub fn retrieval_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.retrieval.poll_interval_secs),
            self.retrieval.max_attempts,
        )
    }
}

fn check_validity(days: u32) -> Result<()> {
    if (1..=Config::MAX_VALIDITY_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValidity(days))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
        [certcenter]
        client_id = "id"
        client_secret = "secret"
        cert_validity_period = 200

        [dns]
        poll_interval_secs = 5
        max_attempts = 3
        max_elapsed_secs = 60
    "#;

    #[test]
    fn test_defaults_for_missing_keys() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.certcenter.product_code, "AlwaysOnSSL.AlwaysOnSSL");
        assert_eq!(config.certcenter.api_base, "https://api.certcenter.com");
        assert_eq!(config.dns.resolver_url, "https://dns.google/resolve");
        assert_eq!(config.retrieval.max_attempts, 30);

        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.certcenter.cert_validity_period, 365);
    }

    #[test]
    fn test_dns_policy_from_file() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let policy = config.dns_policy();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.max_elapsed, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_validity_cli_overrides_config() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.validity_period(Some(90)).unwrap(), 90);
        assert_eq!(config.validity_period(None).unwrap(), 365);

        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.validity_period(None).unwrap(), 200);
    }

    #[test]
    fn test_validity_out_of_range() {
        let config = Config::from_toml_str("").unwrap();
        assert!(matches!(
            config.validity_period(Some(0)),
            Err(ConfigError::InvalidValidity(0))
        ));
        assert!(matches!(
            config.validity_period(Some(366)),
            Err(ConfigError::InvalidValidity(366))
        ));

        let config =
            Config::from_toml_str("[certcenter]\ncert_validity_period = 400\nclient_id = \"a\"\nclient_secret = \"b\"")
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValidity(400))
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let config = Config::from_toml_str("").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials)
        ));
        assert!(Config::from_toml_str(SAMPLE).unwrap().validate().is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.apply_env_with(|key| match key {
            "CERTCENTER_CLIENT_ID" => Some("env-id".to_string()),
            "CERTCENTER_CLIENT_SECRET" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.certcenter.client_id, "env-id");
        assert_eq!(config.certcenter.client_secret, "secret");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = Config::from_toml_str(
            "[certcenter]\nclient_id = \"a\"\nclient_secret = \"b\"\n[dns]\nmax_attempts = 0",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.certcenter.client_id, "id");

        assert!(matches!(
            Config::load(Some(Path::new("/nonexistent/request_cert.toml"))),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[certcenter]\ncert_validity_period = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("\"secret\""));
    }
}
