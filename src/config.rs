use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "Lavasrc";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mcdn: McdnConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// MCDN 접속 정보. 리졸버 생성 시 한 번 정해지고 이후 바뀌지 않는다.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct McdnConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub user_agent: Option<String>,
}

impl McdnConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            user_agent: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    /// 설정된 User-Agent, 없으면 기본값 `Lavasrc`.
    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// HTTP 클라이언트 공통 설정 (타임아웃, 프록시).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    pub proxy: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            proxy: None,
        }
    }
}

fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("mcdn")
        .join("config.toml")
}

/// 설정 파일을 읽고 `MCDN_*` 환경 변수로 덮어쓴다.
pub fn load_config() -> Config {
    let mut config = load_config_file();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// 환경 변수를 적용하지 않은 설정 파일 내용.
/// 파일이 없거나 읽을 수 없으면 기본값을 사용한다.
pub fn load_config_file() -> Config {
    read_config(&config_path())
}

fn read_config(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config {}: {}", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(base_url) = var("MCDN_BASE_URL") {
        config.mcdn.base_url = base_url;
    }
    if let Some(api_key) = var("MCDN_API_KEY") {
        config.mcdn.api_key = api_key;
    }
    if let Some(user_agent) = var("MCDN_USER_AGENT") {
        config.mcdn.user_agent = Some(user_agent);
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}
