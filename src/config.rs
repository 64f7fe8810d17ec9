use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryTimings;
use crate::domain::{DEFAULT_BUCKET, DEFAULT_DATABASE};
use crate::error::EtlError;

pub const DEFAULT_CONFIG_FILE: &str = "tcga-etl.json";
pub const DEFAULT_CATALOG_URL: &str =
    "https://xenabrowser.net/datapages/?hub=https://tcga.xenahubs.net:443";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub webdriver_url: Option<String>,
    #[serde(default)]
    pub headless: Option<bool>,
    #[serde(default)]
    pub object_store: ObjectStoreSection,
    #[serde(default)]
    pub document_store: DocumentStoreSection,
    #[serde(default)]
    pub clinical_table: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ObjectStoreSection {
    #[serde(default)]
    pub root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub bucket: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DocumentStoreSection {
    #[serde(default)]
    pub root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default)]
    pub bind: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimeoutSection {
    #[serde(default)]
    pub catalog_settle_secs: Option<u64>,
    #[serde(default)]
    pub tab_settle_secs: Option<u64>,
    #[serde(default)]
    pub click_settle_secs: Option<u64>,
    #[serde(default)]
    pub element_wait_secs: Option<u64>,
    #[serde(default)]
    pub download_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub object_root: Utf8PathBuf,
    pub bucket: String,
    pub document_root: Utf8PathBuf,
    pub database: String,
    pub clinical_table: PathBuf,
    pub bind: SocketAddr,
    pub discovery: DiscoveryTimings,
    pub download_timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, EtlError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EtlError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| EtlError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, EtlError> {
        let data_root = default_data_root()?;
        let defaults = DiscoveryTimings::default();
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        let bind_text = config
            .server
            .bind
            .unwrap_or_else(|| "127.0.0.1:5000".to_string());
        let bind = bind_text
            .parse::<SocketAddr>()
            .map_err(|err| EtlError::ConfigValue(format!("server.bind {bind_text:?}: {err}")))?;

        let bucket = config
            .object_store
            .bucket
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        if bucket.trim().is_empty() {
            return Err(EtlError::ConfigValue("object_store.bucket is empty".to_string()));
        }

        Ok(ResolvedConfig {
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            webdriver_url: config
                .webdriver_url
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            headless: config.headless.unwrap_or(true),
            object_root: config
                .object_store
                .root
                .unwrap_or_else(|| data_root.join("objects")),
            bucket,
            document_root: config
                .document_store
                .root
                .unwrap_or_else(|| data_root.join("documents")),
            database: config
                .document_store
                .database
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            clinical_table: config
                .clinical_table
                .unwrap_or_else(|| PathBuf::from("TCGA_clinical_survival_data.tsv")),
            bind,
            discovery: DiscoveryTimings {
                catalog_settle: secs(config.timeouts.catalog_settle_secs, defaults.catalog_settle),
                tab_settle: secs(config.timeouts.tab_settle_secs, defaults.tab_settle),
                click_settle: secs(config.timeouts.click_settle_secs, defaults.click_settle),
                element_wait: secs(config.timeouts.element_wait_secs, defaults.element_wait),
            },
            download_timeout: secs(config.timeouts.download_secs, Duration::from_secs(60)),
        })
    }
}

fn default_data_root() -> Result<Utf8PathBuf, EtlError> {
    let platform_dir = ProjectDirs::from("", "", "tcga-etl")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok());
    if let Some(dir) = platform_dir {
        return Ok(dir);
    }
    let cwd = std::env::current_dir().map_err(|err| EtlError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd.join(".tcga-etl"))
        .map_err(|_| EtlError::Filesystem("invalid data directory path".to_string()))
}
