use crate::archive::BundleLayout;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub columns: ColumnConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/clients.db".to_string(),
        }
    }
}

/// Where uploads are unpacked and what an unpacked bundle must contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub media_root: String,
    pub uploads_dir: String,
    pub marketing_dir: String,
    pub interests_dir: String,
    pub tabular_patterns: Vec<String>,
    pub max_upload_bytes: usize,
    /// Cap on the decompressed size of one bundle.
    pub max_extracted_bytes: u64,
    /// Registered uploads kept on disk; older ones are pruned. 0 keeps all.
    pub keep_uploads: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: "media".to_string(),
            uploads_dir: "uploaded_files".to_string(),
            marketing_dir: "Выгрузка_маркетинговые списки".to_string(),
            interests_dir: "Выгрузки_интересы+обращения+объемы перевозок".to_string(),
            tabular_patterns: vec![
                "*.xlsx".to_string(),
                "*.xlsm".to_string(),
                "*.xls".to_string(),
                "*.ods".to_string(),
            ],
            max_upload_bytes: 256 * 1024 * 1024,
            max_extracted_bytes: 1024 * 1024 * 1024,
            keep_uploads: 5,
        }
    }
}

impl StorageConfig {
    pub fn uploads_root(&self) -> PathBuf {
        PathBuf::from(&self.media_root).join(&self.uploads_dir)
    }

    pub fn layout(&self) -> BundleLayout {
        BundleLayout {
            marketing_dir: self.marketing_dir.clone(),
            interests_dir: self.interests_dir.clone(),
        }
    }
}

/// Spreadsheet header names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub id: String,
    pub category: String,
    pub city: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "ID".to_string(),
            category: "ОКВЭД2.Наименование".to_string(),
            city: "Город фактический".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// `stub`, `http` or `noop`.
    pub provider: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: "stub".to_string(),
            url: None,
            api_key: None,
            timeout_secs: 30,
            retries: 1,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Reads the optional config file, then `CHURN__SECTION__KEY` environment overrides.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("CHURN")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
