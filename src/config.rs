//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::avatar::{DEFAULT_IMAGE_FIELD, DEFAULT_IMAGE_TEXT_KEY};
use crate::models::SEARCH_TOKENS_FIELD;
use crate::storage::DumpOptions;

/// Log filter used before the config file is read / 读取配置前使用的日志过滤规则
pub const DEFAULT_LOG_FILTER: &str = "participant_directory=info";

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document store configuration / 文档存储配置
    #[serde(default)]
    pub store: StoreConfig,
    /// Search configuration / 搜索配置
    #[serde(default)]
    pub search: SearchConfig,
    /// Logging configuration / 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Document store configuration / 文档存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Document dump to load on startup / 启动时导入的文档文件
    pub data_file: String,
}

/// Search configuration / 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Array field holding precomputed tokens / 预计算分词字段
    pub token_field: String,
    /// Payload field referencing the photo attachment / 头像引用字段
    pub image_field: String,
    /// Key of the attachment name inside the image field / 附件名所在键
    pub image_text_key: String,
    /// Derive tokens for imported documents lacking them / 为缺少分词的文档生成分词
    pub derive_missing_tokens: bool,
}

/// Logging configuration / 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset / 未设置 RUST_LOG 时的过滤规则
    pub filter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: "data/participants.json".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            token_field: SEARCH_TOKENS_FIELD.to_string(),
            image_field: DEFAULT_IMAGE_FIELD.to_string(),
            image_text_key: DEFAULT_IMAGE_TEXT_KEY.to_string(),
            derive_missing_tokens: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter to install; RUST_LOG wins over the config file / 实际使用的过滤规则，RUST_LOG 优先
    pub fn effective_filter(&self, env_filter: Option<&str>) -> String {
        match env_filter.map(str::trim) {
            Some(directives) if !directives.is_empty() => directives.to_string(),
            _ => self.filter.clone(),
        }
    }
}

impl AppConfig {
    /// Get the document dump path / 获取文档文件路径
    pub fn get_data_file(&self) -> PathBuf {
        PathBuf::from(&self.store.data_file)
    }

    /// Import options derived from search settings / 导入选项
    pub fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            derive_missing_tokens: self.search.derive_missing_tokens,
        }
    }
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
    }

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config(config_path: &Path) -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config_from(config_path)?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG.set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
///
/// Defaults are returned until `init_config` has run / 未初始化时返回默认配置
pub fn config() -> AppConfig {
    CONFIG.get().map(|config| config.read().clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.search.token_field, "searchTextTokens");
        assert_eq!(config.search.image_text_key, "#text");
        assert!(!config.dump_options().derive_missing_tokens);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "search": { "derive_missing_tokens": true } }"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert!(config.search.derive_missing_tokens);
        assert_eq!(config.search.image_field, "image");
        assert_eq!(config.get_data_file(), PathBuf::from("data/participants.json"));
        assert_eq!(config.logging.filter, "participant_directory=info");
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_config_from(&path).unwrap_err().starts_with("Failed to parse"));
    }

    #[test]
    fn test_env_filter_overrides_config() {
        let logging = LoggingConfig {
            filter: "participant_directory=debug".to_string(),
        };
        assert_eq!(logging.effective_filter(Some("warn")), "warn");
        assert_eq!(logging.effective_filter(Some("  ")), "participant_directory=debug");
        assert_eq!(logging.effective_filter(None), "participant_directory=debug");
        assert_eq!(LoggingConfig::default().effective_filter(None), DEFAULT_LOG_FILTER);
    }

    // The only test that touches the global instance.
    #[test]
    fn test_global_config_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "store": { "data_file": "dumps/people.json" } }"#).unwrap();

        init_config(&path).unwrap();
        assert_eq!(config().get_data_file(), PathBuf::from("dumps/people.json"));
        assert!(init_config(&path).unwrap_err().contains("already initialized"));
    }
}
