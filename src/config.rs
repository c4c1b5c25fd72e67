//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AGENDA__*` 覆盖（双下划线表示嵌套，如 `AGENDA__COORDINATOR__BATCH_SIZE=5`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::ScheduleError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub coordinator: CoordinatorSection,
    pub polling: PollingSection,
    pub recovery: RecoverySection,
}

/// [app] 段：应用名与日志级别
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// RUST_LOG 未设置时使用
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_level: "info".to_string(),
        }
    }
}

/// [coordinator] 段：批大小、链长上限、单环节预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    pub batch_size: usize,
    /// 平台限制：一条链最多执行的环节数
    pub max_chain_depth: u32,
    /// 单个环节的执行预算（秒），超时按资源耗尽处理
    pub link_timeout_secs: u64,
}

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 5;

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            link_timeout_secs: 120,
        }
    }
}

impl CoordinatorSection {
    pub fn link_timeout(&self) -> Duration {
        Duration::from_secs(self.link_timeout_secs.max(1))
    }
}

/// [polling] 段：轮询间隔、总超时、多段响应等待预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub interval_ms: u64,
    pub timeout_secs: u64,
    pub multipart_wait_secs: u64,
    /// 响应长度连续多少次不变视为已稳定；0 表示首次观察到 Completed 即结束
    pub stable_polls: u32,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            timeout_secs: 600,
            multipart_wait_secs: 30,
            stable_polls: 2,
        }
    }
}

impl PollingSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn multipart_wait(&self) -> Duration {
        Duration::from_secs(self.multipart_wait_secs)
    }
}

/// [recovery] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    /// 失败时附带的原始响应预览长度（字符）
    pub preview_chars: usize,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self { preview_chars: 500 }
    }
}

/// 依次查找的默认配置文件（相对当前目录）
const DEFAULT_CONFIG_FILES: &[&str] = &["config/default.toml", "../config/default.toml", "default.toml"];

fn default_config_file() -> Option<&'static str> {
    DEFAULT_CONFIG_FILES.iter().copied().find(|f| Path::new(f).exists())
}

/// 加载并校验配置
///
/// 默认文件（找到的第一个）→ 显式文件（存在时，覆盖前者）→ 环境变量 AGENDA__*。
/// 读取或反序列化失败、以及取值不可用，都报告为 `ScheduleError::Config`。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, ScheduleError> {
    let mut sources: Vec<PathBuf> = default_config_file().map(PathBuf::from).into_iter().collect();
    match config_path {
        Some(path) if path.exists() => sources.push(path),
        Some(path) => tracing::warn!("config file {} not found, using defaults", path.display()),
        None => {}
    }

    let builder = sources
        .into_iter()
        .fold(config::Config::builder(), |b, path| b.add_source(config::File::from(path)))
        .add_source(
            config::Environment::with_prefix("AGENDA")
                .separator("__")
                .try_parsing(true),
        );

    let cfg: AppConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ScheduleError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    /// 取值为 0 会让链或轮询无法前进
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.coordinator.batch_size == 0 {
            return Err(ScheduleError::Config("coordinator.batch_size must be at least 1".into()));
        }
        if self.coordinator.max_chain_depth == 0 {
            return Err(ScheduleError::Config("coordinator.max_chain_depth must be at least 1".into()));
        }
        if self.polling.interval_ms == 0 {
            return Err(ScheduleError::Config("polling.interval_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_platform_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.coordinator.batch_size, 10);
        assert_eq!(cfg.coordinator.max_chain_depth, 5);
        assert_eq!(cfg.polling.stable_polls, 2);
        assert_eq!(cfg.recovery.preview_chars, 500);
        assert_eq!(cfg.app.log_level, "info");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[coordinator]\nbatch_size = 4\n\n[polling]\ninterval_ms = 250").unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.coordinator.batch_size, 4);
        assert_eq!(cfg.polling.interval(), Duration::from_millis(250));
        // 未出现的键保持默认
        assert_eq!(cfg.coordinator.max_chain_depth, 5);
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/agenda.toml"))).unwrap();
        assert!(cfg.coordinator.batch_size > 0);
    }

    #[test]
    fn test_zero_batch_size_is_a_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[coordinator]\nbatch_size = 0").unwrap();

        match load_config(Some(file.path().to_path_buf())) {
            Err(ScheduleError::Config(msg)) => assert!(msg.contains("batch_size")),
            other => panic!("Expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[coordinator]\nbatch_size = \"many\"").unwrap();

        assert!(matches!(
            load_config(Some(file.path().to_path_buf())),
            Err(ScheduleError::Config(_))
        ));
    }
}
