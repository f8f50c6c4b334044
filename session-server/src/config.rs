//! 服务端配置
//!
//! 加载顺序：命令行给出的路径 > `<config_dir>/xiangqi/server.json` > 内置默认值。
//! 环境变量 `XIANGQI_BIND` 覆盖监听地址。

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use protocol::{
    HEARTBEAT_TIMEOUT_SECS, INITIAL_TIME_MS, NO_CAPTURE_PLY_LIMIT, RECONNECT_GRACE_SECS,
    REPETITION_THRESHOLD, ROLLBACK_BUDGET, ROLLBACK_TIMEOUT_SECS, TICK_INTERVAL_MS,
};

use crate::session::SessionRules;

/// 监听地址环境变量
pub const BIND_ENV: &str = "XIANGQI_BIND";

/// 服务端配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 每方初始时间（毫秒）
    pub initial_time_ms: u64,
    /// 计时广播间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 每方悔棋次数
    pub rollback_budget: u8,
    /// 悔棋请求等待应答时间（秒）
    pub rollback_timeout_secs: u64,
    /// 断线重连宽限期（秒）
    pub reconnect_grace_secs: u64,
    /// 连接无消息超时（秒）
    pub heartbeat_timeout_secs: u64,
    /// 无吃子半回合上限
    pub no_capture_ply_limit: u32,
    /// 重复局面判定次数
    pub repetition_threshold: usize,
    /// 对局归档目录，缺省为 `<data_dir>/xiangqi/archive`
    pub archive_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9527".to_string(),
            initial_time_ms: INITIAL_TIME_MS,
            tick_interval_ms: TICK_INTERVAL_MS,
            rollback_budget: ROLLBACK_BUDGET,
            rollback_timeout_secs: ROLLBACK_TIMEOUT_SECS,
            reconnect_grace_secs: RECONNECT_GRACE_SECS,
            heartbeat_timeout_secs: HEARTBEAT_TIMEOUT_SECS,
            no_capture_ply_limit: NO_CAPTURE_PLY_LIMIT,
            repetition_threshold: REPETITION_THRESHOLD,
            archive_dir: None,
        }
    }
}

impl ServerConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("xiangqi");
            path.push("server.json");
            path
        })
    }

    /// 加载配置
    ///
    /// 显式给出的文件必须存在且合法；默认位置的文件损坏时回退到默认值。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::load_default_location(),
        };

        if let Ok(bind) = std::env::var(BIND_ENV) {
            info!(bind = %bind, "监听地址由环境变量覆盖");
            config.bind_address = bind;
        }

        config.validate()?;
        Ok(config)
    }

    fn load_default_location() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("无法获取配置目录，使用默认配置");
            return Self::default();
        };

        if !path.exists() {
            info!("配置文件不存在，使用默认配置");
            return Self::default();
        }

        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("配置文件无效，使用默认配置: {e:#}");
                Self::default()
            }
        }
    }

    /// 从 JSON 文件读取
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {:?}", path))?;
        info!("已加载配置: {:?}", path);
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<()> {
        ensure!(self.initial_time_ms > 0, "initial_time_ms must be positive");
        ensure!(self.tick_interval_ms > 0, "tick_interval_ms must be positive");
        ensure!(
            self.rollback_budget <= ROLLBACK_BUDGET,
            "rollback_budget must not exceed {ROLLBACK_BUDGET}"
        );
        ensure!(
            self.heartbeat_timeout_secs > 0,
            "heartbeat_timeout_secs must be positive"
        );
        ensure!(
            self.repetition_threshold >= 2,
            "repetition_threshold must be at least 2"
        );
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rollback_timeout(&self) -> Duration {
        Duration::from_secs(self.rollback_timeout_secs)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// 单局规则参数
    pub fn session_rules(&self) -> SessionRules {
        SessionRules {
            initial_time_ms: self.initial_time_ms,
            rollback_budget: self.rollback_budget,
            rollback_timeout: self.rollback_timeout(),
            no_capture_ply_limit: self.no_capture_ply_limit,
            repetition_threshold: self.repetition_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_follow_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.initial_time_ms, 600_000);
        assert_eq!(config.rollback_budget, 3);
        assert_eq!(config.reconnect_grace(), Duration::from_secs(60));
        assert_eq!(config.rollback_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{ "initial_time_ms": 120000, "reconnect_grace_secs": 10 }"#)
            .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.initial_time_ms, 120_000);
        assert_eq!(config.reconnect_grace_secs, 10);
        assert_eq!(config.rollback_budget, ROLLBACK_BUDGET);
        assert_eq!(config.bind_address, "0.0.0.0:9527");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(ServerConfig::load(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_validate_rejects_large_budget() {
        let config = ServerConfig {
            rollback_budget: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_rules() {
        let config = ServerConfig {
            initial_time_ms: 5_000,
            no_capture_ply_limit: 40,
            ..Default::default()
        };
        let rules = config.session_rules();
        assert_eq!(rules.initial_time_ms, 5_000);
        assert_eq!(rules.no_capture_ply_limit, 40);
        assert_eq!(rules.rollback_timeout, Duration::from_secs(30));
    }
}
