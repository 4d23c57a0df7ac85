//! 配置管理
//!
//! 支持配置文件与环境变量（HIMS_前缀）叠加加载

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

/// HIMS服务器完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HimsConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置（整节可缺省，缺省为内存存储）
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 锁配置
    pub locks: LockConfig,
    /// 系统集成配置（整节可缺省，缺省不接入外部系统）
    #[serde(default)]
    pub integration: IntegrationConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 数据库配置（未配置url时使用内存存储）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接字符串
    pub url: Option<String>,
}

/// 锁配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// 锁获取超时（毫秒）
    pub acquire_timeout_ms: u64,
}

/// 系统集成配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// 患者主索引服务地址
    pub patient_directory_url: Option<String>,
    /// 人事目录服务地址
    pub staff_directory_url: Option<String>,
    /// 目录服务API密钥
    pub api_key: Option<String>,
    /// 计费系统通知端点
    pub billing_endpoint: Option<String>,
    /// 计费通知签名密钥
    pub billing_secret: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
}

impl HimsConfig {
    /// 从文件与环境变量加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("locks.acquire_timeout_ms", 5000)?
            .set_default("logging.level", "info")?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("HIMS").separator("__"))
            .build()?;

        let config: HimsConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        if let Some(path) = config_path {
            info!("Configuration loaded successfully from: {}", path);
        } else {
            info!("Configuration loaded from defaults and environment");
        }
        Ok(config)
    }

    /// 验证配置
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.locks.acquire_timeout_ms == 0 {
            anyhow::bail!("Lock acquire timeout cannot be 0");
        }
        Ok(())
    }
}

impl Default for HimsConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            locks: LockConfig {
                acquire_timeout_ms: 5000,
            },
            integration: IntegrationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HimsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = HimsConfig::load(None).unwrap();
        assert_eq!(config.locks.acquire_timeout_ms, 5000);
        assert_eq!(config.logging.level, "info");
        // database 与 integration 节整体缺省：内存存储，不接入外部系统
        assert!(config.database.url.is_none());
        assert!(config.integration.patient_directory_url.is_none());
        assert!(config.integration.staff_directory_url.is_none());
        assert!(config.integration.billing_endpoint.is_none());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = HimsConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
