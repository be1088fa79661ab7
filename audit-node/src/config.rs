//! 配置管理模塊
//!
//! 負責加載和驗證審計引擎配置

use crate::error::{AuditError, Result};
use crate::types::VerifierConfig;
use config::{Config, File};
use std::path::Path;

/// 從配置文件加載審計引擎配置
///
/// # 參數
/// - `config_path`: 配置文件路徑（支持 TOML、JSON、YAML）
///
/// # 返回
/// - `Ok(VerifierConfig)`: 成功加載的配置
/// - `Err(AuditError)`: 配置文件格式錯誤或參數無效
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<VerifierConfig> {
    let config = Config::builder()
        .add_source(File::from(config_path.as_ref()))
        .build()
        .map_err(|e| AuditError::Config(format!("Failed to load config file: {}", e)))?;

    let verifier_config: VerifierConfig = config
        .try_deserialize()
        .map_err(|e| AuditError::Config(format!("Failed to parse config: {}", e)))?;

    validate_config(&verifier_config)?;

    Ok(verifier_config)
}

/// 從環境變量加載配置（用於容器化部署）
///
/// 環境變量前綴: `AUDITOR_`
/// 示例: `AUDITOR_MIN_BYTES_PER_SECOND`, `AUDITOR_MIN_DOWNLOAD_TIMEOUT_SECS`
pub fn load_config_from_env() -> Result<VerifierConfig> {
    let config = Config::builder()
        .add_source(config::Environment::with_prefix("AUDITOR"))
        .build()
        .map_err(|e| AuditError::Config(format!("Failed to load env vars: {}", e)))?;

    let verifier_config: VerifierConfig = config
        .try_deserialize()
        .map_err(|e| AuditError::Config(format!("Failed to parse env config: {}", e)))?;

    validate_config(&verifier_config)?;

    Ok(verifier_config)
}

/// 驗證配置的有效性
///
/// 檢查:
/// - 下載超時不可為 0（否則任何下載都會立即超時）
/// - HTTP 請求超時不可為 0
pub fn validate_config(config: &VerifierConfig) -> Result<()> {
    if config.min_download_timeout_secs == 0 {
        return Err(AuditError::Config(
            "min_download_timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.http_timeout_secs == 0 {
        return Err(AuditError::Config(
            "http_timeout_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = VerifierConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_download_timeout_rejected() {
        let mut config = VerifierConfig::default();
        config.min_download_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_http_timeout_rejected() {
        let mut config = VerifierConfig::default();
        config.http_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "min_bytes_per_second = 256\nmin_download_timeout_secs = 10\nhttp_timeout_secs = 15"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.min_bytes_per_second, 256);
        assert_eq!(config.min_download_timeout_secs, 10);
        assert_eq!(config.http_timeout_secs, 15);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "min_bytes_per_second = 0\nmin_download_timeout_secs = 0\nhttp_timeout_secs = 15"
        )
        .unwrap();

        assert!(load_config(file.path()).is_err());
    }
}
