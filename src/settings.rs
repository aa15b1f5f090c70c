//! 设置文件读写
//!
//! `settings.json` 只保存扫码时间窗等可调参数（camelCase 键名，与 `ScanConfig` 一致）。
//! 文件不存在时使用默认值；未知键忽略；内容损坏或数值越界时报错给操作员，不静默重置。

use std::fs;
use std::path::Path;

use crate::config::ScanConfig;
use crate::error::AppError;

/// 读取设置文件。文件不存在返回默认配置。
pub fn load_settings(path: &Path) -> Result<ScanConfig, AppError> {
    if !path.exists() {
        log::info!("⚙️ 设置文件 {} 不存在，使用默认配置", path.display());
        return Ok(ScanConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str::<ScanConfig>(&content)
        .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;
    config.validate()?;

    log::info!(
        "⚙️ 已加载设置 {}（档位: {}）",
        path.display(),
        config.infer_profile().as_str()
    );
    Ok(config)
}

/// 校验后写回设置文件，必要时创建父目录。
pub fn save_settings(path: &Path, config: &ScanConfig) -> Result<(), AppError> {
    config.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::Settings(format!("创建设置目录失败: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanProfile;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("unipass-settings-{}-{}", std::process::id(), name))
            .join("settings.json")
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_settings(&temp_path("missing")).expect("load failed");
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let path = temp_path("roundtrip");
        let mut config = ScanConfig::default();
        config.apply_profile(ScanProfile::Rapid);

        save_settings(&path, &config).expect("save failed");
        let loaded = load_settings(&path).expect("load failed");
        assert_eq!(loaded.infer_profile(), ScanProfile::Rapid);

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn partial_file_with_unknown_keys_keeps_defaults() {
        let path = temp_path("partial");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir failed");
        fs::write(&path, r#"{"cooldownMs": 1500, "theme": "dark"}"#).expect("write failed");

        let config = load_settings(&path).expect("load failed");
        assert_eq!(config.cooldown_ms, 1_500);
        assert_eq!(config.token_suppression_ms, 5_000);

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn corrupt_or_out_of_range_file_is_an_error() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir failed");

        fs::write(&path, "{not json").expect("write failed");
        assert!(matches!(load_settings(&path), Err(AppError::Settings(_))));

        fs::write(&path, r#"{"errorSuppressionMs": 9000}"#).expect("write failed");
        assert!(matches!(load_settings(&path), Err(AppError::Config(_))));

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }
}
