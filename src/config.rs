//! # 配置模块
//!
//! ## 设计思路
//!
//! 扫码会话里所有“可调时间窗”都集中在 `ScanConfig`：冷却窗、成功/失败后的同码抑制窗、
//! 结果展示时长、请求超时。成功与失败两种抑制窗的具体毫秒数属于产品选择，
//! 这里只固化它们之间的关系（失败后重试不能比成功后更慢），数值本身可调。
//!
//! ## 实现思路
//!
//! - `Default` 提供与线上一致的默认值（2s / 5s / 3s / 3s）。
//! - `ScanProfile` 把常用组合包装成 strict / balanced / rapid 三个档位，
//!   并能从当前配置反推档位（给设置面板展示）。
//! - `validate` 在任何配置生效前执行，越界直接拒绝而不是静默钳制。
//! - `ApiConfig` 负责后端地址：环境变量优先，缺省回退到本地 HTTPS 开发代理。

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::FacingMode;

pub const API_URL_ENV: &str = "UNIPASS_API_URL";
pub const API_TOKEN_ENV: &str = "UNIPASS_API_TOKEN";
pub const DEFAULT_API_URL: &str = "https://localhost:5173/api";

/// 配置校验错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} 必须在 {min}~{max} 毫秒之间（当前：{value}）")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("error_suppression_ms（{error}）不能大于 token_suppression_ms（{success}）")]
    SuppressionAsymmetry { error: u64, success: u64 },

    #[error("未知时间窗档位：{0}（可选：strict / balanced / rapid）")]
    UnknownProfile(String),

    #[error("后端地址无效：{0}")]
    InvalidApiUrl(String),
}

/// 扫码会话配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    /// 任意两次被接受的扫码之间的最小间隔（不区分码值）。
    pub cooldown_ms: u64,
    /// 同一码值被接受后，在此时间内再次出现会被忽略。
    pub token_suppression_ms: u64,
    /// 校验失败后，同一码值的抑制窗缩短为该值（从结果到达时起算）。
    pub error_suppression_ms: u64,
    /// 校验结果在界面上的展示时长。
    pub result_display_ms: u64,
    /// 单次校验请求的总超时。
    pub request_timeout_ms: u64,
    /// 建立连接（TCP/TLS）超时。
    pub connect_timeout_ms: u64,
    /// 摄像头朝向偏好。
    pub facing: FacingMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 2_000,
            token_suppression_ms: 5_000,
            error_suppression_ms: 3_000,
            result_display_ms: 3_000,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            facing: FacingMode::Environment,
        }
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("cooldown_ms", self.cooldown_ms, 100, 60_000)?;
        check_range("token_suppression_ms", self.token_suppression_ms, 500, 120_000)?;
        check_range("error_suppression_ms", self.error_suppression_ms, 500, 120_000)?;
        check_range("result_display_ms", self.result_display_ms, 500, 60_000)?;
        check_range("request_timeout_ms", self.request_timeout_ms, 1_000, 120_000)?;
        check_range(
            "connect_timeout_ms",
            self.connect_timeout_ms,
            500,
            self.request_timeout_ms,
        )?;

        if self.error_suppression_ms > self.token_suppression_ms {
            return Err(ConfigError::SuppressionAsymmetry {
                error: self.error_suppression_ms,
                success: self.token_suppression_ms,
            });
        }

        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn token_suppression(&self) -> Duration {
        Duration::from_millis(self.token_suppression_ms)
    }

    pub fn error_suppression(&self) -> Duration {
        Duration::from_millis(self.error_suppression_ms)
    }

    pub fn result_display(&self) -> Duration {
        Duration::from_millis(self.result_display_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 基于当前时间窗反推档位。
    pub fn infer_profile(&self) -> ScanProfile {
        if self.cooldown_ms >= 3_000 && self.token_suppression_ms >= 8_000 {
            return ScanProfile::Strict;
        }

        if self.cooldown_ms <= 1_000 && self.token_suppression_ms <= 3_000 {
            return ScanProfile::Rapid;
        }

        ScanProfile::Balanced
    }

    /// 把档位映射到具体时间窗，超时等其他字段保持不变。
    pub fn apply_profile(&mut self, profile: ScanProfile) {
        let (cooldown, success, error) = match profile {
            ScanProfile::Strict => (3_000, 8_000, 4_000),
            ScanProfile::Balanced => (2_000, 5_000, 3_000),
            ScanProfile::Rapid => (1_000, 3_000, 1_500),
        };
        self.cooldown_ms = cooldown;
        self.token_suppression_ms = success;
        self.error_suppression_ms = error;
    }
}

/// 时间窗档位。
///
/// - `Strict`：人流少、防误扫优先
/// - `Balanced`：默认
/// - `Rapid`：入口排队、吞吐优先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProfile {
    Strict,
    Balanced,
    Rapid,
}

impl ScanProfile {
    pub fn parse(profile: &str) -> Result<Self, ConfigError> {
        match profile.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "balanced" => Ok(Self::Balanced),
            "rapid" => Ok(Self::Rapid),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Rapid => "rapid",
        }
    }
}

/// 后端接口配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// 规范化后的基础地址（无结尾斜杠）。
    pub base_url: String,
    /// 可选的 Bearer 令牌（扫码接口允许匿名，登录后附带扫码员身份）。
    pub auth_token: Option<String>,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// 从 `.env` 与环境变量解析，缺省回退到本地 HTTPS 开发代理。
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let base_url = env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                log::info!("⚙️ 未设置 {}，使用本地代理地址 {}", API_URL_ENV, DEFAULT_API_URL);
                DEFAULT_API_URL.to_string()
            });

        Ok(Self::new(&base_url)?.with_auth_token(env::var(API_TOKEN_ENV).ok()))
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| ConfigError::InvalidApiUrl(format!("{}（{}）", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(ConfigError::InvalidApiUrl(format!(
            "不支持的协议 {}（仅支持 http / https）",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_balanced() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.infer_profile(), ScanProfile::Balanced);
    }

    #[test]
    fn profiles_roundtrip_through_inference() {
        let mut config = ScanConfig::default();
        for profile in [ScanProfile::Strict, ScanProfile::Balanced, ScanProfile::Rapid] {
            config.apply_profile(profile);
            assert!(config.validate().is_ok(), "{} should validate", profile.as_str());
            assert_eq!(config.infer_profile(), profile);
        }
    }

    #[test]
    fn validate_rejects_error_window_longer_than_success_window() {
        let config = ScanConfig {
            token_suppression_ms: 2_000,
            error_suppression_ms: 4_000,
            ..ScanConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SuppressionAsymmetry {
                error: 4_000,
                success: 2_000
            })
        );
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let config = ScanConfig {
            cooldown_ms: 10,
            ..ScanConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "cooldown_ms", .. })
        ));

        let config = ScanConfig {
            connect_timeout_ms: 20_000,
            request_timeout_ms: 10_000,
            ..ScanConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "connect_timeout_ms", .. })
        ));
    }

    #[test]
    fn profile_parse_is_case_insensitive() {
        assert_eq!(ScanProfile::parse(" Rapid "), Ok(ScanProfile::Rapid));
        assert!(matches!(
            ScanProfile::parse("turbo"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn api_url_is_normalized() {
        let api = ApiConfig::new("https://unipass.example.edu/api/").expect("valid url");
        assert_eq!(api.base_url, "https://unipass.example.edu/api");

        assert!(matches!(
            ApiConfig::new("ftp://unipass.example.edu"),
            Err(ConfigError::InvalidApiUrl(_))
        ));
        assert!(matches!(ApiConfig::new("not a url"), Err(ConfigError::InvalidApiUrl(_))));
    }

    #[test]
    fn blank_auth_token_is_dropped() {
        let api = ApiConfig::new(DEFAULT_API_URL)
            .expect("valid url")
            .with_auth_token(Some("  ".to_string()));
        assert_eq!(api.auth_token, None);
    }

    #[test]
    fn config_deserializes_partial_camel_case_json() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"cooldownMs": 1500, "facing": "user"}"#).expect("valid json");
        assert_eq!(config.cooldown_ms, 1_500);
        assert_eq!(config.token_suppression_ms, 5_000);
        assert_eq!(config.facing, FacingMode::User);
    }
}
