//! # 校验结果
//!
//! ## 设计思路
//!
//! `VerificationResult` 是每次校验生成的值对象：展示一段时间后丢弃，从不持久化。
//! 后端成功响应携带的多日活动进度（第几天、已出勤天数、证书是否解锁）一并保留，
//! 供界面展示；缺失字段一律为 `None`。
//!
//! ## 实现思路
//!
//! - 先把响应体反序列化为宽松的 `ScanResponseBody`，再转换为强类型结果。
//! - `scanned_at` 兼容带时区与不带时区（按 UTC 解释）两种 ISO-8601 写法，解析失败记为 `None`。
//! - 错误响应按 `detail` → `error` → `message` 的顺序提取文案。

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VerifyError;

/// 校验结论。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// 新记录了一次出勤。
    Success,
    /// 当天已签到过，后端未新增记录。
    AlreadyScanned,
    Error,
}

impl ScanStatus {
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

/// 单次校验结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub status: ScanStatus,
    pub message: String,
    pub attendance_id: Option<i64>,
    pub student_name: Option<String>,
    pub student_prn: Option<String>,
    pub event_id: Option<i64>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub current_day: Option<u32>,
    pub total_days: Option<u32>,
    pub attended_days: Option<u32>,
    pub days_remaining: Option<i64>,
    pub certificate_unlocked: Option<bool>,
    pub feedback_unlocked: Option<bool>,
    pub completion_message: Option<String>,
    /// 失败时的稳定错误码。
    pub error_code: Option<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScanResponseBody {
    status: Option<String>,
    message: Option<String>,
    attendance_id: Option<i64>,
    student_name: Option<String>,
    student_prn: Option<String>,
    event_id: Option<i64>,
    scanned_at: Option<String>,
    current_day: Option<u32>,
    total_days: Option<u32>,
    attended_days: Option<u32>,
    days_remaining: Option<i64>,
    certificate_unlocked: Option<bool>,
    feedback_unlocked: Option<bool>,
    completion_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    error: Option<String>,
    message: Option<String>,
}

impl VerificationResult {
    fn empty(status: ScanStatus, message: String) -> Self {
        Self {
            status,
            message,
            attendance_id: None,
            student_name: None,
            student_prn: None,
            event_id: None,
            scanned_at: None,
            current_day: None,
            total_days: None,
            attended_days: None,
            days_remaining: None,
            certificate_unlocked: None,
            feedback_unlocked: None,
            completion_message: None,
            error_code: None,
        }
    }

    /// 把校验失败转换为可展示的错误结果。
    pub fn from_error(error: &VerifyError) -> Self {
        let mut result = Self::empty(ScanStatus::Error, error.user_message());
        result.error_code = Some(error.code());
        result
    }

    /// 解析 2xx 响应体。
    ///
    /// 未知 `status` 视为失败，并保留后端消息。
    pub fn from_success_body(body: &str) -> Result<Self, VerifyError> {
        let parsed: ScanResponseBody = serde_json::from_str(body)
            .map_err(|e| VerifyError::Response(format!("无法解析校验响应：{}", e)))?;

        let status = match parsed.status.as_deref() {
            Some("success") => ScanStatus::Success,
            Some("already_scanned") => ScanStatus::AlreadyScanned,
            Some(other) => {
                log::warn!("🎫 未知的校验状态: {}", other);
                ScanStatus::Error
            }
            None => return Err(VerifyError::Response("校验响应缺少 status 字段".to_string())),
        };

        let message = parsed.message.unwrap_or_else(|| match status {
            ScanStatus::Success => "签到成功".to_string(),
            ScanStatus::AlreadyScanned => "今日已签到".to_string(),
            ScanStatus::Error => "签到失败".to_string(),
        });

        Ok(Self {
            status,
            message,
            attendance_id: parsed.attendance_id,
            student_name: parsed.student_name,
            student_prn: parsed.student_prn,
            event_id: parsed.event_id,
            scanned_at: parsed.scanned_at.as_deref().and_then(parse_scanned_at),
            current_day: parsed.current_day,
            total_days: parsed.total_days,
            attended_days: parsed.attended_days,
            days_remaining: parsed.days_remaining,
            certificate_unlocked: parsed.certificate_unlocked,
            feedback_unlocked: parsed.feedback_unlocked,
            completion_message: parsed.completion_message,
            error_code: status.is_error().then_some("E_REJECTED"),
        })
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// 是否新记录了一次出勤（计入本会话扫码数）。
    pub fn counts_as_scan(&self) -> bool {
        matches!(self.status, ScanStatus::Success)
    }
}

/// 解析后端时间戳，不带时区的按 UTC 解释。
pub fn parse_scanned_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// 从非 2xx 响应体中提取给操作员看的文案。
pub fn extract_error_message(body: &str, status: u16) -> String {
    let fallback = || format!("签到服务返回错误（HTTP {}）", status);

    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return fallback();
    };

    let detail = match parsed.detail {
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };

    detail
        .or(parsed.error)
        .or(parsed.message)
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(fallback)
}
