//! # 校验错误模型
//!
//! 单一枚举覆盖校验链路的所有失败来源（发送、响应、解析），
//! 每个分支都能给出稳定错误码、所处阶段以及直接展示给操作员的文案。

/// 校验请求失败。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("校验请求超时（{0}ms）")]
    Timeout(u64),

    /// 后端返回非 2xx，`message` 为后端错误内容原文。
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("响应格式错误：{0}")]
    Response(String),
}

impl VerifyError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Rejected { .. } => "E_REJECTED",
            Self::Response(_) => "E_RESPONSE",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Timeout(_) => "send",
            Self::Rejected { .. } => "response",
            Self::Response(_) => "decode",
        }
    }

    /// 展示给操作员的文案。后端拒绝时原样透传后端消息。
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            Self::Timeout(_) => "校验超时，请重新扫码".to_string(),
            Self::Network(_) => "无法连接签到服务，请检查网络后重新扫码".to_string(),
            Self::Response(_) => "签到服务返回了无法识别的结果".to_string(),
        }
    }

    pub(crate) fn from_reqwest(error: reqwest::Error, timeout_ms: u64) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout_ms)
        } else if error.is_decode() {
            Self::Response(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}
