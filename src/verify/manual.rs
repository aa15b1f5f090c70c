//! # 手动输入入口
//!
//! 手动输入是校验管线的第二个独立入口：操作员每点一次提交按钮调用一次，
//! 本身已经受人工速率限制，因此不经过摄像头去重控制器，也没有冷却窗。

use std::time::Duration;

use super::{VerificationResult, Verifier, verify_with_deadline};
use crate::error::AppError;

/// 规范化手动输入的码值：去掉首尾空白，拒绝空输入。
pub fn normalize_manual_token(raw: &str) -> Result<String, AppError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(AppError::InvalidInput("请输入票据码".to_string()));
    }
    Ok(token.to_string())
}

/// 不依赖会话，直接提交一次手动输入。
pub async fn submit_manual_token<V: Verifier>(
    verifier: &V,
    raw: &str,
    timeout: Duration,
) -> Result<VerificationResult, AppError> {
    let token = normalize_manual_token(raw)?;
    Ok(verify_with_deadline(verifier, &token, timeout).await)
}
