//! # 校验模块（verify）
//!
//! ## 设计思路
//!
//! 把“码值 → 后端校验 → 可展示结果”拆成几个小块：
//!
//! - `client`：`Verifier` 接口与 HTTP 实现
//! - `pipeline`：在途请求的后台执行、硬超时、结果投递
//! - `manual`：手动输入入口（绕过去重）
//! - `result` / `error`：结果值对象与错误模型
//!
//! ## 调用链
//!
//! ```text
//! DedupState 接受 ──┐
//!                   ├─→ VerificationPipeline::dispatch
//! 手动输入 ─────────┘        ↓ verify_with_deadline（硬超时）
//!                       Verifier::verify（HttpVerifier: POST /scan?token=）
//!                            ↓
//!                       Completion → ScanSession
//! ```

mod client;
mod error;
pub mod manual;
mod pipeline;
mod result;

pub use client::{HttpVerifier, Verifier};
pub use error::VerifyError;
pub use manual::submit_manual_token;
pub use pipeline::{Completion, ScanSource, VerificationPipeline, verify_with_deadline};
pub use result::{ScanStatus, VerificationResult, extract_error_message, parse_scanned_at};

/// 码值属于凭证，日志中只保留首尾片段。
pub fn redact_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return format!("***({})", chars.len());
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}({})", head, tail, chars.len())
}
