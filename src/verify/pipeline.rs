//! # 校验管线
//!
//! ## 设计思路
//!
//! 每个被接受的码值恰好发出一次校验请求；同一会话内“同时最多一个请求在途”
//! 由去重控制器的在途闸门保证，管线只负责：
//! 1. 在后台任务中发起请求，并用硬超时兜底，保证请求一定会结束
//! 2. 把成功/失败统一映射为 `VerificationResult`
//! 3. 把结果投递回会话（会话已卸载时直接丢弃）
//!
//! ## 实现思路
//!
//! - 请求任务独立于摄像头生命周期：暂停或离开页面不会取消在途请求，
//!   否则在途闸门可能永远无法复位。
//! - 投递通道的接收端随会话销毁，发送失败即表示会话已不在，只记录调试日志。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{VerificationResult, Verifier, VerifyError, redact_token};
use crate::scan::DispatchId;

/// 校验请求的来源入口。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    /// 摄像头（经过去重控制器）。
    Camera,
    /// 手动输入（绕过去重控制器）。
    Manual,
}

/// 一次校验完成。
#[derive(Debug, Clone)]
pub struct Completion {
    pub dispatch: DispatchId,
    pub source: ScanSource,
    pub result: VerificationResult,
    pub elapsed: Duration,
}

/// 带硬超时的单次校验，任何失败都折叠为错误结果。
pub async fn verify_with_deadline<V: Verifier>(
    verifier: &V,
    token: &str,
    timeout: Duration,
) -> VerificationResult {
    match tokio::time::timeout(timeout, verifier.verify(token)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            log::warn!(
                "🎫 校验失败 [{}/{}] token={}: {}",
                err.stage(),
                err.code(),
                redact_token(token),
                err
            );
            VerificationResult::from_error(&err)
        }
        Err(_) => {
            let err = VerifyError::Timeout(timeout.as_millis() as u64);
            log::warn!("🎫 校验超时 token={}（{}ms）", redact_token(token), timeout.as_millis());
            VerificationResult::from_error(&err)
        }
    }
}

/// 会话持有的校验管线。
pub struct VerificationPipeline<V: Verifier> {
    verifier: Arc<V>,
    timeout: Duration,
    completions: mpsc::UnboundedSender<Completion>,
}

impl<V: Verifier> VerificationPipeline<V> {
    pub fn new(
        verifier: Arc<V>,
        timeout: Duration,
        completions: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            verifier,
            timeout,
            completions,
        }
    }

    /// 在后台发起一次校验。
    pub fn dispatch(&self, dispatch: DispatchId, source: ScanSource, token: String) -> JoinHandle<()> {
        let verifier = Arc::clone(&self.verifier);
        let timeout = self.timeout;
        let completions = self.completions.clone();

        log::info!(
            "🎫 发起校验 #{} ({:?}) token={}",
            dispatch.get(),
            source,
            redact_token(&token)
        );

        tokio::spawn(async move {
            let started = Instant::now();
            let result = verify_with_deadline(verifier.as_ref(), &token, timeout).await;
            let elapsed = started.elapsed();

            log::info!(
                "🎫 校验 #{} 完成：{:?} - {}ms",
                dispatch.get(),
                result.status,
                elapsed.as_millis()
            );

            let completion = Completion {
                dispatch,
                source,
                result,
                elapsed,
            };
            if completions.send(completion).is_err() {
                log::debug!("🎫 会话已结束，丢弃校验 #{} 的结果", dispatch.get());
            }
        })
    }
}
