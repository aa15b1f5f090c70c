//! # 扫码去重控制器
//!
//! ## 设计思路
//!
//! 持续拉帧的解码器对同一张二维码每秒可以识别出几十次。
//! 这里决定哪些识别结果值得变成一次后端校验，策略固定为（按顺序判定）：
//!
//! 1. 有请求在途 → 拒绝（不排队，后来者直接丢弃）
//! 2. 码值等于上一次被接受的码值（且仍在抑制窗内）→ 拒绝
//! 3. 距上一次接受不足冷却窗 → 拒绝（不区分码值，限制整体扫码速率）
//! 4. 否则接受：记录码值、时间，进入在途状态
//! 5. 被接受的码值在成功抑制窗（默认 5s）后自动解除抑制
//! 6. 校验失败时，抑制窗缩短为“结果到达 + 失败抑制窗（默认 3s）”，便于尽快重试
//!
//! ## 实现思路
//!
//! - 状态放在显式的 `DedupState` 中，由会话独占持有，不使用任何全局变量，
//!   多个会话（包括并行测试）互不干扰。
//! - 抑制窗使用“截止时间”而不是定时器：截止时间只属于创建它的那次接受，
//!   旧的到期永远不会清掉更新的码值。判定前先执行 `expire`，效果等同于定时器已触发。
//! - 所有方法都接收显式的 `now`，决策本身是纯逻辑，便于精确测试时间边界。

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::ScanConfig;
use crate::verify::redact_token;

/// 一次校验派发的编号（会话内单调递增）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DispatchId(u64);

impl DispatchId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// 去重控制器使用的时间窗。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupWindows {
    pub cooldown: Duration,
    pub token_suppression: Duration,
    pub error_suppression: Duration,
}

impl From<&ScanConfig> for DedupWindows {
    fn from(config: &ScanConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            token_suppression: config.token_suppression(),
            error_suppression: config.error_suppression(),
        }
    }
}

impl Default for DedupWindows {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

/// 拒绝原因。对操作员不可见，只用于日志与统计。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InFlight,
    DuplicateToken,
    Cooldown,
}

/// 去重判定结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Accept(DispatchId),
    Reject(RejectReason),
}

#[derive(Debug, Clone)]
struct Suppression {
    token: String,
    until: Instant,
    dispatch: DispatchId,
}

/// 会话私有的去重状态。
#[derive(Debug, Default)]
pub struct DedupState {
    suppressed: Option<Suppression>,
    last_accepted_at: Option<Instant>,
    in_flight: Option<DispatchId>,
    next_dispatch: u64,
}

impl DedupState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_dispatch_id(&mut self) -> DispatchId {
        self.next_dispatch += 1;
        DispatchId(self.next_dispatch)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<DispatchId> {
        self.in_flight
    }

    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted_at
    }

    /// 当前仍被抑制的码值（抑制窗已过则为 `None`）。
    pub fn last_accepted_token(&self, now: Instant) -> Option<&str> {
        self.suppressed
            .as_ref()
            .filter(|s| now < s.until)
            .map(|s| s.token.as_str())
    }

    /// 抑制窗的截止时间。
    pub fn suppressed_until(&self) -> Option<Instant> {
        self.suppressed.as_ref().map(|s| s.until)
    }

    /// 清除已到期的抑制码值，返回是否发生了清除。
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.suppressed {
            Some(s) if now >= s.until => {
                log::debug!("🧹 抑制窗到期，解除码值 {}", redact_token(&s.token));
                self.suppressed = None;
                true
            }
            _ => false,
        }
    }

    /// 对一次识别结果做去重判定；接受时同时进入在途状态。
    pub fn evaluate(&mut self, token: &str, now: Instant, windows: &DedupWindows) -> DedupDecision {
        self.expire(now);

        if self.in_flight.is_some() {
            log::trace!("⏭️ 拒绝 {}：有请求在途", redact_token(token));
            return DedupDecision::Reject(RejectReason::InFlight);
        }

        if self.suppressed.as_ref().is_some_and(|s| s.token == token) {
            log::trace!("⏭️ 拒绝 {}：同码抑制中", redact_token(token));
            return DedupDecision::Reject(RejectReason::DuplicateToken);
        }

        if let Some(last) = self.last_accepted_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < windows.cooldown {
                log::trace!(
                    "⏭️ 拒绝 {}：冷却中（{}ms < {}ms）",
                    redact_token(token),
                    elapsed.as_millis(),
                    windows.cooldown.as_millis()
                );
                return DedupDecision::Reject(RejectReason::Cooldown);
            }
        }

        let dispatch = self.next_dispatch_id();
        self.suppressed = Some(Suppression {
            token: token.to_string(),
            until: now + windows.token_suppression,
            dispatch,
        });
        self.last_accepted_at = Some(now);
        self.in_flight = Some(dispatch);

        log::info!("✅ 接受扫码 #{} {}", dispatch.get(), redact_token(token));
        DedupDecision::Accept(dispatch)
    }

    /// 手动输入只经过在途闸门，不影响冷却与抑制状态。
    pub fn begin_manual(&mut self) -> Result<DispatchId, RejectReason> {
        if self.in_flight.is_some() {
            return Err(RejectReason::InFlight);
        }
        let dispatch = self.next_dispatch_id();
        self.in_flight = Some(dispatch);
        Ok(dispatch)
    }

    /// 校验结束：复位在途闸门；失败时缩短该次接受的抑制窗。
    ///
    /// 返回该完成是否对应当前在途请求。
    pub fn complete(
        &mut self,
        dispatch: DispatchId,
        failed: bool,
        now: Instant,
        windows: &DedupWindows,
    ) -> bool {
        if self.in_flight != Some(dispatch) {
            log::warn!("⚠️ 收到非在途请求 #{} 的完成通知，忽略", dispatch.get());
            return false;
        }
        self.in_flight = None;

        if failed {
            if let Some(s) = self.suppressed.as_mut().filter(|s| s.dispatch == dispatch) {
                let shortened = now + windows.error_suppression;
                if shortened < s.until {
                    s.until = shortened;
                }
            }
        }

        true
    }
}
