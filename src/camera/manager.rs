//! # 摄像头生命周期管理
//!
//! ## 设计思路
//!
//! `CameraManager` 是会话内唯一持有媒体流句柄的地方，负责：
//! - `request_access`：请求权限并打开流，失败全部收敛为 `DENIED` 状态 + 原因
//! - `begin_access` / `finish_access`：同样的获取拆成两步，供事件循环在等待提示时继续运转
//! - `release`：停止全部轨道并丢弃句柄，幂等
//!
//! 资源安全的核心约束是“任何媒体流句柄都不能活得比获取它的组件更久”，
//! 因此 `Drop` 时也会执行一次 `release`。
//!
//! ## 实现思路
//!
//! - 句柄与设备占用守卫打包在 `HeldStream` 中，二者同生共死。
//! - 获取拆成 `begin_access` / `finish_access` 两步，权限提示在后台任务中等待，
//!   会话事件循环不会被提示阻塞；放弃的获取由 `PendingAccess` 负责收尾。
//! - 状态迁移统一走 `transition`，方便日志追踪。

use serde::Serialize;

use tokio::task::JoinHandle;

use super::device::DeviceHold;
use super::{CameraBackend, CameraDevice, CameraError, FacingMode, MediaStream};

/// 摄像头状态。
///
/// `Active` 意味着持有存活的媒体流句柄；
/// `Stopped` / `Denied` / `Uninitialized` 意味着没有持有任何句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraState {
    #[default]
    Uninitialized,
    PermissionPrompt,
    Granted,
    Denied,
    Active,
    Stopped,
}

impl CameraState {
    /// 该状态下是否允许持有媒体流句柄。
    pub fn holds_stream(self) -> bool {
        matches!(self, Self::Granted | Self::Active)
    }
}

type OpenResult<B> = Result<(<B as CameraBackend>::Stream, DeviceHold), CameraError>;

/// 进行中的摄像头获取。
///
/// 被丢弃时中止获取任务并释放设备占用；若媒体流已经打开，则在后台停止全部轨道。
pub struct PendingAccess<B: CameraBackend> {
    handle: Option<JoinHandle<OpenResult<B>>>,
}

/// 一次获取的结果，只能交给 `CameraManager::finish_access`。
pub struct AccessOutcome<B: CameraBackend>(OpenResult<B>);

impl<B: CameraBackend> PendingAccess<B> {
    /// 等待获取结束。可以在 `select!` 中反复调用，被取消不会丢失结果。
    pub async fn wait(&mut self) -> AccessOutcome<B> {
        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };

        let joined = handle.await;
        self.handle = None;
        AccessOutcome(joined.unwrap_or_else(|err| {
            Err(CameraError::Hardware(format!("摄像头获取任务异常结束：{}", err)))
        }))
    }
}

impl<B: CameraBackend> Drop for PendingAccess<B> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        runtime.spawn(async move {
            if let Ok(Ok((mut stream, _hold))) = handle.await {
                stream.stop_all_tracks();
                log::info!("📷 放弃请求后到达的媒体流已停止");
            }
        });
    }
}

struct HeldStream<S> {
    stream: S,
    _hold: DeviceHold,
}

/// 摄像头生命周期管理器。
pub struct CameraManager<B: CameraBackend> {
    device: CameraDevice<B>,
    facing: FacingMode,
    state: CameraState,
    held: Option<HeldStream<B::Stream>>,
    denial_reason: Option<String>,
}

impl<B: CameraBackend> CameraManager<B> {
    pub fn new(device: CameraDevice<B>, facing: FacingMode) -> Self {
        Self {
            device,
            facing,
            state: CameraState::Uninitialized,
            held: None,
            denial_reason: None,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    /// 最近一次获取失败的原因（人类可读）。
    pub fn denial_reason(&self) -> Option<&str> {
        self.denial_reason.as_deref()
    }

    /// 当前持有的存活轨道数。
    pub fn live_tracks(&self) -> usize {
        self.held
            .as_ref()
            .map(|held| held.stream.live_tracks())
            .unwrap_or(0)
    }

    /// 已持有媒体流时返回一个新的渲染目标，不会重新请求设备。
    pub fn frames(&mut self) -> Option<<B::Stream as MediaStream>::Frames> {
        self.held.as_mut().map(|held| held.stream.frames())
    }

    fn transition(&mut self, next: CameraState) {
        if self.state != next {
            log::debug!("📷 摄像头状态 {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// 请求摄像头并返回绑定到该流的渲染目标。
    ///
    /// 失败不会向外抛出：状态迁移到 `Denied`，原因可通过 `denial_reason` 读取，返回 `None`。
    /// 已处于 `Active` 时复用现有流，不会重复弹出权限提示。
    pub async fn request_access(
        &mut self,
    ) -> Option<<B::Stream as MediaStream>::Frames> {
        if let Some(frames) = self.frames() {
            return Some(frames);
        }

        let mut pending = self.begin_access();
        let outcome = pending.wait().await;
        self.finish_access(outcome)
    }

    /// 在后台任务中发起获取（弹出权限提示），立即返回。
    ///
    /// 调用方在等待期间可以继续处理其他事件，结果交给 `finish_access`；
    /// 放弃等待时丢弃 `PendingAccess` 并调用 `cancel_access`。
    pub fn begin_access(&mut self) -> PendingAccess<B> {
        self.transition(CameraState::PermissionPrompt);
        log::info!("📷 请求摄像头权限（facing={}）", self.facing.as_str());

        let device = self.device.clone();
        let facing = self.facing;
        PendingAccess {
            handle: Some(tokio::spawn(async move { device.open(facing).await })),
        }
    }

    /// 处理获取结果：成功进入 `Active` 并返回渲染目标，失败进入 `Denied`。
    pub fn finish_access(
        &mut self,
        outcome: AccessOutcome<B>,
    ) -> Option<<B::Stream as MediaStream>::Frames> {
        match outcome.0 {
            Ok((mut stream, hold)) => {
                self.transition(CameraState::Granted);
                let frames = stream.frames();
                log::info!("📷 摄像头已启动，存活轨道: {}", stream.live_tracks());
                self.held = Some(HeldStream { stream, _hold: hold });
                self.denial_reason = None;
                self.transition(CameraState::Active);
                Some(frames)
            }
            Err(err) => {
                log::warn!("📷 摄像头获取失败 [{}]: {}", err.code(), err);
                self.denial_reason = Some(err.to_string());
                self.transition(CameraState::Denied);
                None
            }
        }
    }

    /// 放弃进行中的获取。权限提示期间被暂停、切换或卸载时调用。
    pub fn cancel_access(&mut self) {
        if self.state == CameraState::PermissionPrompt {
            log::info!("📷 已放弃摄像头请求");
            self.transition(CameraState::Stopped);
        }
    }

    /// 停止全部轨道并释放句柄。
    ///
    /// 幂等：重复调用、未持有流、处于 `Denied` 时都是无操作。
    pub fn release(&mut self) {
        if let Some(mut held) = self.held.take() {
            held.stream.stop_all_tracks();
            log::info!("📷 摄像头已释放，剩余存活轨道: {}", held.stream.live_tracks());
            self.transition(CameraState::Stopped);
        }
    }
}

impl<B: CameraBackend> Drop for CameraManager<B> {
    fn drop(&mut self) {
        self.release();
    }
}
