//! # 扫码会话
//!
//! ## 设计思路
//!
//! `ScanSession` 是整个扫码核心的聚合根，在界面挂载期间存在，独占：
//! 摄像头生命周期、解码循环、去重状态、校验管线、扫码计数、当前展示结果。
//!
//! 会话运行在单个异步任务中（单线程协作式事件循环），所有输入都排队进入同一个 `select!`：
//! - 界面命令（开启摄像头 / 暂停 / 恢复 / 切换方式 / 手动提交 / 卸载）
//! - 校验完成通知
//! - 解码事件
//! - 结果展示到期
//!
//! 因为只有这一个任务会读写会话状态，所以不需要任何锁；
//! 在途闸门保证同一时刻最多一个校验请求，结果天然按派发顺序返回。
//!
//! ## 实现思路
//!
//! - 权限提示在后台任务中等待，结果作为 `select!` 的一个分支回到事件循环；
//!   提示期间校验完成、展示到期、暂停和卸载都照常处理。
//! - 释放摄像头时先同步取消解码循环，再停止轨道；通道里残留的旧代事件按 `generation` 丢弃。
//! - 在途校验不随摄像头释放而取消，会话卸载后其结果被丢弃。
//! - 会话状态通过 `watch` 通道发布快照，事件通过 `NotificationBus` 广播。
//! - 所有命令都带 `oneshot` 回执，调用方可以确认命令已被事件循环处理。

use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use super::dedup::{DedupDecision, DedupState, DedupWindows, DispatchId};
use super::notify::{NotificationBus, SessionEvent, Severity};
use super::view::{ScanMethod, ScanView, derive_view};
use crate::camera::{
    AccessOutcome, CameraBackend, CameraDevice, CameraManager, CameraState, MediaStream,
    PendingAccess,
};
use crate::config::ScanConfig;
use crate::decode::{DECODE_EVENT_CHANNEL_CAPACITY, DecodeEvent, DecodeLoop, FrameDecoder};
use crate::error::AppError;
use crate::verify::manual::normalize_manual_token;
use crate::verify::{
    Completion, ScanSource, ScanStatus, VerificationPipeline, VerificationResult, Verifier,
};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// 对外发布的会话快照。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub mounted: bool,
    pub camera_state: CameraState,
    pub view: ScanView,
    pub method: ScanMethod,
    pub paused: bool,
    pub in_flight: bool,
    pub scan_count: u64,
    pub live_tracks: usize,
    pub displayed_result: Option<VerificationResult>,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            mounted: true,
            camera_state: CameraState::Uninitialized,
            view: ScanView::PermissionPrompt,
            method: ScanMethod::Camera,
            paused: false,
            in_flight: false,
            scan_count: 0,
            live_tracks: 0,
            displayed_result: None,
        }
    }
}

enum Command {
    EnableCamera(oneshot::Sender<CameraState>),
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<CameraState>),
    SwitchMethod(ScanMethod, oneshot::Sender<()>),
    SubmitManual(String, oneshot::Sender<Result<DispatchId, AppError>>),
    Shutdown { drain: bool, reply: oneshot::Sender<()> },
}

struct DisplayedResult {
    result: VerificationResult,
    clear_at: Instant,
}

/// 扫码会话（事件循环本体）。
pub struct ScanSession<B, D, V>
where
    B: CameraBackend,
    D: FrameDecoder + Clone,
    V: Verifier,
{
    config: ScanConfig,
    windows: DedupWindows,
    camera: CameraManager<B>,
    access: Option<PendingAccess<B>>,
    access_waiters: Vec<oneshot::Sender<CameraState>>,
    decoder: D,
    decode_loop: Option<DecodeLoop>,
    generation: u64,
    decode_tx: mpsc::Sender<DecodeEvent>,
    decode_rx: mpsc::Receiver<DecodeEvent>,
    pipeline: VerificationPipeline<V>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    commands: mpsc::Receiver<Command>,
    dedup: DedupState,
    scan_count: u64,
    method: ScanMethod,
    paused: bool,
    displayed: Option<DisplayedResult>,
    bus: NotificationBus,
    snapshot: watch::Sender<SessionSnapshot>,
    draining: Option<oneshot::Sender<()>>,
}

/// 会话句柄：界面层持有，可克隆。
#[derive(Clone)]
pub struct ScanSessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    bus: NotificationBus,
}

impl<B, D, V> ScanSession<B, D, V>
where
    B: CameraBackend,
    D: FrameDecoder + Clone,
    V: Verifier,
{
    /// 创建会话。配置在此处校验，不合法的时间窗不会进入运行期。
    pub fn new(
        config: ScanConfig,
        device: CameraDevice<B>,
        decoder: D,
        verifier: Arc<V>,
        bus: NotificationBus,
    ) -> Result<(Self, ScanSessionHandle), AppError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (decode_tx, decode_rx) = mpsc::channel(DECODE_EVENT_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial());

        let session = Self {
            windows: DedupWindows::from(&config),
            camera: CameraManager::new(device, config.facing),
            access: None,
            access_waiters: Vec::new(),
            pipeline: VerificationPipeline::new(verifier, config.request_timeout(), completion_tx),
            config,
            decoder,
            decode_loop: None,
            generation: 0,
            decode_tx,
            decode_rx,
            completion_rx,
            commands: command_rx,
            dedup: DedupState::new(),
            scan_count: 0,
            method: ScanMethod::Camera,
            paused: false,
            displayed: None,
            bus: bus.clone(),
            snapshot: snapshot_tx,
            draining: None,
        };

        let handle = ScanSessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            bus,
        };

        Ok((session, handle))
    }

    /// 创建并在后台任务中运行会话。
    pub fn spawn(
        config: ScanConfig,
        device: CameraDevice<B>,
        decoder: D,
        verifier: Arc<V>,
        bus: NotificationBus,
    ) -> Result<(ScanSessionHandle, JoinHandle<()>), AppError> {
        let (session, handle) = Self::new(config, device, decoder, verifier, bus)?;
        Ok((handle, tokio::spawn(session.run())))
    }

    /// 事件循环。所有句柄被丢弃或收到卸载命令时退出，退出前释放摄像头。
    pub async fn run(mut self) {
        log::info!("🎬 扫码会话已挂载");

        loop {
            let clear_at = self.displayed.as_ref().map(|d| d.clear_at);

            tokio::select! {
                biased;

                command = self.commands.recv(), if self.draining.is_none() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(completion) = self.completion_rx.recv() => {
                    self.on_completion(completion);
                    if !self.dedup.is_in_flight() {
                        if let Some(reply) = self.draining.take() {
                            let _ = reply.send(());
                            break;
                        }
                    }
                }
                outcome = wait_access(&mut self.access) => self.on_access(outcome),
                Some(event) = self.decode_rx.recv() => self.on_decode_event(event),
                _ = sleep_until_opt(clear_at) => self.clear_displayed(),
            }

            self.publish_snapshot();
        }

        self.unmount();
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::EnableCamera(reply) => self.start_camera(Some(reply)),
            Command::Pause(reply) => {
                self.pause();
                let _ = reply.send(());
            }
            Command::Resume(reply) => {
                self.paused = false;
                self.start_camera(Some(reply));
            }
            Command::SwitchMethod(method, reply) => {
                self.switch_method(method);
                let _ = reply.send(());
            }
            Command::SubmitManual(raw, reply) => {
                let _ = reply.send(self.submit_manual(&raw));
            }
            Command::Shutdown { drain, reply } => {
                if drain {
                    self.drain_decode_events();
                }
                self.release_camera();
                if drain && self.dedup.is_in_flight() {
                    log::info!("🎬 等待在途校验完成后卸载");
                    self.draining = Some(reply);
                } else {
                    let _ = reply.send(());
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// 开启摄像头。已激活时直接回复；否则发起（或加入进行中的）权限请求，
    /// 回执在请求结束时由 `on_access` 发出。
    fn start_camera(&mut self, reply: Option<oneshot::Sender<CameraState>>) {
        if self.method != ScanMethod::Camera {
            log::debug!("📷 当前为手动输入模式，忽略开启摄像头");
            if let Some(reply) = reply {
                let _ = reply.send(self.camera.state());
            }
            return;
        }

        if let Some(frames) = self.camera.frames() {
            self.paused = false;
            self.ensure_decode_loop(frames);
            if let Some(reply) = reply {
                let _ = reply.send(self.camera.state());
            }
            return;
        }

        self.access_waiters.extend(reply);
        if self.access.is_none() {
            self.publish_camera_state(CameraState::PermissionPrompt);
            self.access = Some(self.camera.begin_access());
        }
    }

    fn on_access(&mut self, outcome: AccessOutcome<B>) {
        self.access = None;

        match self.camera.finish_access(outcome) {
            Some(frames) => {
                self.paused = false;
                self.ensure_decode_loop(frames);
            }
            None => {
                let reason = self
                    .camera
                    .denial_reason()
                    .unwrap_or("摄像头不可用")
                    .to_string();
                self.bus.publish(SessionEvent::PermissionError {
                    reason: reason.clone(),
                });
                self.bus.toast(Severity::Error, reason);
            }
        }

        let state = self.camera.state();
        self.publish_camera_state(state);
        self.reply_access_waiters(state);
    }

    fn ensure_decode_loop(&mut self, frames: <B::Stream as MediaStream>::Frames) {
        if self.decode_loop.as_ref().is_none_or(DecodeLoop::is_finished) {
            self.generation += 1;
            self.decode_loop = Some(DecodeLoop::spawn(
                frames,
                self.decoder.clone(),
                self.generation,
                self.decode_tx.clone(),
            ));
        }
    }

    fn reply_access_waiters(&mut self, state: CameraState) {
        for waiter in self.access_waiters.drain(..) {
            let _ = waiter.send(state);
        }
    }

    fn pause(&mut self) {
        self.paused = true;
        self.release_camera();
        log::info!("⏸️ 扫码已暂停");
    }

    fn switch_method(&mut self, method: ScanMethod) {
        if self.method == method {
            return;
        }
        log::info!("🔀 扫码方式 {:?} -> {:?}", self.method, method);
        self.method = method;

        match method {
            ScanMethod::Manual => {
                self.paused = false;
                self.release_camera();
            }
            ScanMethod::Camera => self.start_camera(None),
        }
    }

    fn submit_manual(&mut self, raw: &str) -> Result<DispatchId, AppError> {
        let token = normalize_manual_token(raw)?;
        let dispatch = self
            .dedup
            .begin_manual()
            .map_err(|_| AppError::SessionBusy)?;

        self.pipeline.dispatch(dispatch, ScanSource::Manual, token);
        self.bus.publish(SessionEvent::VerificationStarted {
            dispatch: dispatch.get(),
            source: ScanSource::Manual,
        });
        Ok(dispatch)
    }

    /// 同步失效解码循环，再停止轨道。任何离开 `Active` 的路径都经过这里。
    fn release_camera(&mut self) {
        if let Some(decode_loop) = self.decode_loop.take() {
            decode_loop.cancel();
        }

        let before = self.camera.state();
        if self.access.take().is_some() {
            self.camera.cancel_access();
        }
        self.camera.release();
        let after = self.camera.state();
        if before != after {
            self.publish_camera_state(after);
        }
        self.reply_access_waiters(after);
    }

    /// 处理已排队的解码事件。收尾卸载时在释放摄像头之前调用。
    fn drain_decode_events(&mut self) {
        while let Ok(event) = self.decode_rx.try_recv() {
            self.on_decode_event(event);
        }
    }

    fn is_live_generation(&self, generation: u64) -> bool {
        self.decode_loop
            .as_ref()
            .is_some_and(|l| l.generation() == generation)
    }

    fn on_decode_event(&mut self, event: DecodeEvent) {
        if !self.is_live_generation(event.generation)
            || self.paused
            || self.method != ScanMethod::Camera
        {
            log::trace!("🔍 丢弃失效解码事件（generation={}）", event.generation);
            return;
        }

        match self.dedup.evaluate(&event.token, event.at, &self.windows) {
            DedupDecision::Accept(dispatch) => {
                self.pipeline.dispatch(dispatch, ScanSource::Camera, event.token);
                self.bus.publish(SessionEvent::VerificationStarted {
                    dispatch: dispatch.get(),
                    source: ScanSource::Camera,
                });
            }
            DedupDecision::Reject(_) => {}
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let now = Instant::now();
        let Completion {
            dispatch,
            source,
            result,
            elapsed,
        } = completion;

        if !self
            .dedup
            .complete(dispatch, result.is_error(), now, &self.windows)
        {
            return;
        }

        log::debug!(
            "🎫 会话处理校验 #{} 结果（{}ms）",
            dispatch.get(),
            elapsed.as_millis()
        );

        if result.counts_as_scan() {
            self.scan_count += 1;
            self.bus.publish(SessionEvent::ScanCountChanged {
                count: self.scan_count,
            });
        }

        let severity = match result.status {
            ScanStatus::Success => Severity::Success,
            ScanStatus::AlreadyScanned => Severity::Info,
            ScanStatus::Error => Severity::Error,
        };
        self.bus.toast(severity, result.message.clone());
        self.bus.publish(SessionEvent::VerificationFinished {
            dispatch: dispatch.get(),
            source,
            result: result.clone(),
        });

        self.displayed = Some(DisplayedResult {
            result,
            clear_at: now + self.config.result_display(),
        });
    }

    fn clear_displayed(&mut self) {
        if self.displayed.take().is_some() {
            self.bus.publish(SessionEvent::ResultCleared);
        }
    }

    fn publish_camera_state(&self, state: CameraState) {
        self.bus.publish(SessionEvent::CameraStateChanged { state });
    }

    fn publish_snapshot(&self) {
        let in_flight = self.dedup.is_in_flight();
        let camera_state = self.camera.state();
        self.snapshot.send_replace(SessionSnapshot {
            mounted: true,
            camera_state,
            view: derive_view(
                self.method,
                camera_state,
                self.paused,
                in_flight,
                self.camera.denial_reason(),
            ),
            method: self.method,
            paused: self.paused,
            in_flight,
            scan_count: self.scan_count,
            live_tracks: self.camera.live_tracks(),
            displayed_result: self.displayed.as_ref().map(|d| d.result.clone()),
        });
    }

    fn unmount(&mut self) {
        self.release_camera();
        if self.dedup.is_in_flight() {
            log::info!("🎬 会话卸载时仍有校验在途，其结果将被丢弃");
        }
        self.publish_snapshot();
        self.snapshot.send_modify(|snapshot| snapshot.mounted = false);
        log::info!("🎬 扫码会话已卸载（本次扫码 {} 次）", self.scan_count);
    }
}

async fn wait_access<B: CameraBackend>(access: &mut Option<PendingAccess<B>>) -> AccessOutcome<B> {
    match access {
        Some(pending) => pending.wait().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ScanSessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| AppError::SessionClosed)?;
        reply_rx.await.map_err(|_| AppError::SessionClosed)
    }

    /// 请求摄像头，返回请求后的摄像头状态。
    pub async fn enable_camera(&self) -> Result<CameraState, AppError> {
        self.request(Command::EnableCamera).await
    }

    /// 暂停扫码并释放摄像头。
    pub async fn pause(&self) -> Result<(), AppError> {
        self.request(Command::Pause).await
    }

    /// 恢复扫码（重新请求摄像头）。
    pub async fn resume(&self) -> Result<CameraState, AppError> {
        self.request(Command::Resume).await
    }

    pub async fn switch_method(&self, method: ScanMethod) -> Result<(), AppError> {
        self.request(|reply| Command::SwitchMethod(method, reply)).await
    }

    /// 手动提交票据码（绕过去重，仅受在途闸门约束）。
    pub async fn submit_manual(&self, token: impl Into<String>) -> Result<DispatchId, AppError> {
        let token = token.into();
        self.request(|reply| Command::SubmitManual(token, reply)).await?
    }

    /// 立即卸载会话。在途校验继续执行，但结果被丢弃。
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.request(|reply| Command::Shutdown { drain: false, reply })
            .await
    }

    /// 释放摄像头并等待在途校验结束后卸载。
    pub async fn finish(&self) -> Result<(), AppError> {
        self.request(|reply| Command::Shutdown { drain: true, reply })
            .await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 等待快照满足条件。
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot, AppError>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut receiver = self.snapshot.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| AppError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }
}
