//! # 平台摄像头接口
//!
//! ## 设计思路
//!
//! 摄像头采集是外部协作方（浏览器 `getUserMedia`、V4L2、PipeWire 等），
//! 这里只定义会话核心依赖的最小契约：
//!
//! - `CameraBackend`：按朝向偏好打开一路媒体流（唯一会弹出权限提示的操作）
//! - `MediaStream`：持有中的媒体流句柄，可统计存活轨道、停止全部轨道
//! - `FrameSource`：绑定到媒体流的“渲染目标”，逐帧拉取画面
//!
//! ## 实现思路
//!
//! 停止轨道后 `FrameSource::next_frame` 必须返回 `None`，
//! 解码循环据此自然结束，不需要额外的跨任务通知。

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::CameraError;

/// 摄像头朝向偏好。
///
/// 扫码默认偏好后置摄像头（`environment`），与手机浏览器的约定一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// 后置摄像头。
    #[default]
    Environment,
    /// 前置摄像头。
    User,
}

impl FacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::User => "user",
        }
    }
}

/// 一帧画面。
///
/// 像素格式由具体后端与解码器约定，核心只负责搬运。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

/// 逐帧拉取画面的渲染目标。
pub trait FrameSource: Send + 'static {
    /// 拉取下一帧；媒体流已结束或轨道已停止时返回 `None`。
    fn next_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send;
}

/// 持有中的媒体流句柄。
pub trait MediaStream: Send + 'static {
    type Frames: FrameSource;

    /// 把媒体流绑定到一个新的渲染目标。
    fn frames(&mut self) -> Self::Frames;

    /// 当前仍在采集的轨道数量。
    fn live_tracks(&self) -> usize;

    /// 停止全部轨道。重复调用必须是无操作。
    fn stop_all_tracks(&mut self);
}

/// 平台摄像头接口。
pub trait CameraBackend: Send + Sync + 'static {
    type Stream: MediaStream;

    /// 请求摄像头权限并打开媒体流。
    ///
    /// 这是整个核心中唯一会触发系统权限弹窗的调用，本身就是一个挂起点。
    fn open(
        &self,
        facing: FacingMode,
    ) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;
}
