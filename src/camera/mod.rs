//! # 摄像头模块（camera）
//!
//! ## 设计思路
//!
//! 摄像头是扫码会话中唯一的硬件资源，一旦泄漏（未停止轨道）就会让指示灯常亮、
//! 并阻止其他应用使用摄像头。本模块把“获取 → 持有 → 释放”收敛到少数几个类型：
//!
//! - `backend`：平台接口契约（`CameraBackend` / `MediaStream` / `FrameSource`）
//! - `device`：设备独占（同一时刻只允许一个会话持有）
//! - `manager`：会话内的生命周期管理与 `CameraState` 状态机
//! - `text`：键盘楔形扫码枪后端，把文本行当作已识别的画面
//! - `error`：`CameraError`
//!
//! ## 调用链
//!
//! ```text
//! ScanSession
//!    ↓ request_access / release
//! CameraManager ── CameraState
//!    ↓ open（占用设备）
//! CameraDevice ── DeviceHold (RAII)
//!    ↓
//! CameraBackend::open → MediaStream → FrameSource
//! ```

mod backend;
mod device;
mod error;
mod manager;
pub mod text;

pub use backend::{CameraBackend, FacingMode, Frame, FrameSource, MediaStream};
pub use device::CameraDevice;
pub use error::CameraError;
pub use manager::{AccessOutcome, CameraManager, CameraState, PendingAccess};
pub use text::{TextCamera, TextFeed};
