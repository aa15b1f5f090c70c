//! 扫码界面展示状态
//!
//! 纯展示用的派生状态：由摄像头状态、暂停标志、在途标志推导，
//! 保证操作员任何时刻看到的都是“扫描中 / 处理中 / 已暂停 / 需授权 / 授权失败”之一。

use serde::Serialize;

use crate::camera::CameraState;

/// 扫码方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMethod {
    #[default]
    Camera,
    Manual,
}

/// 扫码界面展示状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ScanView {
    PermissionPrompt,
    PermissionDenied { reason: String },
    Scanning,
    Processing,
    Paused,
    ManualEntry,
}

/// 推导展示状态。
pub fn derive_view(
    method: ScanMethod,
    camera: CameraState,
    paused: bool,
    in_flight: bool,
    denial_reason: Option<&str>,
) -> ScanView {
    if in_flight {
        return ScanView::Processing;
    }

    if method == ScanMethod::Manual {
        return ScanView::ManualEntry;
    }

    match camera {
        CameraState::Denied => ScanView::PermissionDenied {
            reason: denial_reason.unwrap_or("摄像头不可用").to_string(),
        },
        CameraState::Active if !paused => ScanView::Scanning,
        _ if paused => ScanView::Paused,
        _ => ScanView::PermissionPrompt,
    }
}
