//! # 摄像头错误模型
//!
//! 摄像头获取失败全部在 `CameraManager` 边界内被捕获为状态（`DENIED` + 原因），
//! 该枚举只用于在边界内部区分失败来源，并生成给操作员看的提示文案。

/// 摄像头获取/使用过程中的错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    /// 用户或系统拒绝了摄像头权限。
    #[error("摄像头权限被拒绝：{0}")]
    PermissionDenied(String),

    /// 当前平台没有可用的摄像头接口。
    #[error("当前环境不支持摄像头：{0}")]
    Unsupported(String),

    /// 设备存在但打开失败（被占用、硬件故障、驱动错误）。
    #[error("摄像头硬件错误：{0}")]
    Hardware(String),

    /// 同一设备已被另一个扫码会话持有。
    #[error("摄像头正被其他扫码会话使用")]
    Busy,
}

impl CameraError {
    /// 稳定错误码，供 UI 或日志检索。
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "E_CAMERA_DENIED",
            Self::Unsupported(_) => "E_CAMERA_UNSUPPORTED",
            Self::Hardware(_) => "E_CAMERA_HARDWARE",
            Self::Busy => "E_CAMERA_BUSY",
        }
    }
}
