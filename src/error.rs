//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，汇总校验、配置、设置文件等子系统的错误，
//! 会话句柄、手动输入入口与站点程序都返回 `Result<T, AppError>`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为各子系统错误提供 `From` 转换，调用侧直接 `?`。
//! - 实现 `Serialize` 将错误序列化为字符串，方便任何界面层直接展示。

use serde::Serialize;

use crate::config::ConfigError;
use crate::verify::VerifyError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 校验请求失败
    #[error("{0}")]
    Verify(#[from] VerifyError),

    /// 配置不合法
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 设置文件读写失败
    #[error("设置文件错误: {0}")]
    Settings(String),

    /// 操作员输入不合法
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 已有校验请求在途
    #[error("上一次校验尚未完成，请稍候")]
    SessionBusy,

    /// 会话已卸载
    #[error("扫码会话已结束")]
    SessionClosed,
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
