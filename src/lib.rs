//! # UniPass 扫码签到 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            界面层（扫码页 / 站点程序 main.rs）              │
//! │                                                          │
//! │   ScanSessionHandle ── NotificationBus ── SessionSnapshot │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ 命令 + 事件 (Result<T, AppError>)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            会话核心                                │
//! │                                                          │
//! │  ┌─ scan ──────── ScanSession 事件循环                    │
//! │  │   ├─ dedup          在途闸门 · 同码抑制 · 冷却           │
//! │  │   ├─ notify         会话事件总线                        │
//! │  │   └─ view           派生展示状态                        │
//! │  │                                                       │
//! │  ├─ camera ────── CameraManager + DeviceHold (RAII)      │
//! │  ├─ decode ────── DecodeLoop（按 generation 失效）         │
//! │  ├─ verify ────── HttpVerifier (reqwest) + 管线 + 手动输入 │
//! │  ├─ config ────── ScanConfig / ApiConfig                 │
//! │  ├─ settings ──── settings.json 读写                      │
//! │  └─ error ─────── AppError（统一错误类型）                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，会话句柄与站点程序的返回类型 |
//! | [`camera`] | 摄像头权限、媒体流持有与释放、设备独占 |
//! | [`decode`] | 从渲染目标拉帧、调用解码器、发出解码事件 |
//! | [`scan`] | 去重判定、会话事件循环、事件总线、展示状态 |
//! | [`verify`] | 后端校验客户端、在途请求管线、结果模型 |
//! | [`config`] | 时间窗配置、档位、后端地址解析 |
//! | [`settings`] | 设置文件加载与保存 |

pub mod error;
pub mod camera;
pub mod config;
pub mod decode;
pub mod scan;
pub mod settings;
pub mod verify;
