//! # 扫码会话控制
//!
//! ```text
//!  界面命令 ──→ ScanSessionHandle ──mpsc──┐
//!                                        ▼
//!  DecodeLoop ──DecodeEvent──→ ScanSession ──→ dedup ──Accept──→ VerificationPipeline
//!                                 ▲   │                                │
//!                  Completion ────┘   └──→ NotificationBus / watch 快照  │
//!                  (unbounded) ←──────────────────────────────────────┘
//! ```
//!
//! - [`dedup`]：纯逻辑去重判定（在途闸门 / 同码抑制 / 冷却）
//! - [`notify`]：会话事件总线，界面层按生命周期注册
//! - [`view`]：派生展示状态
//! - [`session`]：事件循环本体与句柄

mod dedup;
mod notify;
mod session;
mod view;

pub use dedup::{DedupDecision, DedupState, DedupWindows, DispatchId, RejectReason};
pub use notify::{NotificationBus, Registration, SessionEvent, Severity};
pub use session::{ScanSession, ScanSessionHandle, SessionSnapshot};
pub use view::{ScanMethod, ScanView, derive_view};
