//! # 会话事件总线
//!
//! ## 设计思路
//!
//! 界面层（提示条、结果卡片、计数器）通过注册回调接收会话事件。
//! 注册有明确的生命周期：挂载时 `register`，卸载时丢弃 `Registration`（或显式 `unregister`），
//! 不存在“最后挂载者覆盖全局回调”的问题，多个订阅者可以同时存在。
//!
//! ## 实现思路
//!
//! - 订阅表放在 `Arc<Mutex<..>>` 中，`Registration` 只持有 `Weak`，总线销毁后注销是无操作。
//! - 发布时先在锁内复制订阅者快照，再在锁外逐个回调，回调内部可以安全地注销自己。
//! - 锁中毒时继续使用恢复数据，事件分发不因某个回调 panic 而永久失效。

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::camera::CameraState;
use crate::verify::{ScanSource, VerificationResult};

/// 提示级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// 会话对外发布的事件。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    CameraStateChanged {
        state: CameraState,
    },
    PermissionError {
        reason: String,
    },
    VerificationStarted {
        dispatch: u64,
        source: ScanSource,
    },
    VerificationFinished {
        dispatch: u64,
        source: ScanSource,
        result: VerificationResult,
    },
    /// 结果展示时长已到，界面应清除结果卡片。
    ResultCleared,
    ScanCountChanged {
        count: u64,
    },
    Toast {
        severity: Severity,
        message: String,
    },
}

type Sink = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    sinks: Vec<(u64, Sink)>,
}

fn lock_inner(inner: &Mutex<BusInner>) -> MutexGuard<'_, BusInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("事件总线锁中毒，继续使用恢复数据");
            poisoned.into_inner()
        }
    }
}

/// 事件总线。克隆后共享同一张订阅表。
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<Mutex<BusInner>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者，返回注销守卫。
    pub fn register<F>(&self, sink: F) -> Registration
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut inner = lock_inner(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.sinks.push((id, Arc::new(sink)));
        log::debug!("📣 订阅者 #{} 已注册（共 {} 个）", id, inner.sinks.len());

        Registration {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 以通道形式订阅，适合异步消费方。
    pub fn register_channel(&self) -> (Registration, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registration = self.register(move |event| {
            let _ = tx.send(event.clone());
        });
        (registration, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        lock_inner(&self.inner).sinks.len()
    }

    pub fn publish(&self, event: SessionEvent) {
        let sinks: Vec<Sink> = lock_inner(&self.inner)
            .sinks
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();

        for sink in sinks {
            sink(&event);
        }
    }

    pub fn toast(&self, severity: Severity, message: impl Into<String>) {
        self.publish(SessionEvent::Toast {
            severity,
            message: message.into(),
        });
    }
}

/// 订阅注销守卫。
pub struct Registration {
    id: u64,
    bus: Weak<Mutex<BusInner>>,
}

impl Registration {
    pub fn unregister(self) {}
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut inner = lock_inner(&inner);
            inner.sinks.retain(|(id, _)| *id != self.id);
            log::debug!("📣 订阅者 #{} 已注销（剩余 {} 个）", self.id, inner.sinks.len());
        }
    }
}
