//! # 摄像头设备独占
//!
//! ## 设计思路
//!
//! 同一物理摄像头同一时刻只能被一个扫码会话持有。
//! `CameraDevice` 可以被多个会话克隆共享，但持有权通过 `DeviceHold` 表达：
//!
//! - 构造 `DeviceHold` 时原子地占用设备，已被占用则返回 `CameraError::Busy`
//! - `DeviceHold` 在 `Drop` 时释放占用（RAII），会话被丢弃或 panic 也不会让设备一直“忙”
//!
//! ## 实现思路
//!
//! 占用标志使用 `AtomicBool::compare_exchange`，无锁且跨线程安全。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CameraBackend, CameraError, FacingMode};

/// 可在会话间共享的摄像头设备。
pub struct CameraDevice<B: CameraBackend> {
    backend: Arc<B>,
    held: Arc<AtomicBool>,
}

impl<B: CameraBackend> Clone for CameraDevice<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            held: Arc::clone(&self.held),
        }
    }
}

impl<B: CameraBackend> CameraDevice<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 设备当前是否被某个会话持有。
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// 占用设备并打开媒体流。
    ///
    /// 打开失败时占用随 `DeviceHold` 一起被丢弃，设备立即恢复可用。
    pub(crate) async fn open(
        &self,
        facing: FacingMode,
    ) -> Result<(B::Stream, DeviceHold), CameraError> {
        let hold = DeviceHold::acquire(Arc::clone(&self.held))?;
        let stream = self.backend.open(facing).await?;
        Ok((stream, hold))
    }
}

/// 设备占用守卫。
#[derive(Debug)]
pub(crate) struct DeviceHold {
    held: Arc<AtomicBool>,
}

impl DeviceHold {
    fn acquire(held: Arc<AtomicBool>) -> Result<Self, CameraError> {
        held.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CameraError::Busy)?;
        log::debug!("📷 摄像头设备已占用");
        Ok(Self { held })
    }
}

impl Drop for DeviceHold {
    fn drop(&mut self) {
        self.held.store(false, Ordering::SeqCst);
        log::debug!("📷 摄像头设备占用已释放");
    }
}
