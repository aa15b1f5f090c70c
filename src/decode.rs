//! # 帧解码循环
//!
//! ## 设计思路
//!
//! 二维码识别本身交给外部解码器（`FrameDecoder`），这里只负责集成契约：
//! - 从渲染目标持续拉帧，交给解码器，成功识别的字符串作为 `DecodeEvent` 发出
//! - 单帧识别失败不是错误，下一帧自然重试
//! - 循环必须可以被同步取消，并且取消后迟到的事件不能影响会话
//!
//! ## 实现思路
//!
//! - 每次启动循环都带一个递增的 `generation`，事件携带该值；
//!   会话只接受当前代的事件，释放摄像头后残留在通道里的旧事件会被直接忽略。
//! - `cancel` 同时设置取消标志并 `abort` 任务，二者都是同步操作。
//! - 事件通道有界，积压时丢弃新帧（与摄像头丢帧语义一致），不阻塞拉帧。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::camera::{Frame, FrameSource};

pub const DECODE_EVENT_CHANNEL_CAPACITY: usize = 256;

/// 外部二维码解码器。
pub trait FrameDecoder: Send + 'static {
    /// 尝试从一帧中识别出字符串；识别失败返回 `None`。
    fn decode(&mut self, frame: &Frame) -> Option<String>;
}

/// 文本帧解码器：帧内容即 UTF-8 文本（配合扫码枪后端使用）。
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl FrameDecoder for TextDecoder {
    fn decode(&mut self, frame: &Frame) -> Option<String> {
        std::str::from_utf8(&frame.data).ok().map(str::to_string)
    }
}

/// 一次成功识别。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeEvent {
    pub token: String,
    pub at: Instant,
    pub generation: u64,
}

/// 运行中的解码循环。
pub struct DecodeLoop {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl DecodeLoop {
    /// 在后台任务中启动解码循环。
    pub fn spawn<F, D>(
        mut frames: F,
        mut decoder: D,
        generation: u64,
        events: mpsc::Sender<DecodeEvent>,
    ) -> Self
    where
        F: FrameSource,
        D: FrameDecoder,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = tokio::spawn(async move {
            let mut decoded: u64 = 0;
            let mut empty: u64 = 0;

            while let Some(frame) = frames.next_frame().await {
                if flag.load(Ordering::SeqCst) {
                    break;
                }

                let Some(raw) = decoder.decode(&frame) else {
                    empty += 1;
                    continue;
                };
                let token = raw.trim();
                if token.is_empty() {
                    empty += 1;
                    continue;
                }

                decoded += 1;
                let event = DecodeEvent {
                    token: token.to_string(),
                    at: Instant::now(),
                    generation,
                };
                match events.try_send(event) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::trace!("🔍 解码事件积压，丢弃一帧（generation={}）", generation);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }

            log::debug!(
                "🔍 解码循环结束（generation={}，识别 {} 次，空帧 {} 次）",
                generation,
                decoded,
                empty
            );
        });

        log::debug!("🔍 解码循环已启动（generation={}）", generation);
        Self {
            generation,
            cancelled,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 同步取消循环。重复调用无副作用。
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.handle.abort();
            log::debug!("🔍 解码循环已取消（generation={}）", self.generation);
        }
    }
}

impl Drop for DecodeLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::text::text_frame;
    use crate::camera::{CameraBackend, FacingMode, MediaStream, TextCamera};

    #[test]
    fn text_decoder_rejects_invalid_utf8() {
        let mut decoder = TextDecoder;
        assert_eq!(decoder.decode(&text_frame("T1")), Some("T1".to_string()));
        assert_eq!(decoder.decode(&Frame::new(2, 1, vec![0xff, 0xfe])), None);
    }

    #[tokio::test]
    async fn loop_emits_trimmed_tokens_and_skips_blank_frames() {
        let (camera, feed) = TextCamera::new();
        let mut stream = camera.open(FacingMode::Environment).await.expect("open should succeed");
        let (tx, mut rx) = mpsc::channel(DECODE_EVENT_CHANNEL_CAPACITY);
        let decode_loop = DecodeLoop::spawn(stream.frames(), TextDecoder, 7, tx);

        feed.push("   ");
        feed.push("  T1 \r");

        let event = rx.recv().await.expect("event expected");
        assert_eq!(event.token, "T1");
        assert_eq!(event.generation, 7);

        decode_loop.cancel();
        decode_loop.cancel();
        stream.stop_all_tracks();
    }

    #[tokio::test]
    async fn loop_ends_when_tracks_stop() {
        let (camera, _feed) = TextCamera::new();
        let mut stream = camera.open(FacingMode::Environment).await.expect("open should succeed");
        let (tx, mut rx) = mpsc::channel(DECODE_EVENT_CHANNEL_CAPACITY);
        let _decode_loop = DecodeLoop::spawn(stream.frames(), TextDecoder, 1, tx);

        stream.stop_all_tracks();

        assert!(rx.recv().await.is_none());
    }
}
