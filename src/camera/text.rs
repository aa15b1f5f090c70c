//! # 文本摄像头（键盘楔形扫码枪）
//!
//! ## 设计思路
//!
//! USB 扫码枪通常以“键盘输入”的方式工作：每扫到一次码就输入一行文本。
//! 把它建模成一个特殊的摄像头后端，每一行就是一帧“已经识别好”的画面，
//! 这样扫码枪与真实摄像头走完全相同的会话链路（生命周期 → 解码循环 → 去重 → 校验）。
//!
//! ## 实现思路
//!
//! - 行数据通过 `broadcast` 通道分发，每次绑定渲染目标都会新建订阅者。
//! - 摄像头未激活（暂停、切换到手动模式）期间推入的行没有订阅者，直接丢弃，
//!   与真实摄像头“没开就看不到”一致。
//! - 轨道存活状态用 `watch` 通道表达，停止轨道会立即唤醒正在等帧的渲染目标。
//! - 送达与消费计数放在共享的 `watch` 通道里。渲染目标在下一次取帧时才确认上一行，
//!   此时上一行对应的解码事件已经发出，`TextFeed::drained` 据此判断输入已走完解码循环。

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use super::{CameraBackend, CameraError, FacingMode, Frame, FrameSource, MediaStream};

const TEXT_FEED_CAPACITY: usize = 64;

/// 从文本行构造一帧画面。
pub fn text_frame(line: &str) -> Frame {
    Frame::new(line.len() as u32, 1, line.as_bytes().to_vec())
}

#[derive(Debug, Clone, Copy, Default)]
struct FeedProgress {
    delivered: u64,
    consumed: u64,
}

type SharedProgress = Arc<watch::Sender<FeedProgress>>;

/// 文本摄像头后端。
pub struct TextCamera {
    feed: broadcast::Sender<String>,
    progress: SharedProgress,
}

/// 向文本摄像头推送扫码行的句柄。
#[derive(Clone)]
pub struct TextFeed {
    feed: broadcast::Sender<String>,
    progress: SharedProgress,
}

impl TextCamera {
    pub fn new() -> (Self, TextFeed) {
        let (feed, _) = broadcast::channel(TEXT_FEED_CAPACITY);
        let (progress, _) = watch::channel(FeedProgress::default());
        let progress = Arc::new(progress);
        (
            Self {
                feed: feed.clone(),
                progress: Arc::clone(&progress),
            },
            TextFeed { feed, progress },
        )
    }
}

impl TextFeed {
    /// 推送一行扫码内容，返回实际接收到该行的渲染目标数量。
    pub fn push(&self, line: impl Into<String>) -> usize {
        let receivers = self.feed.send(line.into()).unwrap_or(0);
        if receivers > 0 {
            self.progress
                .send_modify(|progress| progress.delivered += receivers as u64);
        }
        receivers
    }

    /// 等待已送达的每一行都被渲染目标取走并处理完（或随渲染目标一起丢弃）。
    pub async fn drained(&self) {
        let mut progress = self.progress.subscribe();
        let _ = progress
            .wait_for(|progress| progress.consumed >= progress.delivered)
            .await;
    }
}

impl CameraBackend for TextCamera {
    type Stream = TextStream;

    async fn open(&self, facing: FacingMode) -> Result<TextStream, CameraError> {
        log::debug!("⌨️ 文本摄像头忽略朝向偏好: {}", facing.as_str());
        let (live, _) = watch::channel(true);
        Ok(TextStream {
            feed: self.feed.clone(),
            progress: Arc::clone(&self.progress),
            live,
        })
    }
}

/// 文本摄像头的媒体流。
pub struct TextStream {
    feed: broadcast::Sender<String>,
    progress: SharedProgress,
    live: watch::Sender<bool>,
}

impl MediaStream for TextStream {
    type Frames = TextFrames;

    fn frames(&mut self) -> TextFrames {
        TextFrames {
            lines: self.feed.subscribe(),
            live: self.live.subscribe(),
            progress: Arc::clone(&self.progress),
            unacknowledged: 0,
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(*self.live.borrow())
    }

    fn stop_all_tracks(&mut self) {
        self.live.send_replace(false);
    }
}

/// 绑定到文本媒体流的渲染目标。
pub struct TextFrames {
    lines: broadcast::Receiver<String>,
    live: watch::Receiver<bool>,
    progress: SharedProgress,
    unacknowledged: u64,
}

impl TextFrames {
    fn acknowledge(&mut self, lines: u64) {
        let lines = lines + std::mem::take(&mut self.unacknowledged);
        if lines > 0 {
            self.progress
                .send_modify(|progress| progress.consumed += lines);
        }
    }
}

impl FrameSource for TextFrames {
    async fn next_frame(&mut self) -> Option<Frame> {
        self.acknowledge(0);

        loop {
            if !*self.live.borrow() {
                return None;
            }

            tokio::select! {
                received = self.lines.recv() => match received {
                    Ok(line) => {
                        self.unacknowledged = 1;
                        return Some(text_frame(&line));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::trace!("⌨️ 文本摄像头跳过 {} 帧", skipped);
                        self.acknowledge(skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                changed = self.live.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

impl Drop for TextFrames {
    fn drop(&mut self) {
        let unread = self.lines.len() as u64;
        self.acknowledge(unread);
    }
}
