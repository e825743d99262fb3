//! Inbound frame queue between the radio callback and the decoder thread.
//!
//! ```text
//! ┌──────────────┐  push (never blocks)  ┌─────────────┐  recv  ┌──────────────┐
//! │ BLE write CB │──────────────────────▶│ FrameInbox  │───────▶│ decoder loop │
//! └──────────────┘                       └─────────────┘        └──────────────┘
//! ```
//!
//! The radio context must never block, so a full queue drops the frame,
//! logs it and counts it for the decoder to report.  The decoder handles one frame at a time, which
//! serialises every command handler.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

/// Largest frame accepted from the radio (one BLE attribute write).
pub const FRAME_CAPACITY: usize = 512;

/// Frames buffered before the radio side starts dropping.
pub const INBOX_DEPTH: usize = 8;

pub type Frame = heapless::Vec<u8, FRAME_CAPACITY>;

pub struct FrameInbox {
    channel: Channel<CriticalSectionRawMutex, Frame, INBOX_DEPTH>,
    dropped: AtomicU32,
}

impl Default for FrameInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue a frame from the radio context.  Returns `false` when the
    /// frame was dropped (oversized or queue full).
    pub fn push(&self, bytes: &[u8]) -> bool {
        let Ok(frame) = Frame::from_slice(bytes) else {
            warn!("Inbox: dropping {}-byte frame (max {})", bytes.len(), FRAME_CAPACITY);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        if self.channel.try_send(frame).is_err() {
            warn!("Inbox: queue full, frame dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.channel.try_receive().ok()
    }

    /// Block the calling thread until a frame arrives.
    pub fn recv(&self) -> Frame {
        futures_lite::future::block_on(self.channel.receive())
    }

    /// Frames dropped since the last call.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

/// Process-wide inbox fed by the BLE adapter.
pub static INBOX: FrameInbox = FrameInbox::new();
