//! Streaming controller — the periodic block loop used by both roles
//!
//! One logical task per direction. The loop builds a fixed-size block,
//! stamps the sequence header, hands it to a `BlockSink` (peripheral:
//! notify all DATA subscribers; central: write DATA_RX), sleeps one
//! period and repeats until cancelled. The cancel flag is checked every
//! iteration, so stop latency is bounded by one period.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::build_block;

/// Destination of one stream direction.
#[async_trait]
pub trait BlockSink: Send + Sync {
    /// Deliver one block to the current recipient set. Errors are the
    /// sink's report of a failed send; the loop logs them and keeps
    /// going; a departed recipient is not a reason to stop streaming.
    async fn send_block(&self, seq: u32, block: Vec<u8>) -> Result<(), String>;
}

struct ActiveStream {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Cancellable periodic block generator. `start` while active is a
/// logged no-op; `stop` is idempotent.
pub struct StreamController {
    active: Mutex<Option<ActiveStream>>,
}

impl StreamController {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    /// Whether a loop is currently running.
    pub fn is_active(&self) -> bool {
        let mut active = self.active.lock();
        let running = active
            .as_ref()
            .map(|stream| !stream.task.is_finished())
            .unwrap_or(false);
        if !running {
            // Release any stale handle from a loop that ended on its own
            *active = None;
        }
        running
    }

    /// Start the loop. Returns `false` (and changes nothing) when a
    /// loop is already active.
    pub fn start(&self, block_size: usize, period: Duration, sink: Arc<dyn BlockSink>) -> bool {
        let mut active = self.active.lock();
        if let Some(stream) = active.as_ref() {
            if !stream.task.is_finished() {
                debug!("stream already active, start ignored");
                return false;
            }
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let task = tokio::spawn(async move {
            let mut seq: u32 = 0;
            loop {
                if cancel_flag.load(Ordering::Acquire) {
                    break;
                }
                let block = build_block(seq, block_size);
                if let Err(e) = sink.send_block(seq, block).await {
                    warn!("stream send failed at seq {}: {}", seq, e);
                }
                seq = seq.wrapping_add(1);
                tokio::time::sleep(period).await;
            }
            debug!("stream loop ended after {} blocks", seq);
        });

        *active = Some(ActiveStream { cancel, task });
        true
    }

    /// Cancel the loop. No-op when nothing is running or the loop
    /// already finished; safe to call any number of times.
    pub fn stop(&self) {
        let stream = self.active.lock().take();
        if let Some(stream) = stream {
            stream.cancel.store(true, Ordering::Release);
        }
    }
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}
