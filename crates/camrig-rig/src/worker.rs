//! Per-device acquisition workers.
//!
//! Each device gets its own thread pulling frames from its [`FrameSource`]
//! into a bounded queue. The control/render tick drains the queue without
//! blocking, so one slow device cannot stall the rest of the rig, and modal
//! UI states pause only rendering dispatch while acquisition keeps running.

use std::sync::mpsc::{sync_channel, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::device::FrameSource;
use crate::error::RigError;
use crate::frame::Frame;

/// Bounded queue depth between a worker and the tick loop. Two slots are
/// enough for latest-wins consumption without ever blocking the producer on
/// a healthy consumer.
const QUEUE_DEPTH: usize = 2;

/// Receiving end of one device's acquisition queue.
#[derive(Debug)]
pub struct FrameFeed {
    rx: Receiver<Frame>,
    _worker: JoinHandle<()>,
}

impl FrameFeed {
    /// Drain the queue and return the newest frame, if any arrived since the
    /// last call. Never blocks.
    pub fn latest(&self) -> Option<Frame> {
        let mut last = None;
        while let Ok(frame) = self.rx.try_recv() {
            last = Some(frame);
        }
        last
    }

    /// Return the newest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Capture commands use this; the per-tick refresh uses [`latest`].
    ///
    /// [`latest`]: FrameFeed::latest
    pub fn wait_latest(&self, timeout: Duration) -> Result<Frame, RigError> {
        if let Some(frame) = self.latest() {
            return Ok(frame);
        }
        self.rx
            .recv_timeout(timeout)
            .map_err(|e| RigError::Acquisition(format!("no frame within {timeout:?}: {e}")))
    }
}

/// Start an acquisition worker for one device.
///
/// The worker runs until the source errors out or the [`FrameFeed`] is
/// dropped. A full queue applies backpressure to this device's acquisition
/// only; the tick loop always reads the newest queued frame via
/// [`FrameFeed::latest`].
pub fn spawn_acquisition(device_id: String, mut source: Box<dyn FrameSource>) -> FrameFeed {
    let (tx, rx) = sync_channel::<Frame>(QUEUE_DEPTH);

    let worker = thread::Builder::new()
        .name(format!("acq-{device_id}"))
        .spawn(move || loop {
            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("acquisition for {device_id} stopped: {e}");
                    break;
                }
            };

            if tx.send(frame).is_err() {
                // Feed dropped; the session is gone.
                break;
            }
        })
        .expect("spawn acquisition worker");

    FrameFeed {
        rx,
        _worker: worker,
    }
}
