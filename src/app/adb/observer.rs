use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::app::adb::devices::list_devices;
use crate::app::adb::runner::CommandExecutor;
use crate::app::error::AppError;
use crate::app::models::Device;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub type DeviceSnapshot = Result<Vec<Device>, AppError>;

/// Stream of device-list snapshots produced by a background poller.
///
/// Each snapshot is handed over through a rendezvous channel, so the worker never
/// runs ahead of the consumer. Stopping or dropping the watch ends the loop before
/// its next `adb devices` call; a call already in flight is allowed to finish.
pub struct DeviceWatch {
    snapshots: Option<Receiver<DeviceSnapshot>>,
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl DeviceWatch {
    /// Stops polling and waits for the worker to exit.
    pub fn stop(mut self) {
        self.signal_stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn signal_stop(&mut self) {
        self.stop_tx.take();
        self.snapshots.take();
    }
}

impl Iterator for DeviceWatch {
    type Item = DeviceSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        self.snapshots.as_ref()?.recv().ok()
    }
}

impl Drop for DeviceWatch {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

pub struct DevicePoller;

impl DevicePoller {
    pub fn start(
        executor: Arc<dyn CommandExecutor>,
        interval: Duration,
        trace_id: String,
    ) -> DeviceWatch {
        let (snapshot_tx, snapshot_rx) = mpsc::sync_channel::<DeviceSnapshot>(0);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let join = thread::spawn(move || {
            info!(trace_id = %trace_id, interval_ms = interval.as_millis() as u64, "device polling started");
            poll_loop(executor.as_ref(), interval, &trace_id, &snapshot_tx, &stop_rx);
            info!(trace_id = %trace_id, "device polling stopped");
        });

        DeviceWatch {
            snapshots: Some(snapshot_rx),
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }
}

fn poll_loop(
    executor: &dyn CommandExecutor,
    interval: Duration,
    trace_id: &str,
    snapshot_tx: &SyncSender<DeviceSnapshot>,
    stop_rx: &Receiver<()>,
) {
    loop {
        if stop_requested(stop_rx) {
            return;
        }
        let snapshot = list_devices(executor, trace_id);
        debug!(
            trace_id = %trace_id,
            ok = snapshot.is_ok(),
            "device snapshot ready"
        );
        if snapshot_tx.send(snapshot).is_err() {
            return;
        }
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(mpsc::TryRecvError::Empty))
}
