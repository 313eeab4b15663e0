//! # Polling Loop
//!
//! Runs a [`SessionManager`] on a dedicated blocking task at a fixed tick rate.
//!
//! HID exchanges and probe sleeps are blocking calls, so the loop lives on
//! tokio's blocking pool rather than on an async worker. Each tick publishes
//! a fresh [`SessionSnapshot`] through a `watch` channel; readers always see
//! a complete snapshot.
//!
//! Stopping is cooperative: [`PollingLoop::stop`] raises a flag the loop checks
//! once per tick, then waits a bounded time for the task to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::SessionManager;
use super::SessionSnapshot;
use crate::error::{DriftGuardError, Result};
use crate::hid::{self, SharedTransport};

/// Handle to a running polling loop.
#[derive(Debug)]
pub struct PollingLoop {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    snapshots: watch::Receiver<SessionSnapshot>,
    transport: SharedTransport,
    shutdown_timeout: Duration,
}

impl PollingLoop {
    /// Start driving `manager` every `period`.
    ///
    /// `transport` must be the transport the manager was built with; it is
    /// used to close any remaining handles on shutdown. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        mut manager: SessionManager,
        transport: SharedTransport,
        period: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, snapshots) = watch::channel(manager.snapshot());

        let stop_flag = Arc::clone(&stop);
        let handle = tokio::task::spawn_blocking(move || {
            info!("Polling loop started ({:?} period)", period);
            let mut deadline = Instant::now();

            while !stop_flag.load(Ordering::Acquire) {
                let snapshot = manager.tick(Instant::now());
                tx.send_replace(snapshot);

                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    // Overran the period; skip missed ticks instead of bursting
                    deadline = now;
                }
            }

            manager.shutdown();
            tx.send_replace(manager.snapshot());
            info!("Polling loop stopped after {} ticks", manager.snapshot().tick);
        });

        Self {
            stop,
            handle,
            snapshots,
            transport,
            shutdown_timeout,
        }
    }

    /// New receiver observing every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until a controller session is connected.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if no session connects within `timeout` or the
    /// loop stops first.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<SessionSnapshot> {
        let mut rx = self.subscribe();
        let outcome = tokio::time::timeout(timeout, rx.wait_for(SessionSnapshot::is_connected)).await;
        match outcome {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(DriftGuardError::NotConnected),
            Err(_) => {
                debug!("No controller connected within {:?}", timeout);
                Err(DriftGuardError::NotConnected)
            }
        }
    }

    /// Stop the loop and release every HID handle.
    ///
    /// Waits up to the shutdown timeout for the loop to finish. Handles are
    /// closed even if the loop does not stop in time.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::Release);

        match tokio::time::timeout(self.shutdown_timeout, self.handle).await {
            Ok(Ok(())) => debug!("Polling loop joined"),
            Ok(Err(e)) => warn!("Polling loop task failed: {}", e),
            Err(_) => warn!(
                "Polling loop did not stop within {:?}",
                self.shutdown_timeout
            ),
        }

        hid::lock(&self.transport).cache_mut().close_all();
    }
}
