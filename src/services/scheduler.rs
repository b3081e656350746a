use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connectivity::Connectivity;
use crate::models::SyncOutcome;
use crate::remote::RemoteStore;
use crate::services::sync_service::SyncService;

/// Runs a sync every time connectivity goes from offline to online.
///
/// The signal is subscribed to on construction, so a transition that happens
/// before `start` is first polled is still seen.
pub struct SyncScheduler {
    sync: Arc<SyncService>,
    rx: watch::Receiver<bool>,
    online_at_creation: bool,
}

impl SyncScheduler {
    pub fn new(sync: Arc<SyncService>, connectivity: Connectivity) -> Self {
        let mut rx = connectivity.subscribe();
        let online_at_creation = *rx.borrow_and_update();
        Self {
            sync,
            rx,
            online_at_creation,
        }
    }

    /// Loops until the connectivity signal is dropped. Records left over
    /// from an earlier run are pushed right away when already online.
    pub async fn start(mut self) {
        info!("Starting reconnect sync watcher");
        let mut was_online = self.online_at_creation;
        if was_online {
            self.run_sync().await;
        }

        while self.rx.changed().await.is_ok() {
            let online = *self.rx.borrow_and_update();
            let reconnected = online && !was_online;
            was_online = online;

            if reconnected {
                self.run_sync().await;
            }
        }
    }

    async fn run_sync(&self) {
        match self.sync.sync_all().await {
            Ok(SyncOutcome::Synced(stats)) => {
                info!(
                    "Auto-sync completed - Pushed: {} registrations, {} screenings",
                    stats.registrations_pushed, stats.screenings_pushed
                );
            }
            Ok(outcome) => debug!("Auto-sync: {:?}", outcome),
            Err(e) => {
                warn!("Auto-sync failed: {:?}", e);
                // records stay queued for the next trigger
            }
        }
    }
}

/// Periodically pings the remote and feeds the result into [`Connectivity`].
pub struct ConnectivityProbe {
    remote: Arc<dyn RemoteStore>,
    connectivity: Connectivity,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(remote: Arc<dyn RemoteStore>, connectivity: Connectivity, interval_secs: u64) -> Self {
        Self {
            remote,
            connectivity,
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn start(self) {
        info!("Starting connectivity probe (interval: {:?})", self.interval);

        loop {
            self.probe_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn probe_once(&self) -> bool {
        let online = match tokio::time::timeout(self.interval, self.remote.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("Remote probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Remote probe timed out");
                false
            }
        };
        self.connectivity.set_online(online);
        online
    }
}
