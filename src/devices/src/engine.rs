use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use common::{config::validate_devices, GridError, GridResult};
use dashmap::DashMap;
use history::HistoryStore;
use tokio::{
    select,
    sync::{broadcast, mpsc, RwLock},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};
use types::{Device, DeviceId, Reading};

use crate::{poller, pool::PortPool};

#[derive(Debug, Clone, Copy)]
pub struct EngineConf {
    pub update_interval: Duration,
    pub inter_device_delay: Duration,
    pub response_timeout: Duration,
}

impl From<&common::config::Config> for EngineConf {
    fn from(config: &common::config::Config) -> Self {
        EngineConf {
            update_interval: Duration::from_millis(config.update_interval_ms),
            inter_device_delay: Duration::from_millis(config.inter_device_delay_ms),
            response_timeout: Duration::from_millis(config.response_timeout_ms),
        }
    }
}

/// The acquisition engine: one task owns the port pool and walks all enabled
/// devices once per interval, strictly sequentially. Sequential iteration is
/// what keeps the half-duplex buses sane; devices on a shared port are never
/// mid-exchange at the same time.
pub struct Engine {
    conf: EngineConf,
    devices: Arc<RwLock<Vec<Device>>>,
    latest: Arc<DashMap<DeviceId, Reading>>,
    /// Millis since epoch of the last completed cycle, 0 = never.
    last_poll_ms: Arc<AtomicI64>,
    history: HistoryStore,
    update_tx: broadcast::Sender<Reading>,
    stop_signal_tx: Option<mpsc::Sender<()>>,
    reinit_tx: Option<mpsc::Sender<Vec<Device>>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new(conf: EngineConf, devices: Vec<Device>, history: HistoryStore) -> Self {
        let (update_tx, _) = broadcast::channel(16);
        Engine {
            conf,
            devices: Arc::new(RwLock::new(devices)),
            latest: Arc::new(DashMap::new()),
            last_poll_ms: Arc::new(AtomicI64::new(0)),
            history,
            update_tx,
            stop_signal_tx: None,
            reinit_tx: None,
            join_handle: None,
        }
    }

    /// Idempotent while running: a second call is a no-op.
    pub async fn start(&mut self) {
        if self.stop_signal_tx.is_some() {
            return;
        }

        let (stop_signal_tx, mut stop_signal_rx) = mpsc::channel::<()>(1);
        let (reinit_tx, mut reinit_rx) = mpsc::channel::<Vec<Device>>(1);
        self.stop_signal_tx = Some(stop_signal_tx);
        self.reinit_tx = Some(reinit_tx);

        let conf = self.conf;
        let devices = self.devices.clone();
        let latest = self.latest.clone();
        let last_poll_ms = self.last_poll_ms.clone();
        let history = self.history.clone();
        let update_tx = self.update_tx.clone();

        info!(
            "starting acquisition for {} enabled devices",
            devices.read().await.iter().filter(|d| d.enabled).count()
        );

        let handle = tokio::spawn(async move {
            let mut pool = PortPool::new(conf.response_timeout);
            pool.initialize(&devices.read().await);

            let mut interval = time::interval(conf.update_interval);
            // A cycle runs inline in this task, so two cycles can never
            // overlap; missed ticks are skipped, not replayed back to back.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                select! {
                    biased;
                    _ = stop_signal_rx.recv() => {
                        pool.shutdown();
                        return;
                    }

                    new_devices = reinit_rx.recv() => {
                        if let Some(new_devices) = new_devices {
                            *devices.write().await = new_devices;
                            let devices = devices.read().await;
                            pool.reinitialize(&devices);
                            info!(
                                "reinitialized: {} devices, {} ports connected",
                                devices.len(),
                                pool.len()
                            );
                        }
                    }

                    _ = interval.tick() => {
                        let started = Instant::now();
                        run_cycle(&mut pool, &devices, &latest, &history, &update_tx, conf.inter_device_delay).await;
                        last_poll_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
                        let elapsed = started.elapsed();
                        if elapsed > conf.update_interval {
                            warn!(
                                "polling cycle took {elapsed:?}, longer than the {:?} interval; skipping missed cycles",
                                conf.update_interval
                            );
                        }
                    }
                }
            }
        });
        self.join_handle = Some(handle);
    }

    /// Stops scheduling and releases all serial ports. The cycle in flight
    /// finishes (or times out) first; nothing is torn down under it.
    pub async fn stop(&mut self) {
        let Some(stop_signal_tx) = self.stop_signal_tx.take() else {
            return;
        };
        self.reinit_tx = None;
        let _ = stop_signal_tx.send(()).await;
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
        info!("acquisition stopped");
    }

    /// Replaces the device set wholesale and rebuilds every connection.
    pub async fn reinitialize(&mut self, new_devices: Vec<Device>) -> GridResult<()> {
        validate_devices(&new_devices)?;
        match &self.reinit_tx {
            Some(reinit_tx) => reinit_tx
                .send(new_devices)
                .await
                .map_err(|_| GridError::Common("acquisition task is gone".to_owned()))?,
            None => *self.devices.write().await = new_devices,
        }
        Ok(())
    }

    pub async fn enabled_device_count(&self) -> usize {
        self.devices.read().await.iter().filter(|d| d.enabled).count()
    }

    pub fn last_poll_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.last_poll_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    /// Most recent Reading per device, overwritten each cycle.
    pub fn latest(&self, device_id: &DeviceId) -> Option<Reading> {
        self.latest.get(device_id).map(|entry| entry.value().clone())
    }

    /// Live-update stream. Delivery is fire-and-forget: a lagging or absent
    /// subscriber never slows polling down.
    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.update_tx.subscribe()
    }
}

async fn run_cycle(
    pool: &mut PortPool,
    devices: &Arc<RwLock<Vec<Device>>>,
    latest: &DashMap<DeviceId, Reading>,
    history: &HistoryStore,
    update_tx: &broadcast::Sender<Reading>,
    inter_device_delay: Duration,
) {
    let devices = devices.read().await;
    let mut first = true;
    for device in devices.iter().filter(|d| d.enabled) {
        // Breathing room between devices bounds bus load and lets slow
        // transceivers settle.
        if !first {
            time::sleep(inter_device_delay).await;
        }
        first = false;

        let reading = match pool.get_mut(&device.port) {
            Some(client) => poller::poll_device(client, device).await,
            None => Reading::failed(
                device.id.clone(),
                Utc::now(),
                GridError::NoConnection(device.port.clone()).to_string(),
            ),
        };

        latest.insert(device.id.clone(), reading.clone());
        if let Err(e) = history.append(&reading).await {
            warn!("history write for device {} failed: {e}", device.id);
        }
        let _ = update_tx.send(reading);
    }
}

#[cfg(test)]
mod tests {
    use common::config::default_devices;

    use super::*;

    fn engine_conf() -> EngineConf {
        EngineConf {
            update_interval: Duration::from_millis(20),
            inter_device_delay: Duration::from_millis(1),
            response_timeout: Duration::from_millis(50),
        }
    }

    fn unreachable_device() -> Vec<Device> {
        let mut devices = default_devices();
        devices[0].port = "/nonexistent/ttyX".to_owned();
        devices
    }

    #[tokio::test]
    async fn test_initial_status() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(
            engine_conf(),
            default_devices(),
            HistoryStore::new(dir.path(), 24),
        );
        assert_eq!(engine.enabled_device_count().await, 1);
        assert!(engine.last_poll_timestamp().is_none());
        assert!(engine.latest(&DeviceId::Int(1)).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_port_yields_error_readings() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(
            engine_conf(),
            unreachable_device(),
            HistoryStore::new(dir.path(), 24),
        );
        let mut updates = engine.subscribe();
        engine.start().await;

        let reading = time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("no reading within 2s")
            .unwrap();
        assert!(reading.is_failed());
        assert!(reading.error.as_deref().unwrap().contains("/nonexistent/ttyX"));
        assert!(reading.values.is_none());

        // Failure repeats every cycle until a reinitialize succeeds.
        let second = time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("no second reading")
            .unwrap();
        assert!(second.is_failed());

        assert!(engine.latest(&DeviceId::Int(1)).unwrap().is_failed());
        assert!(engine.last_poll_timestamp().is_some());

        engine.stop().await;
    }

    #[tokio::test]
    async fn test_error_readings_reach_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(dir.path(), 24);
        let mut engine = Engine::new(engine_conf(), unreachable_device(), history.clone());
        let mut updates = engine.subscribe();
        engine.start().await;

        time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("no reading within 2s")
            .unwrap();
        engine.stop().await;

        let log = history.load(&DeviceId::Int(1)).await.unwrap();
        assert!(!log.is_empty());
        assert!(log[0].is_failed());
    }

    #[tokio::test]
    async fn test_stop_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(
            engine_conf(),
            unreachable_device(),
            HistoryStore::new(dir.path(), 24),
        );
        engine.start().await;
        engine.stop().await;
        // A second stop is a no-op.
        engine.stop().await;

        let mut updates = engine.subscribe();
        time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(
            engine_conf(),
            unreachable_device(),
            HistoryStore::new(dir.path(), 24),
        );
        engine.start().await;
        let first_handle_exists = engine.join_handle.is_some();
        engine.start().await;
        assert!(first_handle_exists && engine.join_handle.is_some());
        engine.stop().await;
    }

    #[tokio::test]
    async fn test_reinitialize_replaces_device_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(
            engine_conf(),
            unreachable_device(),
            HistoryStore::new(dir.path(), 24),
        );

        let mut replacement = unreachable_device();
        replacement[0].enabled = false;
        engine.reinitialize(replacement).await.unwrap();
        assert_eq!(engine.enabled_device_count().await, 0);
    }

    #[tokio::test]
    async fn test_reinitialize_rejects_port_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::new(
            engine_conf(),
            unreachable_device(),
            HistoryStore::new(dir.path(), 24),
        );

        let mut bad = unreachable_device();
        let mut second = bad[0].clone();
        second.id = DeviceId::Int(2);
        second.baud_rate = 19200;
        bad.push(second);
        assert!(engine.reinitialize(bad).await.is_err());
    }
}
