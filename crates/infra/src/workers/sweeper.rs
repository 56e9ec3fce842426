//! Expiry sweeper: a periodic, single-flight worker that releases lapsed
//! holds back into available stock.
//!
//! One dedicated thread owns the sweep, so runs never overlap no matter how
//! short the interval is; manual triggers queue behind the same loop. Crash
//! safety needs nothing extra: each row transition is status-guarded, so a
//! restarted sweep can only release a given hold once.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ledger_store::LedgerStore;
use crate::reservation_store::ReservationStore;
use crate::service::ReservationService;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between scheduled sweeps.
    pub interval: Duration,
    /// Thread name for logging.
    pub name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            name: "expiry-sweeper".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Sweeper runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweeperStats {
    pub sweeps_run: u64,
    pub reservations_released: u64,
    pub last_error: Option<String>,
}

/// Errors from the sweeper handle.
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("sweeper is not running")]
    Stopped,

    #[error("sweep failed: {0}")]
    Sweep(String),
}

enum Control {
    /// Administrative trigger; replies with the released count.
    Trigger(mpsc::Sender<Result<usize, SweeperError>>),
    Shutdown,
}

/// Handle to control a running sweeper.
pub struct SweeperHandle {
    control: mpsc::Sender<Control>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl SweeperHandle {
    /// Run a sweep now (operator remediation path) and return the count of
    /// holds released. Executed on the sweeper thread, so it cannot overlap
    /// a scheduled run.
    pub fn sweep_now(&self) -> Result<usize, SweeperError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.control
            .send(Control::Trigger(reply_tx))
            .map_err(|_| SweeperError::Stopped)?;
        reply_rx.recv().map_err(|_| SweeperError::Stopped)?
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> SweeperStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Request graceful shutdown and wait for the thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// The periodic expiry sweep worker.
pub struct ExpirySweeper;

impl ExpirySweeper {
    /// Spawn the sweeper thread over a shared reservation service.
    pub fn spawn<L, R>(
        service: Arc<ReservationService<L, R>>,
        config: SweeperConfig,
    ) -> SweeperHandle
    where
        L: LedgerStore + 'static,
        R: ReservationStore + 'static,
    {
        let (control_tx, control_rx) = mpsc::channel::<Control>();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || sweeper_loop(service, config, control_rx, stats_clone))
            .expect("failed to spawn expiry sweeper thread");

        SweeperHandle {
            control: control_tx,
            join: Some(join),
            stats,
        }
    }
}

fn sweeper_loop<L, R>(
    service: Arc<ReservationService<L, R>>,
    config: SweeperConfig,
    control_rx: mpsc::Receiver<Control>,
    stats: Arc<Mutex<SweeperStats>>,
) where
    L: LedgerStore,
    R: ReservationStore,
{
    info!(sweeper = %config.name, interval_secs = config.interval.as_secs(), "expiry sweeper started");

    loop {
        match control_rx.recv_timeout(config.interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = run_sweep(&service, &config.name, &stats);
            }
            Ok(Control::Trigger(reply)) => {
                let result = run_sweep(&service, &config.name, &stats);
                let _ = reply.send(result);
            }
            Ok(Control::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(sweeper = %config.name, "expiry sweeper stopped");
}

fn run_sweep<L, R>(
    service: &ReservationService<L, R>,
    name: &str,
    stats: &Arc<Mutex<SweeperStats>>,
) -> Result<usize, SweeperError>
where
    L: LedgerStore,
    R: ReservationStore,
{
    match service.release_expired_reservations() {
        Ok(count) => {
            debug!(sweeper = %name, count, "sweep finished");
            if let Ok(mut s) = stats.lock() {
                s.sweeps_run += 1;
                s.reservations_released += count as u64;
                s.last_error = None;
            }
            Ok(count)
        }
        Err(err) => {
            warn!(sweeper = %name, error = %err, "sweep failed");
            if let Ok(mut s) = stats.lock() {
                s.sweeps_run += 1;
                s.last_error = Some(err.to_string());
            }
            Err(SweeperError::Sweep(err.to_string()))
        }
    }
}
