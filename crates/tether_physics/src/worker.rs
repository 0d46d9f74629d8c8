//! # Worker Thread and Control Plane
//!
//! The shared regions carry all high-rate traffic; this module carries
//! everything else. Lifecycle runs over a pair of crossbeam channels:
//!
//! ```text
//!   host ──INIT{regions, config}──▶ worker
//!   host ◀─READY / ERROR(reason)─── worker
//!   host ──STEP{elapsed}──────────▶ worker      (manual stepping)
//!   host ◀─STEP_DONE{steps}──────── worker
//!   host ──DESTROY────────────────▶ worker
//!   host ◀─DESTROYED─────────────── worker
//! ```
//!
//! In free-run mode the worker also ticks itself on wall-clock time
//! whenever no control message is pending, which is the production
//! configuration; manual stepping exists for deterministic tests.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use tether_shm::RegionSet;

use crate::error::{PhysicsError, PhysicsResult};
use crate::runtime::{PhysicsConfig, PhysicsRuntime};

/// Messages from the host to the worker.
#[derive(Debug)]
pub enum HostMsg {
    /// Attach to the regions and build the world.
    Init {
        /// Shared regions both threads use from now on.
        regions: RegionSet,
        /// Worker tuning.
        config: PhysicsConfig,
    },
    /// Run one tick for the given elapsed seconds.
    Step {
        /// Wall-clock seconds to bank into the stepper.
        elapsed: f32,
    },
    /// Tear the world down and exit.
    Destroy,
}

/// Messages from the worker back to the host.
#[derive(Debug)]
pub enum WorkerMsg {
    /// Initialization finished; the shared channels are live.
    Ready,
    /// A STEP request completed.
    StepDone {
        /// Fixed steps actually executed.
        steps: u32,
    },
    /// Teardown finished; the thread is exiting.
    Destroyed,
    /// Something failed; the thread is exiting.
    Error(String),
}

/// Host-side handle to the physics thread.
pub struct WorkerHandle {
    tx: Sender<HostMsg>,
    rx: Receiver<WorkerMsg>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns the physics thread. It idles until [`Self::init`].
    #[must_use]
    pub fn spawn() -> Self {
        let (host_tx, host_rx) = crossbeam_channel::unbounded();
        let (worker_tx, worker_rx) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("tether-physics".into())
            .spawn(move || worker_main(&host_rx, &worker_tx));
        match thread {
            Ok(handle) => Self {
                tx: host_tx,
                rx: worker_rx,
                thread: Some(handle),
            },
            Err(err) => {
                // Spawn failure leaves a dead handle; init will report
                // the closed channel.
                tracing::error!(%err, "failed to spawn physics thread");
                Self {
                    tx: host_tx,
                    rx: worker_rx,
                    thread: None,
                }
            }
        }
    }

    /// Sends INIT and blocks until READY or ERROR.
    pub fn init(&self, regions: RegionSet, config: PhysicsConfig) -> PhysicsResult<()> {
        self.tx
            .send(HostMsg::Init { regions, config })
            .map_err(|_| PhysicsError::ControlPlaneClosed)?;
        match self.rx.recv() {
            Ok(WorkerMsg::Ready) => Ok(()),
            Ok(WorkerMsg::Error(reason)) => Err(PhysicsError::WorkerInit(reason)),
            Ok(other) => {
                tracing::warn!(?other, "unexpected reply to INIT");
                Err(PhysicsError::ControlPlaneClosed)
            }
            Err(_) => Err(PhysicsError::ControlPlaneClosed),
        }
    }

    /// Sends STEP and blocks until the tick completes. Only meaningful
    /// with `free_run` disabled; a free-running worker steps on its own.
    pub fn step(&self, elapsed: f32) -> PhysicsResult<u32> {
        self.tx
            .send(HostMsg::Step { elapsed })
            .map_err(|_| PhysicsError::ControlPlaneClosed)?;
        loop {
            match self.rx.recv() {
                Ok(WorkerMsg::StepDone { steps }) => return Ok(steps),
                Ok(WorkerMsg::Error(reason)) => return Err(PhysicsError::WorkerInit(reason)),
                Ok(other) => tracing::debug!(?other, "skipping stale worker message"),
                Err(_) => return Err(PhysicsError::ControlPlaneClosed),
            }
        }
    }

    /// Sends DESTROY, waits for the worker to acknowledge, and joins the
    /// thread.
    pub fn shutdown(mut self) -> PhysicsResult<()> {
        self.tx
            .send(HostMsg::Destroy)
            .map_err(|_| PhysicsError::ControlPlaneClosed)?;
        loop {
            match self.rx.recv() {
                Ok(WorkerMsg::Destroyed) => break,
                Ok(other) => tracing::debug!(?other, "skipping stale worker message"),
                Err(_) => break,
            }
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("physics thread panicked during shutdown");
            }
        }
        Ok(())
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Best-effort teardown when the host forgets to shut down.
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(HostMsg::Destroy);
            let _ = thread.join();
        }
    }
}

fn worker_main(host_rx: &Receiver<HostMsg>, worker_tx: &Sender<WorkerMsg>) {
    // Phase 1: wait for INIT.
    let (regions, config) = loop {
        match host_rx.recv() {
            Ok(HostMsg::Init { regions, config }) => break (regions, config),
            Ok(HostMsg::Destroy) => {
                let _ = worker_tx.send(WorkerMsg::Destroyed);
                return;
            }
            Ok(other) => tracing::warn!(?other, "control message before INIT, ignoring"),
            Err(_) => return,
        }
    };

    let mut runtime = match PhysicsRuntime::attach(&regions, &config) {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "physics runtime failed to attach");
            let _ = worker_tx.send(WorkerMsg::Error(err.to_string()));
            return;
        }
    };
    tracing::info!(
        fixed_dt = config.fixed_dt,
        free_run = config.free_run,
        "physics worker ready"
    );
    let _ = worker_tx.send(WorkerMsg::Ready);

    // Phase 2: serve until DESTROY or a dead host.
    let mut last_tick = Instant::now();
    loop {
        let message = if config.free_run {
            match host_rx.recv_timeout(Duration::from_millis(1)) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("host vanished, tearing down");
                    runtime.teardown();
                    return;
                }
            }
        } else {
            match host_rx.recv() {
                Ok(message) => Some(message),
                Err(_) => {
                    tracing::warn!("host vanished, tearing down");
                    runtime.teardown();
                    return;
                }
            }
        };

        match message {
            None => {
                let now = Instant::now();
                runtime.tick((now - last_tick).as_secs_f32());
                last_tick = now;
            }
            Some(HostMsg::Step { elapsed }) => {
                let steps = runtime.tick(elapsed);
                last_tick = Instant::now();
                let _ = worker_tx.send(WorkerMsg::StepDone { steps });
            }
            Some(HostMsg::Destroy) => {
                runtime.teardown();
                let _ = worker_tx.send(WorkerMsg::Destroyed);
                return;
            }
            Some(HostMsg::Init { .. }) => {
                tracing::warn!("duplicate INIT, ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shm::region::SharedRegion;
    use tether_shm::{Command, CommandWriter, SnapshotReader};

    fn manual_config() -> PhysicsConfig {
        PhysicsConfig {
            free_run: false,
            ..PhysicsConfig::default()
        }
    }

    #[test]
    fn init_step_destroy_round_trip() {
        let regions = RegionSet::allocate();
        let worker = WorkerHandle::spawn();
        worker.init(regions.clone(), manual_config()).unwrap();

        let commands = CommandWriter::attach(regions.commands.clone()).unwrap();
        assert!(commands.try_enqueue(&Command::CreateBody {
            phys_id: 5,
            desc: tether_shm::BodyDesc::dynamic(
                tether_shm::ShapeParam::Sphere { radius: 1.0 },
                [0.0, 3.0, 0.0],
            ),
        }));

        assert_eq!(worker.step(1.0 / 60.0).unwrap(), 1);
        let mut snapshots = SnapshotReader::attach(regions.snapshots.clone()).unwrap();
        let mut ids = Vec::new();
        snapshots
            .poll(|record| ids.push(record.phys_id))
            .expect("snapshot published after step");
        assert_eq!(ids, vec![5]);

        worker.shutdown().unwrap();
    }

    #[test]
    fn step_banks_partial_frames() {
        let worker = WorkerHandle::spawn();
        worker.init(RegionSet::allocate(), manual_config()).unwrap();
        assert_eq!(worker.step(1.0 / 120.0).unwrap(), 0);
        assert_eq!(worker.step(1.0 / 120.0).unwrap(), 1);
        worker.shutdown().unwrap();
    }

    #[test]
    fn init_with_a_bad_region_reports_an_error() {
        let mut regions = RegionSet::allocate();
        // An unstamped, undersized command region must fail validation.
        regions.commands = SharedRegion::alloc(64);
        let worker = WorkerHandle::spawn();
        match worker.init(regions, manual_config()) {
            Err(PhysicsError::WorkerInit(_)) => {}
            other => panic!("expected init error, got {other:?}"),
        }
    }

    #[test]
    fn destroy_before_init_still_exits_cleanly() {
        let worker = WorkerHandle::spawn();
        worker.shutdown().unwrap();
    }
}
