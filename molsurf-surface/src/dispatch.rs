//! Work unit dispatch
//!
//! Surfaces are computed unit by unit, either inline on the caller's thread (one unit
//! per poll, so a UI loop stays responsive) or on a dedicated thread pool. The pool
//! runs a fixed number of long-lived lanes; every lane receives the atom snapshot of
//! a surface once and then the units assigned to it round-robin. Results flow back
//! over a channel that `poll` drains without blocking.

use crate::decompose::WorkUnit;
use crate::pipeline::SurfaceId;
use crate::voxel::{compute_fragment, SurfaceConfig, SurfaceKind};
use flume::{Receiver, Sender};
use molsurf_core::{Error, MeshFragment, ReducedAtom, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// How work units are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchMode {
    /// One unit per poll on the calling thread
    Inline,
    /// Units spread over a pool of worker lanes
    ThreadPool,
}

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    /// Number of lanes of the thread pool
    pub worker_count: usize,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::ThreadPool,
            worker_count: 4,
            thread_name_prefix: "molsurf-surface".to_string(),
            stack_size: Some(8 * 1024 * 1024), // 8MB stack
        }
    }
}

impl DispatchConfig {
    /// Inline dispatch, mostly useful for tests and debugging
    pub fn inline() -> Self {
        Self::default().with_mode(DispatchMode::Inline)
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}

/// Everything needed to compute all units of one surface
#[derive(Debug, Clone)]
pub struct SurfaceJob {
    pub kind: SurfaceKind,
    /// Reduced snapshot all unit indices point into
    pub atoms: Arc<[ReducedAtom]>,
    /// Volume of the whole surface extent
    pub volume: f32,
    pub config: SurfaceConfig,
    pub units: Vec<WorkUnit>,
}

/// Result of one work unit
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Fragment {
        surface: SurfaceId,
        unit: usize,
        fragment: MeshFragment,
    },
    Failed {
        surface: SurfaceId,
        unit: usize,
        error: String,
    },
}

impl WorkerEvent {
    pub fn surface(&self) -> SurfaceId {
        match self {
            WorkerEvent::Fragment { surface, .. } | WorkerEvent::Failed { surface, .. } => *surface,
        }
    }
}

/// Executes work units and reports their fragments
pub trait WorkDispatcher {
    /// Queue every unit of a surface
    fn submit(&mut self, surface: SurfaceId, job: SurfaceJob) -> Result<()>;

    /// Collect the results available right now, never blocking
    fn poll(&mut self) -> Vec<WorkerEvent>;

    /// Drop the queued units of a surface; results already in flight may still arrive
    fn cancel(&mut self, surface: SurfaceId);

    /// Units queued or running and not yet reported
    fn pending(&self) -> usize;
}

/// Build the dispatcher selected by the configuration
pub fn create_dispatcher(config: &DispatchConfig) -> Result<Box<dyn WorkDispatcher>> {
    match config.mode {
        DispatchMode::Inline => Ok(Box::new(InlineDispatcher::new())),
        DispatchMode::ThreadPool => Ok(Box::new(ThreadPoolDispatcher::new(config)?)),
    }
}

/// Unit-independent part of a job shared by all units
#[derive(Debug)]
struct LoadedJob {
    kind: SurfaceKind,
    atoms: Arc<[ReducedAtom]>,
    volume: f32,
    config: SurfaceConfig,
}

impl LoadedJob {
    fn split(job: SurfaceJob) -> (Arc<LoadedJob>, Vec<WorkUnit>) {
        let loaded = LoadedJob {
            kind: job.kind,
            atoms: job.atoms,
            volume: job.volume,
            config: job.config,
        };
        (Arc::new(loaded), job.units)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Compute one unit, turning errors and panics into failure events
fn run_unit(surface: SurfaceId, index: usize, job: &LoadedJob, unit: &WorkUnit) -> WorkerEvent {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        compute_fragment(job.kind, unit, &job.atoms, job.volume, &job.config)
    }));

    match result {
        Ok(Ok(fragment)) => WorkerEvent::Fragment {
            surface,
            unit: index,
            fragment,
        },
        Ok(Err(e)) => WorkerEvent::Failed {
            surface,
            unit: index,
            error: e.to_string(),
        },
        Err(payload) => WorkerEvent::Failed {
            surface,
            unit: index,
            error: panic_message(payload.as_ref()),
        },
    }
}

/// Time-sliced dispatcher running on the caller's thread
#[derive(Debug, Default)]
pub struct InlineDispatcher {
    queue: VecDeque<(SurfaceId, usize, Arc<LoadedJob>, WorkUnit)>,
}

impl InlineDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkDispatcher for InlineDispatcher {
    fn submit(&mut self, surface: SurfaceId, job: SurfaceJob) -> Result<()> {
        let (loaded, units) = LoadedJob::split(job);
        self.queue.extend(
            units
                .into_iter()
                .enumerate()
                .map(|(index, unit)| (surface, index, loaded.clone(), unit)),
        );
        Ok(())
    }

    fn poll(&mut self) -> Vec<WorkerEvent> {
        match self.queue.pop_front() {
            Some((surface, index, job, unit)) => vec![run_unit(surface, index, &job, &unit)],
            None => Vec::new(),
        }
    }

    fn cancel(&mut self, surface: SurfaceId) {
        self.queue.retain(|(s, ..)| *s != surface);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

enum LaneMessage {
    /// Snapshot shared by all following units of a surface
    Load { surface: SurfaceId, job: Arc<LoadedJob> },
    Unit {
        surface: SurfaceId,
        index: usize,
        unit: WorkUnit,
    },
    /// No more units of the surface will follow
    Release { surface: SurfaceId },
}

type CancelSet = Arc<Mutex<HashSet<SurfaceId>>>;

fn is_cancelled(cancelled: &CancelSet, surface: SurfaceId) -> bool {
    cancelled
        .lock()
        .map(|set| set.contains(&surface))
        .unwrap_or(false)
}

fn run_lane(
    lane: usize,
    inbox: Receiver<LaneMessage>,
    outbox: Sender<WorkerEvent>,
    released: Sender<SurfaceId>,
    cancelled: CancelSet,
) {
    let mut loaded: HashMap<SurfaceId, Arc<LoadedJob>> = HashMap::new();

    for message in inbox.iter() {
        match message {
            LaneMessage::Load { surface, job } => {
                loaded.insert(surface, job);
            }
            LaneMessage::Unit {
                surface,
                index,
                unit,
            } => {
                if is_cancelled(&cancelled, surface) {
                    continue;
                }
                let event = match loaded.get(&surface) {
                    Some(job) => run_unit(surface, index, job, &unit),
                    None => WorkerEvent::Failed {
                        surface,
                        unit: index,
                        error: format!("lane {} has no atoms loaded for surface {:?}", lane, surface),
                    },
                };
                if outbox.send(event).is_err() {
                    break;
                }
            }
            LaneMessage::Release { surface } => {
                loaded.remove(&surface);
                if released.send(surface).is_err() {
                    break;
                }
            }
        }
    }

    log::debug!("surface lane {} stopped", lane);
}

/// Dispatcher running units on a pool of long-lived lanes
pub struct ThreadPoolDispatcher {
    // lanes block on their inbox; the pool must outlive them
    _pool: ThreadPool,
    lanes: Vec<Sender<LaneMessage>>,
    events: Receiver<WorkerEvent>,
    released: Receiver<SurfaceId>,
    cancelled: CancelSet,
    pending: HashMap<SurfaceId, usize>,
    /// Lanes that have not yet processed the `Release` of a surface
    unreleased: HashMap<SurfaceId, usize>,
    next_lane: usize,
}

impl ThreadPoolDispatcher {
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let worker_count = config.worker_count.max(1);

        let mut builder = ThreadPoolBuilder::new().num_threads(worker_count);
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        if !config.thread_name_prefix.is_empty() {
            let prefix = config.thread_name_prefix.clone();
            builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Worker(format!("Failed to create thread pool: {}", e)))?;

        let (events_tx, events) = flume::unbounded();
        let (released_tx, released) = flume::unbounded();
        let cancelled: CancelSet = Arc::new(Mutex::new(HashSet::new()));

        let lanes = (0..worker_count)
            .map(|lane| {
                let (tx, rx) = flume::unbounded();
                let outbox = events_tx.clone();
                let released = released_tx.clone();
                let cancelled = cancelled.clone();
                pool.spawn(move || run_lane(lane, rx, outbox, released, cancelled));
                tx
            })
            .collect();

        log::debug!("started {} surface lanes", worker_count);
        Ok(Self {
            _pool: pool,
            lanes,
            events,
            released,
            cancelled,
            pending: HashMap::new(),
            unreleased: HashMap::new(),
            next_lane: 0,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.lanes.len()
    }

    /// Count lane acknowledgements and forget cancelled surfaces no lane still holds
    fn collect_releases(&mut self) {
        for surface in self.released.try_iter() {
            let Some(left) = self.unreleased.get_mut(&surface) else {
                continue;
            };
            *left = left.saturating_sub(1);
            if *left == 0 {
                self.unreleased.remove(&surface);
                if let Ok(mut set) = self.cancelled.lock() {
                    set.remove(&surface);
                }
            }
        }
    }

    fn send(&self, lane: usize, message: LaneMessage) -> Result<()> {
        self.lanes[lane]
            .send(message)
            .map_err(|_| Error::Worker(format!("surface lane {} is gone", lane)))
    }
}

impl WorkDispatcher for ThreadPoolDispatcher {
    fn submit(&mut self, surface: SurfaceId, job: SurfaceJob) -> Result<()> {
        let (loaded, units) = LoadedJob::split(job);
        let count = units.len();

        for lane in 0..self.lanes.len() {
            self.send(
                lane,
                LaneMessage::Load {
                    surface,
                    job: loaded.clone(),
                },
            )?;
        }
        for (index, unit) in units.into_iter().enumerate() {
            let lane = self.next_lane;
            self.next_lane = (self.next_lane + 1) % self.lanes.len();
            self.send(lane, LaneMessage::Unit { surface, index, unit })?;
        }
        for lane in 0..self.lanes.len() {
            self.send(lane, LaneMessage::Release { surface })?;
        }

        *self.unreleased.entry(surface).or_default() += self.lanes.len();
        if count > 0 {
            *self.pending.entry(surface).or_default() += count;
        }
        Ok(())
    }

    fn poll(&mut self) -> Vec<WorkerEvent> {
        // a lane reports its units before their release, so this order sees both
        self.collect_releases();
        let events: Vec<WorkerEvent> = self.events.try_iter().collect();
        for event in &events {
            let surface = event.surface();
            if let Some(left) = self.pending.get_mut(&surface) {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    self.pending.remove(&surface);
                }
            }
        }
        events
    }

    fn cancel(&mut self, surface: SurfaceId) {
        self.pending.remove(&surface);
        if self.unreleased.contains_key(&surface) {
            if let Ok(mut set) = self.cancelled.lock() {
                set.insert(surface);
            }
        }
    }

    fn pending(&self) -> usize {
        self.pending.values().sum()
    }
}
