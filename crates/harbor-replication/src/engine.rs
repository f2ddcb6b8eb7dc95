//! Parallel redo engine.
//!
//! Applies page-bound redo jobs across a worker pool while preserving
//! per-page log order: jobs are keyed by page identity into FIFO queues,
//! and a queue is drained by at most one worker at a time. Sentinel jobs
//! live in their own queue and may run on any worker concurrently.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use harbor_common::types::Vpid;
use harbor_log::source::LogSource;

use crate::error::{ReplicationError, ReplicationResult};
use crate::job::{RedoJob, ReplicationContext, WorkerContext};
use crate::monitor::MinLsaMonitor;

/// Worker pool that dispatches redo jobs with per-page ordering.
///
/// Lifecycle: jobs enter through [`ParallelRedoEngine::add`] until
/// [`ParallelRedoEngine::set_adding_finished`] closes the input;
/// [`ParallelRedoEngine::wait_for_idle`] drains without closing;
/// [`ParallelRedoEngine::wait_for_termination_and_stop_execution`] joins
/// the workers and surfaces the first worker failure.
pub struct ParallelRedoEngine {
    core: Arc<EngineCore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct EngineCore {
    queues: Mutex<JobQueues>,
    work_available: Condvar,
    space_available: Condvar,
    drained: Condvar,
    monitor: Arc<MinLsaMonitor>,
    capacity: usize,
    failure: Mutex<Option<ReplicationError>>,
    aborted: AtomicBool,
}

#[derive(Default)]
struct JobQueues {
    per_page: HashMap<Vpid, VecDeque<RedoJob>>,
    // Pages currently claimed by a worker.
    busy: HashSet<Vpid>,
    // Pages with queued jobs and no worker; each appears exactly once.
    ready: VecDeque<Vpid>,
    sentinel: VecDeque<RedoJob>,
    // Jobs added and not yet completed, queued or executing.
    outstanding: usize,
    adding_finished: bool,
}

enum Claimed {
    Page(RedoJob),
    Sentinel(RedoJob),
}

impl ParallelRedoEngine {
    /// Spawns `worker_count` workers against the given log and context.
    pub(crate) fn new(
        worker_count: usize,
        capacity: usize,
        monitor: Arc<MinLsaMonitor>,
        context: Arc<ReplicationContext>,
        log: Arc<dyn LogSource>,
    ) -> Self {
        let core = Arc::new(EngineCore {
            queues: Mutex::new(JobQueues::default()),
            work_available: Condvar::new(),
            space_available: Condvar::new(),
            drained: Condvar::new(),
            monitor,
            capacity,
            failure: Mutex::new(None),
            aborted: AtomicBool::new(false),
        });

        let workers = (0..worker_count)
            .map(|index| {
                let core = Arc::clone(&core);
                let ctx = WorkerContext::new(Arc::clone(&log), Arc::clone(&context));
                std::thread::Builder::new()
                    .name(format!("harbor-redo-{index}"))
                    .spawn(move || worker_loop(&core, ctx))
                    .expect("failed to spawn redo worker")
            })
            .collect();

        Self {
            core,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a job; ownership transfers to the engine.
    ///
    /// Blocks while the engine is at capacity. Fails if the input has been
    /// closed.
    pub fn add(&self, job: RedoJob) -> ReplicationResult<()> {
        // Reserve before the job becomes poppable so the minimum unapplied
        // address accounts for it from the moment it logically exists.
        self.core.monitor.reserve(job.rec_lsa());

        let mut queues = self.core.queues.lock();
        while !queues.adding_finished && queues.outstanding >= self.core.capacity {
            self.core.space_available.wait(&mut queues);
        }
        if queues.adding_finished {
            drop(queues);
            self.core.monitor.retract(job.rec_lsa());
            return Err(ReplicationError::EngineClosed);
        }

        queues.outstanding += 1;
        let vpid = job.vpid();
        if vpid.is_sentinel() {
            queues.sentinel.push_back(job);
        } else {
            let queue = queues.per_page.entry(vpid).or_default();
            let was_empty = queue.is_empty();
            queue.push_back(job);
            if was_empty && !queues.busy.contains(&vpid) {
                queues.ready.push_back(vpid);
            }
        }
        drop(queues);

        self.core.work_available.notify_one();
        Ok(())
    }

    /// Closes the input; subsequent [`ParallelRedoEngine::add`] calls fail.
    pub fn set_adding_finished(&self) {
        let mut queues = self.core.queues.lock();
        queues.adding_finished = true;
        drop(queues);

        self.core.work_available.notify_all();
        self.core.space_available.notify_all();
        self.core.drained.notify_all();
    }

    /// Blocks until every job added so far has completed. The input stays
    /// open; more jobs may be added afterwards.
    pub fn wait_for_idle(&self) {
        let mut queues = self.core.queues.lock();
        self.core
            .drained
            .wait_while(&mut queues, |queues| queues.outstanding > 0);
    }

    /// Joins the workers and surfaces the first worker failure.
    ///
    /// The input must have been closed with
    /// [`ParallelRedoEngine::set_adding_finished`] first.
    pub fn wait_for_termination_and_stop_execution(&self) -> ReplicationResult<()> {
        debug_assert!(self.core.queues.lock().adding_finished);

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                return Err(ReplicationError::WorkerPanicked);
            }
        }

        match self.core.failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ParallelRedoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queues = self.core.queues.lock();
        f.debug_struct("ParallelRedoEngine")
            .field("outstanding", &queues.outstanding)
            .field("adding_finished", &queues.adding_finished)
            .field("aborted", &self.core.aborted.load(Ordering::Relaxed))
            .finish()
    }
}

fn worker_loop(core: &EngineCore, mut ctx: WorkerContext) {
    loop {
        let claimed = {
            let mut queues = core.queues.lock();
            loop {
                if let Some(job) = queues.sentinel.pop_front() {
                    break Claimed::Sentinel(job);
                }
                if let Some(vpid) = queues.ready.pop_front() {
                    let queue = queues
                        .per_page
                        .get_mut(&vpid)
                        .expect("ready page has a queue");
                    let job = queue.pop_front().expect("ready queue is non-empty");
                    queues.busy.insert(vpid);
                    break Claimed::Page(job);
                }
                if queues.adding_finished && queues.outstanding == 0 {
                    return;
                }
                core.work_available.wait(&mut queues);
            }
        };

        let job = match &claimed {
            Claimed::Page(job) | Claimed::Sentinel(job) => job,
        };

        // After a failure remaining jobs drain without applying, so waiters
        // and shutdown still make progress.
        if !core.aborted.load(Ordering::Acquire) {
            if let Err(job_error) = job.execute(&mut ctx) {
                error!(
                    rec_lsa = %job.rec_lsa(),
                    vpid = ?job.vpid(),
                    error = %job_error,
                    "redo job failed; aborting engine"
                );
                core.aborted.store(true, Ordering::Release);
                let mut failure = core.failure.lock();
                if failure.is_none() {
                    *failure = Some(job_error);
                }
            } else {
                trace!(rec_lsa = %job.rec_lsa(), vpid = ?job.vpid(), "redo job done");
            }
        }

        let rec_lsa = job.rec_lsa();
        let vpid = job.vpid();
        {
            let mut queues = core.queues.lock();
            queues.outstanding -= 1;

            if let Claimed::Page(_) = claimed {
                queues.busy.remove(&vpid);
                let has_more = queues
                    .per_page
                    .get(&vpid)
                    .is_some_and(|queue| !queue.is_empty());
                if has_more {
                    queues.ready.push_back(vpid);
                    core.work_available.notify_one();
                } else {
                    queues.per_page.remove(&vpid);
                }
            }

            if queues.outstanding == 0 {
                core.drained.notify_all();
                if queues.adding_finished {
                    core.work_available.notify_all();
                }
            }
        }
        core.space_available.notify_one();
        core.monitor.retract(rec_lsa);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree;
    use crate::metrics::ReplicationMetrics;
    use harbor_buffer::PageBuffer;
    use harbor_common::types::{Lsa, UniqueStats};
    use harbor_log::memory::MemoryLog;

    struct EngineFixture {
        engine: ParallelRedoEngine,
        context: Arc<ReplicationContext>,
        metrics: Arc<ReplicationMetrics>,
        monitor: Arc<MinLsaMonitor>,
    }

    fn test_engine(workers: usize, capacity: usize) -> EngineFixture {
        let monitor = Arc::new(MinLsaMonitor::new());
        let metrics = Arc::new(ReplicationMetrics::new());
        let context = Arc::new(ReplicationContext {
            buffer: Arc::new(PageBuffer::with_page_size(256)),
            sink: Arc::clone(&metrics) as Arc<dyn crate::metrics::MetricsSink>,
            trace_delay: false,
        });
        let log: Arc<dyn LogSource> = Arc::new(MemoryLog::new());
        let engine = ParallelRedoEngine::new(
            workers,
            capacity,
            Arc::clone(&monitor),
            Arc::clone(&context),
            log,
        );
        EngineFixture {
            engine,
            context,
            metrics,
            monitor,
        }
    }

    #[test]
    fn test_idle_with_no_jobs() {
        let EngineFixture { engine, .. } = test_engine(4, 16);
        engine.wait_for_idle();
        engine.set_adding_finished();
        engine.wait_for_termination_and_stop_execution().unwrap();
    }

    #[test]
    fn test_add_after_close_fails() {
        let EngineFixture { engine, .. } = test_engine(1, 16);
        engine.set_adding_finished();
        let job = RedoJob::replication_delay(Lsa::new(0, 0), 1);
        assert!(matches!(
            engine.add(job),
            Err(ReplicationError::EngineClosed)
        ));
        engine.wait_for_termination_and_stop_execution().unwrap();
    }

    #[test]
    fn test_same_page_jobs_apply_in_order() {
        let EngineFixture {
            engine, context, ..
        } = test_engine(4, 1024);
        let root = harbor_common::types::Vpid::new(2, 42);

        // Each job writes its own statistics; the record address guard
        // means out-of-order application would leave an older value behind.
        for i in 1..=200i64 {
            let job = RedoJob::btree_stats(
                root,
                Lsa::new(0, (i * 8) as i16),
                UniqueStats::new(i, i, i),
            );
            engine.add(job).unwrap();
        }

        engine.wait_for_idle();
        assert_eq!(
            btree::read_root_stats(&context.buffer, root).unwrap(),
            UniqueStats::new(200, 200, 200)
        );

        engine.set_adding_finished();
        engine.wait_for_termination_and_stop_execution().unwrap();
    }

    #[test]
    fn test_sentinel_jobs_execute() {
        let EngineFixture {
            engine, metrics, ..
        } = test_engine(2, 16);
        let now = crate::delay::now_msec();
        for i in 0..10 {
            engine
                .add(RedoJob::replication_delay(Lsa::new(0, i * 8), now - 3))
                .unwrap();
        }

        engine.wait_for_idle();
        assert_eq!(metrics.delay_samples(), 10);
        assert!(metrics.last_delay_msec() >= 3);

        engine.set_adding_finished();
        engine.wait_for_termination_and_stop_execution().unwrap();
    }

    #[test]
    fn test_monitor_reservations_drain() {
        let EngineFixture {
            engine, monitor, ..
        } = test_engine(2, 16);
        monitor.set_producer_frontier(Lsa::new(1, 0));

        for i in 0..50 {
            engine
                .add(RedoJob::replication_delay(Lsa::new(0, i * 8), 1))
                .unwrap();
        }
        engine.wait_for_idle();
        assert_eq!(monitor.get_minimum(), Lsa::new(1, 0));

        engine.set_adding_finished();
        engine.wait_for_termination_and_stop_execution().unwrap();
    }

    #[test]
    fn test_backpressure_blocks_then_drains() {
        let EngineFixture { engine, .. } = test_engine(1, 4);
        for i in 0..64 {
            engine
                .add(RedoJob::replication_delay(Lsa::new(0, i * 8), 1))
                .unwrap();
        }
        engine.wait_for_idle();
        engine.set_adding_finished();
        engine.wait_for_termination_and_stop_execution().unwrap();
    }
}
