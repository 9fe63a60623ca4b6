use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, RtspError};
use crate::scheduler::job::{CancelToken, Job};

/// A queued submission. Ordered by priority, then by submission order.
struct Pending {
    priority: u8,
    seq: u64,
    job: Arc<dyn Job>,
    token: CancelToken,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: higher priority first, then the lower sequence number.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Active {
    job: Arc<dyn Job>,
    token: CancelToken,
}

struct QueueState {
    queue: BinaryHeap<Pending>,
    /// Queued and running jobs, by key.
    active: HashMap<String, Active>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    name: String,
    state: Mutex<QueueState>,
    available: Condvar,
}

/// A named, fixed-size worker pool fed by a bounded priority queue.
///
/// `queue_capacity` bounds the jobs waiting for a worker; jobs already
/// running do not count against it. A full queue rejects new submissions
/// with [`RtspError::ScheduleQueueFull`].
pub struct ScheduleUnit {
    name: String,
    pool_size: usize,
    queue_capacity: usize,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ScheduleUnit {
    /// Spawn `pool_size` workers. Both `pool_size` and `queue_capacity`
    /// are raised to at least one.
    pub fn new(name: &str, pool_size: usize, queue_capacity: usize) -> Result<Self> {
        let pool_size = pool_size.max(1);
        let queue_capacity = queue_capacity.max(1);
        let shared = Arc::new(Shared {
            name: name.to_string(),
            state: Mutex::new(QueueState {
                queue: BinaryHeap::with_capacity(queue_capacity),
                active: HashMap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let unit = Self {
            name: name.to_string(),
            pool_size,
            queue_capacity,
            shared,
            workers: Mutex::new(Vec::with_capacity(pool_size)),
        };

        for index in 0..pool_size {
            let shared = unit.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || worker_loop(shared))?;
            unit.workers.lock().push(handle);
        }

        tracing::debug!(unit = name, pool_size, queue_capacity, "schedule unit created");
        Ok(unit)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Queue `job` for execution.
    pub fn submit(&self, job: Arc<dyn Job>) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(RtspError::ScheduleUnitStopped(self.name.clone()));
        }

        let key = job.key().to_string();
        if state.active.contains_key(&key) {
            return Err(RtspError::DuplicateJob {
                unit: self.name.clone(),
                key,
            });
        }
        if state.queue.len() >= self.queue_capacity {
            tracing::warn!(unit = %self.name, %key, capacity = self.queue_capacity, "schedule queue full");
            return Err(RtspError::ScheduleQueueFull {
                unit: self.name.clone(),
                capacity: self.queue_capacity,
            });
        }

        let token = CancelToken::new();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Pending {
            priority: job.priority(),
            seq,
            job: job.clone(),
            token: token.clone(),
        });
        state.active.insert(key.clone(), Active { job, token });
        drop(state);

        self.shared.available.notify_one();
        tracing::trace!(unit = %self.name, %key, seq, "job queued");
        Ok(())
    }

    /// Cancel the queued or running job with `key`. Returns whether one was found.
    pub fn cancel(&self, key: &str) -> bool {
        let active = {
            let mut state = self.shared.state.lock();
            let Some(active) = state.active.remove(key) else {
                return false;
            };
            state.queue.retain(|pending| !pending.token.same(&active.token));
            active
        };

        active.token.cancel();
        active.job.cancel();
        tracing::debug!(unit = %self.name, key, "job cancelled");
        true
    }

    /// Cancel everything and stop the workers. The unit accepts no more jobs.
    ///
    /// Workers are joined unless this is called from one of them.
    pub fn stop_all(&self) {
        let cancelled: Vec<Active> = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.queue.clear();
            state.active.drain().map(|(_, active)| active).collect()
        };
        self.shared.available.notify_all();

        for active in &cancelled {
            active.token.cancel();
            active.job.cancel();
        }

        let current = thread::current().id();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(unit = %self.name, "worker exited with a panic");
            }
        }

        if !cancelled.is_empty() {
            tracing::debug!(unit = %self.name, cancelled = cancelled.len(), "schedule unit stopped");
        }
    }

    /// Number of queued plus running jobs.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().shutdown
    }
}

impl Drop for ScheduleUnit {
    fn drop(&mut self) {
        if !self.is_stopped() {
            self.stop_all();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let pending = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(pending) = state.queue.pop() {
                    break pending;
                }
                shared.available.wait(&mut state);
            }
        };

        let key = pending.job.key().to_string();
        tracing::trace!(unit = %shared.name, %key, "job running");

        let job = pending.job.clone();
        let token = pending.token.clone();
        if panic::catch_unwind(AssertUnwindSafe(|| job.run(&token))).is_err() {
            tracing::error!(unit = %shared.name, %key, "job panicked");
        }

        let mut state = shared.state.lock();
        if state
            .active
            .get(&key)
            .is_some_and(|active| active.token.same(&pending.token))
        {
            state.active.remove(&key);
        }
    }
}
