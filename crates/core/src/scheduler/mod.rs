//! Named worker pools for work the protocol handler must not block on.
//!
//! A [`ScheduleManager`] owns any number of [`ScheduleUnit`]s keyed by name.
//! Each unit is a fixed set of worker threads pulling [`Job`]s from a
//! bounded priority queue:
//!
//! ```text
//! init_job("rtsp-stream-control", 4, 64)
//! start_job("rtsp-stream-control", job)   -> queued, runs on a worker
//! stop_job("rtsp-stream-control", key)    -> cancelled by key
//! stop_all("rtsp-stream-control")         -> everything cancelled, unit removed
//! ```
//!
//! Creating and removing units is serialized by the manager's lock; job
//! submission only touches the unit's own queue.

pub mod control;
pub mod job;
pub mod unit;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};

pub use control::StreamControlJob;
pub use job::{CancelToken, Job};
pub use unit::ScheduleUnit;

/// Registry of named [`ScheduleUnit`]s.
#[derive(Default)]
pub struct ScheduleManager {
    units: Mutex<HashMap<String, Arc<ScheduleUnit>>>,
}

impl ScheduleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the unit `name` unless it already exists.
    ///
    /// An existing unit is left untouched, including its pool size and
    /// active jobs. Fails only if worker threads cannot be spawned.
    pub fn init_job(&self, name: &str, pool_size: usize, queue_capacity: usize) -> Result<()> {
        let mut units = self.units.lock();
        if units.contains_key(name) {
            tracing::debug!(unit = name, "schedule unit already exists");
            return Ok(());
        }

        let unit = ScheduleUnit::new(name, pool_size, queue_capacity)?;
        units.insert(name.to_string(), Arc::new(unit));
        tracing::info!(unit = name, pool_size, queue_capacity, "schedule unit initialized");
        Ok(())
    }

    /// Submit `job` to the unit `name`.
    pub fn start_job(&self, name: &str, job: Arc<dyn Job>) -> Result<()> {
        let unit = self
            .unit(name)
            .ok_or_else(|| RtspError::ScheduleUnitNotFound(name.to_string()))?;
        unit.submit(job)
    }

    /// Cancel the job `key` in unit `name`; missing unit or job is a no-op.
    pub fn stop_job(&self, name: &str, key: &str) {
        match self.unit(name) {
            Some(unit) => {
                if !unit.cancel(key) {
                    tracing::debug!(unit = name, key, "no active job to stop");
                }
            }
            None => tracing::debug!(unit = name, key, "stop job for unknown schedule unit"),
        }
    }

    /// Cancel every job in `name`, stop its workers and remove it.
    pub fn stop_all(&self, name: &str) {
        let Some(unit) = self.unit(name) else {
            return;
        };

        unit.stop_all();

        let mut units = self.units.lock();
        if units
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, &unit))
        {
            units.remove(name);
        }
        tracing::info!(unit = name, "schedule unit removed");
    }

    /// Queued plus running jobs in `name`; 0 if the unit does not exist.
    pub fn active_job_count(&self, name: &str) -> usize {
        self.unit(name).map_or(0, |unit| unit.active_count())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.lock().contains_key(name)
    }

    pub fn unit_count(&self) -> usize {
        self.units.lock().len()
    }

    /// Snapshot of the registered unit names.
    pub fn unit_names(&self) -> Vec<String> {
        self.units.lock().keys().cloned().collect()
    }

    pub fn unit(&self, name: &str) -> Option<Arc<ScheduleUnit>> {
        self.units.lock().get(name).cloned()
    }
}
