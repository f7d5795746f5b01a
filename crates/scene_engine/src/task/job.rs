//! Jobs, job queues and the context handed to each running job

use std::sync::Arc;

use crate::core::runtime::SceneRuntime;
use crate::foundation::memory::LocalHeap;

/// Function run once per job in a batch
pub type JobFn<T> = Arc<dyn Fn(&T, &mut JobContext<'_>) + Send + Sync>;

/// Per-job execution context
///
/// Gives a job its worker identity, the worker's private scratch heap and
/// the process-wide runtime.
pub struct JobContext<'a> {
    worker_id: usize,
    job_index: usize,
    heap: &'a mut LocalHeap,
    runtime: &'a SceneRuntime,
}

impl<'a> JobContext<'a> {
    pub(crate) fn new(worker_id: usize, job_index: usize, heap: &'a mut LocalHeap, runtime: &'a SceneRuntime) -> Self {
        Self {
            worker_id,
            job_index,
            heap,
            runtime,
        }
    }

    /// Worker running this job; the driving thread reports the worker count
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Position of this job within its batch
    pub fn job_index(&self) -> usize {
        self.job_index
    }

    /// The running worker's scratch heap (no locking required)
    pub fn local_heap(&mut self) -> &mut LocalHeap {
        self.heap
    }

    /// Process-wide runtime
    pub fn runtime(&self) -> &SceneRuntime {
        self.runtime
    }

    /// Next value from the global generator
    pub fn rng_next(&self) -> u64 {
        self.runtime.rng_next()
    }
}

/// Growable job list that is only reallocated when it must grow
#[derive(Debug)]
pub struct JobQueue<T> {
    jobs: Vec<T>,
    capacity: usize,
    recreate_count: usize,
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JobQueue<T> {
    /// Create an empty queue with no capacity
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            capacity: 0,
            recreate_count: 0,
        }
    }

    /// Ensure room for `njob` jobs, recreating the queue only if it is too small
    pub fn reserve(&mut self, njob: usize) {
        if njob > self.capacity {
            log::debug!("Job queue resize: {} -> {}", self.capacity, njob);
            self.jobs = Vec::with_capacity(njob);
            self.capacity = njob;
            self.recreate_count += 1;
        }
    }

    /// Drop all queued jobs, keeping the allocation
    pub fn purge(&mut self) {
        self.jobs.clear();
    }

    /// Append a job; grows (counted as a recreate) if `reserve` was skipped
    pub fn add(&mut self, job: T) {
        if self.jobs.len() >= self.capacity {
            self.capacity = (self.capacity * 2).max(self.jobs.len() + 1);
            self.jobs.reserve(self.capacity - self.jobs.len());
            self.recreate_count += 1;
        }
        self.jobs.push(job);
    }

    /// Number of queued jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True when no jobs are queued
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Maximum job count before the next recreate
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many times the backing storage was recreated
    pub fn recreate_count(&self) -> usize {
        self.recreate_count
    }

    /// Queued jobs
    pub fn jobs(&self) -> &[T] {
        &self.jobs
    }

    pub(crate) fn take_jobs(&mut self) -> Vec<T> {
        std::mem::take(&mut self.jobs)
    }

    pub(crate) fn restore_jobs(&mut self, mut jobs: Vec<T>) {
        jobs.clear();
        if jobs.capacity() >= self.capacity {
            self.jobs = jobs;
        } else {
            self.jobs = Vec::with_capacity(self.capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_only_grows() {
        let mut queue: JobQueue<u32> = JobQueue::new();
        queue.reserve(8);
        assert_eq!(queue.recreate_count(), 1);
        queue.reserve(4);
        queue.reserve(8);
        assert_eq!(queue.recreate_count(), 1);
        assert_eq!(queue.capacity(), 8);
        queue.reserve(9);
        assert_eq!(queue.recreate_count(), 2);
    }

    #[test]
    fn test_purge_keeps_capacity() {
        let mut queue: JobQueue<u32> = JobQueue::new();
        queue.reserve(4);
        for i in 0..4 {
            queue.add(i);
        }
        assert_eq!(queue.len(), 4);
        queue.purge();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
        assert_eq!(queue.recreate_count(), 1);
    }

    #[test]
    fn test_add_past_capacity_grows() {
        let mut queue: JobQueue<u32> = JobQueue::new();
        queue.reserve(1);
        queue.add(1);
        queue.add(2);
        assert_eq!(queue.jobs(), &[1, 2]);
        assert!(queue.capacity() >= 2);
    }
}
