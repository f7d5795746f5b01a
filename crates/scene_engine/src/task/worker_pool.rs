//! Fixed-size worker pool
//!
//! The driving thread submits one batch at a time. Every worker receives the
//! batch over its own channel, pulls jobs off a shared atomic cursor, and
//! reports back on a completion channel; the driver drains jobs alongside
//! them and returns only after every worker has reported. That gives a full
//! barrier per batch.
//!
//! Each worker owns its [`LocalHeap`]. Heaps are purged lazily: the pool
//! bumps a frame stamp and a worker purges its heap the next time it picks
//! up a batch with a newer stamp.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::core::runtime::SceneRuntime;
use crate::foundation::memory::LocalHeap;

use super::job::{JobContext, JobFn, JobQueue};

/// Worker pool errors
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// Thread creation failed
    #[error("failed to spawn worker {id}: {source}")]
    Spawn {
        /// Worker index
        id: usize,
        /// Underlying OS error
        source: std::io::Error,
    },
}

trait RunBatch: Send + Sync {
    fn drain(&self, worker_id: usize, heap: &mut LocalHeap, runtime: &SceneRuntime) -> u64;
}

struct JobBatch<T> {
    jobs: Vec<T>,
    cursor: AtomicUsize,
    func: JobFn<T>,
}

impl<T: Send + Sync> RunBatch for JobBatch<T> {
    fn drain(&self, worker_id: usize, heap: &mut LocalHeap, runtime: &SceneRuntime) -> u64 {
        let mut count = 0;
        loop {
            let idx = self.cursor.fetch_add(1, Ordering::AcqRel);
            let Some(job) = self.jobs.get(idx) else { break };
            let mut ctx = JobContext::new(worker_id, idx, heap, runtime);
            let result = panic::catch_unwind(AssertUnwindSafe(|| (self.func)(job, &mut ctx)));
            if result.is_err() {
                log::error!("Job {} panicked on worker {}", idx, worker_id);
            }
            count += 1;
        }
        count
    }
}

enum Message {
    Run(Arc<dyn RunBatch>),
    Terminate,
}

struct Worker {
    id: usize,
    sender: Sender<Message>,
    thread: Option<thread::JoinHandle<()>>,
}

struct WorkerShared {
    runtime: Arc<SceneRuntime>,
    frame_stamp: AtomicU64,
    active: AtomicUsize,
    completed: Vec<AtomicU64>,
}

impl Worker {
    fn spawn(
        id: usize,
        heap_size: usize,
        shared: Arc<WorkerShared>,
        done: Sender<usize>,
    ) -> Result<Worker, TaskError> {
        let (sender, receiver) = unbounded::<Message>();
        let thread = thread::Builder::new()
            .name(format!("scene-worker-{id}"))
            .spawn(move || Self::run(id, heap_size, &shared, &receiver, &done))
            .map_err(|source| TaskError::Spawn { id, source })?;

        Ok(Worker {
            id,
            sender,
            thread: Some(thread),
        })
    }

    fn run(id: usize, heap_size: usize, shared: &WorkerShared, receiver: &Receiver<Message>, done: &Sender<usize>) {
        let mut heap = LocalHeap::new(id, heap_size);
        let mut seen_stamp = shared.frame_stamp.load(Ordering::Acquire);
        while let Ok(Message::Run(batch)) = receiver.recv() {
            let stamp = shared.frame_stamp.load(Ordering::Acquire);
            if stamp != seen_stamp {
                heap.purge();
                seen_stamp = stamp;
            }
            shared.active.fetch_add(1, Ordering::AcqRel);
            let count = batch.drain(id, &mut heap, &shared.runtime);
            if let Some(counter) = shared.completed.get(id) {
                counter.fetch_add(count, Ordering::Relaxed);
            }
            shared.active.fetch_sub(1, Ordering::AcqRel);
            // Release the batch before signalling so the driver can reclaim it
            drop(batch);
            if done.send(id).is_err() {
                break;
            }
        }
        log::trace!("Worker {} exiting", id);
    }
}

/// Fixed set of threads consuming job batches from a single driver
pub struct WorkerPool {
    workers: Vec<Worker>,
    done: Receiver<usize>,
    shared: Arc<WorkerShared>,
    driver_heap: LocalHeap,
    driver_completed: u64,
}

impl WorkerPool {
    /// Spawn `num_workers` threads, each with a heap of `heap_size` bytes
    ///
    /// With zero workers every batch runs on the calling thread.
    pub fn new(num_workers: usize, heap_size: usize, runtime: Arc<SceneRuntime>) -> Result<Self, TaskError> {
        let shared = Arc::new(WorkerShared {
            runtime,
            frame_stamp: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            completed: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
        });
        let (done_tx, done_rx) = unbounded::<usize>();

        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            workers.push(Worker::spawn(id, heap_size, Arc::clone(&shared), done_tx.clone())?);
        }
        log::info!("Worker pool started with {} workers", num_workers);

        Ok(Self {
            workers,
            done: done_rx,
            shared,
            driver_heap: LocalHeap::new(num_workers, heap_size),
            driver_completed: 0,
        })
    }

    /// Number of worker threads
    pub fn workers_num(&self) -> usize {
        self.workers.len()
    }

    /// Workers currently draining a batch
    pub fn active_workers_num(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Jobs completed per worker since creation, followed by the driver's count
    pub fn completed_jobs(&self) -> Vec<u64> {
        self.shared
            .completed
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .chain(std::iter::once(self.driver_completed))
            .collect()
    }

    /// Runtime shared by all jobs
    pub fn runtime(&self) -> &Arc<SceneRuntime> {
        &self.shared.runtime
    }

    /// Start a new frame: purge the driver heap now and worker heaps lazily
    pub fn begin_frame(&mut self) {
        self.shared.frame_stamp.fetch_add(1, Ordering::AcqRel);
        self.driver_heap.purge();
    }

    /// Run every job in `queue` with `func` and wait for all of them
    ///
    /// Returns the number of jobs executed. The queue is emptied but keeps
    /// its allocation.
    pub fn execute<T>(&mut self, queue: &mut JobQueue<T>, func: JobFn<T>) -> usize
    where
        T: Send + Sync + 'static,
    {
        let jobs = queue.take_jobs();
        let njob = jobs.len();
        if njob == 0 {
            queue.restore_jobs(jobs);
            return 0;
        }

        let batch = Arc::new(JobBatch {
            jobs,
            cursor: AtomicUsize::new(0),
            func,
        });

        let mut dispatched = 0;
        if njob > 1 {
            for worker in &self.workers {
                let run: Arc<dyn RunBatch> = batch.clone();
                if worker.sender.send(Message::Run(run)).is_ok() {
                    dispatched += 1;
                } else {
                    log::warn!("Worker {} is gone; running its share on the driver", worker.id);
                }
            }
        }

        self.driver_completed += batch.drain(self.workers.len(), &mut self.driver_heap, &self.shared.runtime);

        for _ in 0..dispatched {
            if self.done.recv().is_err() {
                break;
            }
        }

        match Arc::try_unwrap(batch) {
            Ok(batch) => queue.restore_jobs(batch.jobs),
            Err(_) => queue.restore_jobs(Vec::new()),
        }
        njob
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.sender.send(Message::Terminate);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.thread.take() {
                if handle.join().is_err() {
                    log::warn!("Worker {} terminated abnormally", worker.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(workers, 0, Arc::new(SceneRuntime::default())).unwrap()
    }

    #[test]
    fn test_every_job_runs_once() {
        let mut pool = pool(4);
        let hits: Arc<Vec<AtomicUsize>> = Arc::new((0..100).map(|_| AtomicUsize::new(0)).collect());
        let mut queue = JobQueue::new();
        queue.reserve(100);
        for i in 0..100usize {
            queue.add(i);
        }
        let counter = Arc::clone(&hits);
        let ran = pool.execute(&mut queue, Arc::new(move |job: &usize, _ctx: &mut JobContext<'_>| {
            counter[*job].fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran, 100);
        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
        assert_eq!(pool.completed_jobs().iter().sum::<u64>(), 100);
        assert_eq!(queue.capacity(), 100);
        assert_eq!(queue.recreate_count(), 1);
    }

    #[test]
    fn test_batches_are_barriers() {
        let mut pool = pool(3);
        let finished_first = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));
        let mut queue = JobQueue::new();

        for _ in 0..20 {
            queue.add(());
        }
        let done = Arc::clone(&finished_first);
        pool.execute(&mut queue, Arc::new(move |_: &(), _ctx: &mut JobContext<'_>| {
            thread::yield_now();
            done.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..20 {
            queue.add(());
        }
        let done = Arc::clone(&finished_first);
        let bad = Arc::clone(&violations);
        pool.execute(&mut queue, Arc::new(move |_: &(), _ctx: &mut JobContext<'_>| {
            if done.load(Ordering::SeqCst) != 20 {
                bad.fetch_add(1, Ordering::SeqCst);
            }
        }));
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_workers_runs_on_driver() {
        let mut pool = pool(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queue = JobQueue::new();
        for i in 0..5u32 {
            queue.add(i);
        }
        let sink = Arc::clone(&seen);
        pool.execute(&mut queue, Arc::new(move |job: &u32, ctx: &mut JobContext<'_>| {
            sink.lock().unwrap().push((*job, ctx.worker_id()));
        }));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|(_, worker)| *worker == 0));
        assert_eq!(pool.completed_jobs(), vec![5]);
    }

    #[test]
    fn test_panicking_job_does_not_stall_the_batch() {
        let mut pool = pool(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let mut queue = JobQueue::new();
        for i in 0..10u32 {
            queue.add(i);
        }
        let count = Arc::clone(&ran);
        pool.execute(&mut queue, Arc::new(move |job: &u32, _ctx: &mut JobContext<'_>| {
            if *job == 3 {
                panic!("job failure");
            }
            count.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_local_heap_is_purged_per_frame() {
        let mut pool = pool(0);
        let used = Arc::new(Mutex::new(Vec::new()));
        let mut queue = JobQueue::new();
        for frame in 0..2 {
            pool.begin_frame();
            queue.add(frame);
            let sink = Arc::clone(&used);
            pool.execute(&mut queue, Arc::new(move |_: &i32, ctx: &mut JobContext<'_>| {
                let before = ctx.local_heap().used();
                let _ = ctx.local_heap().alloc(16);
                sink.lock().unwrap().push(before);
            }));
        }
        assert_eq!(*used.lock().unwrap(), vec![0, 0]);
    }
}
