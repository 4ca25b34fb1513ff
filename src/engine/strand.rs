use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::pool::{panic_message, WorkerPool};

type Job = Box<dyn FnOnce() + Send + 'static>;

type Lanes<K> = Arc<Mutex<HashMap<K, VecDeque<Job>>>>;

/// Runs jobs on a shared pool, one at a time per key.
///
/// A key with queued work occupies at most one pool job. After each job the
/// key goes to the back of the pool queue so busy keys cannot starve others.
pub(crate) struct StrandExecutor<K> {
    pool: Arc<WorkerPool>,
    lanes: Lanes<K>,
}

impl<K> StrandExecutor<K>
where
    K: Eq + Hash + Copy + Debug + Send + 'static,
{
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn submit<F>(&self, key: K, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let start = {
            let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
            // A lane exists exactly while a pool job owns the key.
            let idle = !lanes.contains_key(&key);
            lanes.entry(key).or_default().push_back(Box::new(job));
            idle
        };
        if start {
            schedule(Arc::clone(&self.pool), Arc::clone(&self.lanes), key);
        }
    }

    /// Keys that currently have work queued or running.
    pub fn busy(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn schedule<K>(pool: Arc<WorkerPool>, lanes: Lanes<K>, key: K)
where
    K: Eq + Hash + Copy + Debug + Send + 'static,
{
    let runner = Arc::clone(&pool);
    pool.execute(move || run_next(runner, lanes, key));
}

fn run_next<K>(pool: Arc<WorkerPool>, lanes: Lanes<K>, key: K)
where
    K: Eq + Hash + Copy + Debug + Send + 'static,
{
    let job = lanes
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get_mut(&key)
        .and_then(VecDeque::pop_front);
    if let Some(job) = job {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(
                strand = ?key,
                panic = %panic_message(payload.as_ref()),
                "strand job panicked"
            );
        }
    }

    let more = {
        let mut guard = lanes.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.get(&key) {
            Some(queue) if !queue.is_empty() => true,
            _ => {
                guard.remove(&key);
                false
            }
        }
    };
    if more {
        schedule(pool, lanes, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn jobs_on_one_key_never_overlap_and_keep_order() {
        let pool = Arc::new(WorkerPool::new("strand-test", 4).expect("pool"));
        let strands = StrandExecutor::new(Arc::clone(&pool));
        let running = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        for i in 0..50 {
            let running = Arc::clone(&running);
            let order = Arc::clone(&order);
            let done_tx = done_tx.clone();
            strands.submit(7u32, move || {
                assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0, "overlap");
                std::thread::sleep(Duration::from_micros(200));
                order.lock().unwrap().push(i);
                running.fetch_sub(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            });
        }
        for _ in 0..50 {
            done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("strand job finished");
        }
        assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
        pool.shutdown();
        assert_eq!(strands.busy(), 0);
    }

    #[test]
    fn different_keys_run_concurrently() {
        let pool = Arc::new(WorkerPool::new("strand-test", 2).expect("pool"));
        let strands = StrandExecutor::new(Arc::clone(&pool));
        let (a_tx, a_rx) = mpsc::channel::<()>();
        let (b_tx, b_rx) = mpsc::channel::<()>();

        // Each job waits for the other; only concurrent execution finishes.
        strands.submit(1u32, move || {
            a_tx.send(()).unwrap();
            b_rx.recv_timeout(Duration::from_secs(5)).expect("b ran");
        });
        let (done_tx, done_rx) = mpsc::channel();
        strands.submit(2u32, move || {
            b_tx.send(()).unwrap();
            a_rx.recv_timeout(Duration::from_secs(5)).expect("a ran");
            done_tx.send(()).unwrap();
        });
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("both strands ran");
    }

    #[test]
    fn panicking_job_does_not_wedge_the_strand() {
        let pool = Arc::new(WorkerPool::new("strand-test", 1).expect("pool"));
        let strands = StrandExecutor::new(Arc::clone(&pool));
        strands.submit(0u8, || panic!("boom"));
        let (tx, rx) = mpsc::channel();
        strands.submit(0u8, move || tx.send(()).unwrap());
        rx.recv_timeout(Duration::from_secs(5))
            .expect("strand kept going after a panic");
    }
}
