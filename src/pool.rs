use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads pulling jobs off a shared queue.
///
/// A panicking job is logged and the worker keeps going. Jobs submitted
/// after [`WorkerPool::shutdown`] run inline on the submitting thread so
/// callers waiting on their completion never hang.
pub struct WorkerPool {
    name: String,
    size: usize,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = receiver.clone();
            let pool_name = name.to_string();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&pool_name, receiver))
                .with_context(|| format!("spawn {name} worker {index}"))?;
            workers.push(handle);
        }
        tracing::debug!(pool = name, size, "worker pool started");
        Ok(Self {
            name: name.to_string(),
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        let rejected = {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            match sender.as_ref() {
                Some(tx) => tx.send(job).err().map(|err| err.into_inner()),
                None => Some(job),
            }
        };
        if let Some(job) = rejected {
            tracing::debug!(pool = %self.name, "pool closed; running job inline");
            run_job(&self.name, job);
        }
    }

    /// Closes the queue and joins every worker once the queued jobs drain.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(pool = %self.name, "worker thread exited with a panic");
            }
        }
        tracing::debug!(pool = %self.name, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(name: &str, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        run_job(name, job);
    }
}

fn run_job(name: &str, job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        tracing::error!(
            pool = name,
            panic = %panic_message(payload.as_ref()),
            "worker job panicked"
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
