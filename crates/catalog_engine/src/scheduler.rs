use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures_util::StreamExt;
use harvest_logging::{harvest_debug, harvest_error};
use tokio::sync::mpsc;
use tokio_util::time::DelayQueue;

type DeadlineTask = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    after: Duration,
    task: DeadlineTask,
}

/// Runs delayed tasks on one dedicated thread.
///
/// Submission is safe from any thread. Deadline tasks never execute on the
/// I/O workers, so a burst of expiring deadlines cannot stall downloads.
/// Shutting down drops every pending task without running it.
pub struct DeadlineScheduler {
    tx: Mutex<Option<mpsc::UnboundedSender<Scheduled>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeadlineScheduler {
    pub fn start() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name("deadline-scheduler".into())
            .spawn(move || run(rx))?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues `task` to run once `after` has elapsed.
    ///
    /// Returns `false` when the scheduler has been shut down; the task is
    /// dropped in that case.
    pub fn schedule<F>(&self, after: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx
                .send(Scheduled {
                    after,
                    task: Box::new(task),
                })
                .is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stops the scheduler thread and discards pending tasks. Idempotent.
    pub fn shutdown(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(tx);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                harvest_error!("deadline scheduler thread panicked");
            }
        }
    }
}

impl Drop for DeadlineScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut rx: mpsc::UnboundedReceiver<Scheduled>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            harvest_error!("deadline scheduler could not start its runtime: {}", err);
            return;
        }
    };

    runtime.block_on(async move {
        let mut queue: DelayQueue<DeadlineTask> = DelayQueue::new();
        loop {
            tokio::select! {
                submitted = rx.recv() => match submitted {
                    Some(Scheduled { after, task }) => {
                        queue.insert(task, after);
                    }
                    None => break,
                },
                Some(expired) = queue.next(), if !queue.is_empty() => {
                    let task = expired.into_inner();
                    task();
                }
            }
        }
        harvest_debug!("deadline scheduler stopped with {} pending tasks", queue.len());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_tasks_after_their_delay() {
        let scheduler = DeadlineScheduler::start().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        assert!(scheduler.schedule(Duration::from_millis(20), move || {
            let _ = tx.send("fired");
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok("fired"));
    }

    #[test]
    fn shutdown_discards_pending_tasks() {
        let scheduler = DeadlineScheduler::start().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        scheduler.schedule(Duration::from_millis(200), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.shutdown();
        assert!(!scheduler.is_running());
        assert!(!scheduler.schedule(Duration::ZERO, || {}));

        thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn accepts_submissions_from_many_threads() {
        let scheduler = Arc::new(DeadlineScheduler::start().unwrap());
        let (tx, rx) = std::sync::mpsc::channel();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let scheduler = scheduler.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    scheduler.schedule(Duration::from_millis(5), move || {
                        let _ = tx.send(i);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen: Vec<i32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
