//! Serialized execution contexts.
//!
//! All connection state lives inside one executor and is only touched by the
//! jobs it runs, one at a time. Callers on any thread submit jobs; nothing
//! inside the state needs a lock.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error};

/// A unit of work run against the executor's state.
pub type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

type Tick<S> = Box<dyn FnMut(&mut S) + Send + 'static>;

/// Runs jobs against a state value, one at a time, in submission order.
pub trait Executor<S>: Send + Sync {
    /// Submit a job. Never blocks on the job itself.
    fn execute(&self, job: Job<S>);
}

/// A dedicated thread that owns the state and runs submitted jobs in order.
///
/// An optional tick runs between jobs at a fixed interval; the connection
/// manager uses it to poll non-blocking sockets for readiness.
pub struct SerialQueue<S> {
    tx: Option<mpsc::Sender<Job<S>>>,
    thread: Option<JoinHandle<()>>,
    name: String,
}

impl<S: Send + 'static> SerialQueue<S> {
    /// Spawn a queue that only runs submitted jobs.
    pub fn spawn(name: impl Into<String>, state: S) -> std::io::Result<Self> {
        Self::start(name.into(), state, None)
    }

    /// Spawn a queue that also runs `tick` every `interval`.
    pub fn spawn_with_tick(
        name: impl Into<String>,
        state: S,
        interval: Duration,
        tick: impl FnMut(&mut S) + Send + 'static,
    ) -> std::io::Result<Self> {
        Self::start(name.into(), state, Some((interval, Box::new(tick))))
    }

    fn start(name: String, state: S, tick: Option<(Duration, Tick<S>)>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job<S>>();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_queue(rx, state, tick))?;
        debug!(queue = %name, "serial queue started");
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
            name,
        })
    }

    /// Thread name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn run_queue<S>(rx: mpsc::Receiver<Job<S>>, mut state: S, tick: Option<(Duration, Tick<S>)>) {
    let Some((interval, mut tick)) = tick else {
        while let Ok(job) = rx.recv() {
            job(&mut state);
        }
        return;
    };

    let mut next_tick = Instant::now() + interval;
    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(job) => job(&mut state),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        if Instant::now() >= next_tick {
            tick(&mut state);
            next_tick = Instant::now() + interval;
        }
    }
}

impl<S: Send + 'static> Executor<S> for SerialQueue<S> {
    fn execute(&self, job: Job<S>) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(job).is_err() {
            error!(queue = %self.name, "serial queue has stopped; job dropped");
        }
    }
}

impl<S> Drop for SerialQueue<S> {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            // The last handle can be released by a job running on the queue itself.
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                error!(queue = %self.name, "serial queue thread panicked");
            }
        }
    }
}

/// Runs jobs on the submitting thread.
///
/// Jobs submitted while another job is running (from inside that job or from
/// another thread) are queued and run, in order, before the running call
/// returns. Meant for tests and single-threaded embedding.
pub struct InlineExecutor<S> {
    state: Mutex<S>,
    queue: Mutex<VecDeque<Job<S>>>,
}

impl<S> InlineExecutor<S> {
    /// Create an executor owning `state`.
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Job<S>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_pending(&self) {
        loop {
            let mut state = match self.state.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            loop {
                let next = self.queue().pop_front();
                match next {
                    Some(job) => job(&mut state),
                    None => break,
                }
            }
            drop(state);
            if self.queue().is_empty() {
                return;
            }
        }
    }
}

impl<S: Send> Executor<S> for InlineExecutor<S> {
    fn execute(&self, job: Job<S>) {
        self.queue().push_back(job);
        self.run_pending();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc};

    use super::*;

    #[test]
    fn serial_queue_runs_jobs_in_order() {
        let queue = SerialQueue::spawn("test-serial", Vec::<u32>::new()).unwrap();
        for i in 0..50 {
            queue.execute(Box::new(move |log: &mut Vec<u32>| log.push(i)));
        }

        let (tx, rx) = mpsc::channel();
        queue.execute(Box::new(move |log: &mut Vec<u32>| {
            tx.send(log.clone()).unwrap();
        }));

        let seen = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
        assert_eq!(queue.name(), "test-serial");
    }

    #[test]
    fn serial_queue_ticks_while_idle() {
        let (tx, rx) = mpsc::channel();
        let _queue =
            SerialQueue::spawn_with_tick("test-tick", 0u32, Duration::from_millis(5), move |n| {
                *n += 1;
                let _ = tx.send(*n);
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    }

    #[test]
    fn serial_queue_drop_releases_state() {
        struct Flag(mpsc::Sender<()>);
        impl Drop for Flag {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let (tx, rx) = mpsc::channel();
        let queue = SerialQueue::spawn("test-drop", Flag(tx)).unwrap();
        drop(queue);
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn inline_runs_immediately() {
        let exec = InlineExecutor::new(0u32);
        exec.execute(Box::new(|n: &mut u32| *n += 5));

        let (tx, rx) = mpsc::channel();
        exec.execute(Box::new(move |n: &mut u32| tx.send(*n).unwrap()));
        assert_eq!(rx.try_recv().unwrap(), 5);
    }

    #[test]
    fn inline_reentrant_jobs_run_after_current() {
        let exec: Arc<InlineExecutor<Vec<&'static str>>> = Arc::new(InlineExecutor::new(Vec::new()));
        let inner = Arc::clone(&exec);

        exec.execute(Box::new(move |log: &mut Vec<&'static str>| {
            log.push("outer-start");
            inner.execute(Box::new(|log: &mut Vec<&'static str>| log.push("nested")));
            log.push("outer-end");
        }));

        let (tx, rx) = mpsc::channel();
        exec.execute(Box::new(move |log: &mut Vec<&'static str>| {
            tx.send(log.clone()).unwrap();
        }));
        assert_eq!(rx.try_recv().unwrap(), vec!["outer-start", "outer-end", "nested"]);
    }
}
