//! # Thread pool
//!
//! Module dedicated to thread pool management. The [`ThreadPool`] is
//! the main structure of this module: it basically spawns n threads
//! and transfers tasks to them using an unbounded channel. The
//! receiver part is shared accross all threads in a mutex, this way
//! only one thread can wait for a task at a time. When a thread
//! receives a task, it releases the lock and an other thread can wait
//! for the next task. Tasks are received in submission order.
//!
//! A task is a function that takes the pool context (typically a
//! store session) and returns a future. The easiest way to build a
//! pool is to use the [`ThreadPoolBuilder`]. Once every task has been
//! submitted, [`ThreadPool::drain`] waits for all of them to finish,
//! within a bounded amount of time.

mod error;

use std::{num::NonZeroUsize, pin::Pin, sync::Arc, thread::available_parallelism, time::Duration};

use futures::{future::join_all, lock::Mutex, Future};
use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::{debug, trace};

#[doc(inline)]
pub use self::error::{Error, Result};

/// The thread pool task.
pub type ThreadPoolTask<C> =
    Box<dyn FnOnce(Arc<C>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// The thread pool.
pub struct ThreadPool<C> {
    /// The sender part of the task channel.
    sender: mpsc::UnboundedSender<ThreadPoolTask<C>>,

    /// The list of threads spawned by the pool.
    threads: Vec<JoinHandle<()>>,
}

impl<C> ThreadPool<C>
where
    C: Send + Sync + 'static,
{
    /// Submit the given task to the pool.
    ///
    /// The task is sent to the pool channel and will be executed by
    /// the first available thread. This function does not wait for
    /// its resolution.
    pub fn execute<F>(&self, task: impl FnOnce(Arc<C>) -> F + Send + 'static)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task: ThreadPoolTask<C> = Box::new(move |ctx| Box::pin(task(ctx)));

        if self.sender.send(task).is_err() {
            debug!("cannot send task: no thread left in the pool");
        }
    }

    /// The number of threads of the pool.
    pub fn size(&self) -> usize {
        self.threads.len()
    }

    /// Close the channel then wait for every submitted task to finish.
    ///
    /// Threads still running after the given timeout are aborted, and
    /// the pool is considered interrupted.
    pub async fn drain(self, timeout: Duration) -> Result<()> {
        let Self {
            sender,
            mut threads,
        } = self;

        drop(sender);

        let size = threads.len();
        debug!(size, ?timeout, "draining pool");

        let joined = time::timeout(timeout, join_all(threads.iter_mut())).await;

        match joined {
            Ok(results) => {
                for (id, res) in results.into_iter().enumerate() {
                    res.map_err(|err| Error::JoinThreadError(err, id + 1, size))?;
                }

                debug!(size, "pool drained");
                Ok(())
            }
            Err(_) => {
                debug!(size, ?timeout, "pool interrupted, aborting threads");

                for thread in &threads {
                    thread.abort()
                }

                Err(Error::DrainTimeoutError(timeout))
            }
        }
    }
}

/// The thread pool builder.
///
/// Builder that help you to create a [`ThreadPool`].
#[derive(Clone)]
pub struct ThreadPoolBuilder<C> {
    /// The context shared by all threads.
    ctx: Arc<C>,

    /// The size of the pool.
    ///
    /// Represents the number of threads that will be spawn in
    /// parallel. Defaults to the number of available CPUs.
    size: usize,
}

impl<C> ThreadPoolBuilder<C>
where
    C: Send + Sync + 'static,
{
    /// Create a new thread pool builder with a context.
    pub fn new(ctx: Arc<C>) -> Self {
        Self {
            ctx,
            size: available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }

    /// Change the thread pool size.
    pub fn set_some_size(&mut self, size: Option<usize>) {
        if let Some(size) = size {
            self.size = size.max(1);
        }
    }

    /// Change the thread pool size.
    pub fn set_size(&mut self, size: usize) {
        self.set_some_size(Some(size));
    }

    /// Change the thread pool size using the builder pattern.
    pub fn with_some_size(mut self, size: Option<usize>) -> Self {
        self.set_some_size(size);
        self
    }

    /// Change the thread pool size using the builder pattern.
    pub fn with_size(mut self, size: usize) -> Self {
        self.set_size(size);
        self
    }

    /// Build the final thread pool.
    ///
    /// Threads are spawned on the current tokio runtime.
    pub fn build(self) -> ThreadPool<C> {
        debug!(size = self.size, "creating pool");

        let (sender, receiver) = mpsc::unbounded_channel::<ThreadPoolTask<C>>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut threads = Vec::with_capacity(self.size);

        for id in 1..=self.size {
            let ctx = self.ctx.clone();
            let receiver = receiver.clone();

            threads.push(tokio::spawn(async move {
                loop {
                    trace!(id, "thread looking for a task");

                    let task = receiver.lock().await.recv().await;

                    match task {
                        None => break,
                        Some(task) => {
                            trace!(id, "thread executing task");
                            task(ctx.clone()).await;
                        }
                    }
                }

                trace!(id, "no task left, thread stopped");
            }));
        }

        ThreadPool { sender, threads }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use super::{Error, ThreadPoolBuilder};

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn drain_waits_for_all_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPoolBuilder::new(counter.clone()).with_size(3).build();

        for _ in 0..20 {
            pool.execute(|counter| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.drain(Duration::from_secs(10)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn single_thread_runs_tasks_in_submission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPoolBuilder::new(order.clone()).with_size(1).build();

        for i in 0..5 {
            pool.execute(move |order| async move {
                order.lock().unwrap().push(i);
            });
        }

        pool.drain(Duration::from_secs(10)).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn drain_times_out_on_hung_task() {
        let pool = ThreadPoolBuilder::new(Arc::new(())).with_size(2).build();

        pool.execute(|_| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let err = pool.drain(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::DrainTimeoutError(_)));
    }
}
