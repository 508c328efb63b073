/*
    SerialQueue - strict FIFO processing for one traffic direction

    Submissions enter a bounded channel and a single worker task runs them through a
    `Stage` one at a time. The N-th submission finishes before the (N+1)-th starts, so
    output order equals submission order no matter how long each step suspends.

    submit(p1) ─┐
    submit(p2) ─┼─► [ mpsc ] ─► worker ─► stage.process(p1) ─► stage.process(p2) ─► ...
    submit(p3) ─┘

    close() stops intake and waits for everything already queued. abort() drops it.
*/

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::error::{FrameError, FrameResult};

/// Default number of queued items before `submit` waits
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// One ordered processing step
#[async_trait]
pub trait Stage: Send + 'static {
    type Input: Send + 'static;

    async fn process(&mut self, input: Self::Input);
}

pub struct SerialQueue<I> {
    name: &'static str,
    tx: mpsc::Sender<I>,
    worker: JoinHandle<()>,
}

impl<I: Send + 'static> SerialQueue<I> {
    pub fn spawn<S>(name: &'static str, stage: S) -> Self
    where
        S: Stage<Input = I>,
    {
        Self::with_depth(name, stage, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_depth<S>(name: &'static str, mut stage: S, depth: usize) -> Self
    where
        S: Stage<Input = I>,
    {
        let (tx, mut rx) = mpsc::channel::<I>(depth);

        let worker = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                stage.process(item).await;
            }
            trace!(queue = name, "worker drained");
        });

        Self { name, tx, worker }
    }

    /// Enqueue behind everything submitted before. Waits only when the queue is full.
    pub async fn submit(&self, input: I) -> FrameResult<()> {
        self.tx.send(input).await.map_err(|_| FrameError::QueueClosed)
    }

    /// Stop accepting work and wait until every queued item has been processed.
    pub async fn close(self) {
        let Self { name, tx, worker } = self;
        drop(tx);
        if let Err(e) = worker.await {
            debug!(queue = name, error = %e, "worker ended abnormally");
        }
    }

    /// Drop queued work without processing it.
    pub fn abort(self) {
        self.worker.abort();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Recorder {
        seen: Arc<Mutex<Vec<u32>>>,
        jitter: bool,
    }

    #[async_trait]
    impl Stage for Recorder {
        type Input = u32;

        async fn process(&mut self, input: u32) {
            if self.jitter {
                let delay = rand::thread_rng().gen_range(0..5);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.seen.lock().unwrap().push(input);
        }
    }

    #[tokio::test]
    async fn test_order_survives_random_delays() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = SerialQueue::spawn(
            "test",
            Recorder {
                seen: seen.clone(),
                jitter: true,
            },
        );

        for i in 0..50 {
            queue.submit(i).await.unwrap();
        }
        queue.close().await;

        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_close_drains_pending() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = SerialQueue::with_depth(
            "test",
            Recorder {
                seen: seen.clone(),
                jitter: false,
            },
            4,
        );

        queue.submit(1).await.unwrap();
        queue.submit(2).await.unwrap();
        queue.submit(3).await.unwrap();
        queue.close().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    /// Records its input, then never finishes
    struct Stall {
        seen: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Stage for Stall {
        type Input = u32;

        async fn process(&mut self, input: u32) {
            self.seen.lock().unwrap().push(input);
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn test_abort_drops_queued_work() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let queue = SerialQueue::spawn("test", Stall { seen: seen.clone() });

        for i in 0..10 {
            queue.submit(i).await.unwrap();
        }
        while seen.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        queue.abort();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }
}
