use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Dataplane, DataplaneError, FibOp, FibRequest, InstallError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FibConfig {
    pub queue_depth: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FibConfig {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
        }
    }
}

impl FibConfig {
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            queue_depth: 16,
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }
}

/// Sending side of the FIB queue. Every request waits for its own
/// acknowledgement.
#[derive(Debug, Clone)]
pub struct FibHandle {
    tx: mpsc::Sender<FibRequest>,
}

impl FibHandle {
    pub async fn request(&self, op: FibOp) -> Result<(), InstallError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(FibRequest { op, ack })
            .await
            .map_err(|_| InstallError::WorkerGone)?;
        rx.await.map_err(|_| InstallError::WorkerGone)?
    }
}

pub struct FibWorker {
    rx: mpsc::Receiver<FibRequest>,
    dataplane: Arc<dyn Dataplane>,
    config: FibConfig,
}

impl FibWorker {
    pub fn new(dataplane: Arc<dyn Dataplane>, config: FibConfig) -> (FibWorker, FibHandle) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let worker = FibWorker {
            rx,
            dataplane,
            config,
        };
        (worker, FibHandle { tx })
    }

    /// Runs until every `FibHandle` is dropped.
    pub async fn event_loop(mut self) {
        while let Some(req) = self.rx.recv().await {
            let result = self.apply(&req.op).await;
            let _ = req.ack.send(result);
        }
        info!("FIB worker stopped");
    }

    async fn apply(&self, op: &FibOp) -> Result<(), InstallError> {
        let max_attempts = self.config.max_attempts.max(1);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.dispatch(op).await {
                Ok(()) => {
                    debug!("FIB {} done", op);
                    return Ok(());
                }
                Err(err) if attempt >= max_attempts => {
                    warn!("FIB {} failed after {} attempts: {}", op, attempt, err);
                    return Err(InstallError::DataplaneRejected {
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    debug!("FIB {} attempt {} failed: {}", op, attempt, err);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }

    async fn dispatch(&self, op: &FibOp) -> Result<(), DataplaneError> {
        let result = match op {
            FibOp::SidAdd(sid) => self.dataplane.sid_add(sid).await,
            FibOp::SidDel(sid) => self.dataplane.sid_del(sid).await,
            FibOp::RouteAdd(route) => self.dataplane.route_add(route).await,
            FibOp::RouteDel(route) => self.dataplane.route_del(route).await,
        };
        match (op, result) {
            // Deleting an absent entry leaves the table as requested.
            (FibOp::SidDel(_) | FibOp::RouteDel(_), Err(DataplaneError::NotFound)) => Ok(()),
            (_, result) => result,
        }
    }
}

pub fn serve(worker: FibWorker) -> JoinHandle<()> {
    tokio::spawn(worker.event_loop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fib::{FibSid, MemoryDataplane};
    use crate::srv6::Behavior;

    fn sid_add() -> FibOp {
        FibOp::SidAdd(FibSid {
            address: "2001:db8:1:1::".parse().unwrap(),
            prefix_len: 80,
            behavior: Behavior::End,
            table: None,
        })
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let dataplane = Arc::new(MemoryDataplane::new());
        let (worker, fib) = FibWorker::new(dataplane.clone(), FibConfig::for_test());
        let handle = serve(worker);

        dataplane.reject_next(2);
        assert_eq!(fib.request(sid_add()).await, Ok(()));
        assert_eq!(dataplane.calls(), 3);
        assert_eq!(dataplane.sid_count(), 1);

        drop(fib);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let dataplane = Arc::new(MemoryDataplane::new());
        let (worker, fib) = FibWorker::new(dataplane.clone(), FibConfig::for_test());
        serve(worker);

        dataplane.reject_always(true);
        assert_eq!(
            fib.request(sid_add()).await,
            Err(InstallError::DataplaneRejected {
                attempts: 3,
                reason: "rejected: injected".to_string(),
            })
        );
        assert_eq!(dataplane.sid_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let dataplane = Arc::new(MemoryDataplane::new());
        let (worker, fib) = FibWorker::new(dataplane.clone(), FibConfig::for_test());
        serve(worker);

        let FibOp::SidAdd(sid) = sid_add() else {
            unreachable!()
        };
        assert_eq!(fib.request(FibOp::SidDel(sid)).await, Ok(()));
        assert_eq!(dataplane.calls(), 1);
    }

    #[tokio::test]
    async fn test_worker_gone() {
        let dataplane = Arc::new(MemoryDataplane::new());
        let (worker, fib) = FibWorker::new(dataplane, FibConfig::for_test());
        drop(worker);
        assert_eq!(fib.request(sid_add()).await, Err(InstallError::WorkerGone));
    }
}
