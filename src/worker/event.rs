use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::lifecycle::{ActivateReport, ServiceWorker};
use super::strategy::FetchOutcome;
use crate::cache::PopulateReport;
use crate::error::{OfflineError, Result};
use crate::http::Request;

/// Lifecycle and fetch events delivered by the host runtime
#[derive(Debug)]
pub enum WorkerEvent {
  Install {
    reply: oneshot::Sender<Result<PopulateReport>>,
  },
  Activate {
    reply: oneshot::Sender<Result<ActivateReport>>,
  },
  Fetch {
    request: Request,
    reply: oneshot::Sender<FetchOutcome>,
  },
}

/// Sending side of the worker's event loop.
///
/// Install and activate are handled to completion before the loop reads the
/// next event. Each fetch runs as its own task and answers through its
/// reply channel whenever its network and cache work settles.
#[derive(Clone)]
pub struct WorkerHost {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHost {
  pub fn spawn(worker: Arc<ServiceWorker>) -> (Self, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        match event {
          WorkerEvent::Install { reply } => {
            let result = worker.install().await;
            let _ = reply.send(result);
          }
          WorkerEvent::Activate { reply } => {
            let result = worker.activate().await;
            let _ = reply.send(result);
          }
          WorkerEvent::Fetch { request, reply } => {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move {
              let outcome = worker.fetch(request).await;
              if reply.send(outcome).is_err() {
                debug!("fetch caller went away before the response was ready");
              }
            });
          }
        }
      }
      debug!("worker event loop stopped");
    });

    (Self { tx }, handle)
  }

  fn send(&self, event: WorkerEvent) -> Result<()> {
    self.tx.send(event).map_err(|_| {
      warn!("event sent to a stopped worker host");
      OfflineError::HostStopped
    })
  }

  pub async fn install(&self) -> Result<PopulateReport> {
    let (reply, rx) = oneshot::channel();
    self.send(WorkerEvent::Install { reply })?;
    rx.await.map_err(|_| OfflineError::HostStopped)?
  }

  pub async fn activate(&self) -> Result<ActivateReport> {
    let (reply, rx) = oneshot::channel();
    self.send(WorkerEvent::Activate { reply })?;
    rx.await.map_err(|_| OfflineError::HostStopped)?
  }

  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
    let (reply, rx) = oneshot::channel();
    self.send(WorkerEvent::Fetch { request, reply })?;
    rx.await.map_err(|_| OfflineError::HostStopped)
  }
}
