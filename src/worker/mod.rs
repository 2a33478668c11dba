//! Request interception: classification, per-class fetch strategies, and
//! the install/activate lifecycle that decides when interception starts.

mod classify;
mod event;
mod lifecycle;
mod manifest;
mod strategy;

pub use classify::{Classifier, ResourceClass};
pub use event::{WorkerEvent, WorkerHost};
pub use lifecycle::{ActivateReport, ServiceWorker, WorkerState};
pub use manifest::ShellManifest;
pub use strategy::{FetchOutcome, StrategyExecutor};
