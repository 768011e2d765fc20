//! Reconcile module - converges an image store onto a desired state.
//!
//! `reconcile()` normalizes and validates the desired state, then dispatches
//! on its `state` to the present or absent state machine. Archive, tag and
//! push are actions shared by the present path.

pub mod error;
pub mod result;

mod absent;
mod archive;
mod present;
mod push;
mod tag;

use std::sync::Arc;

use tracing::{error, info};

use crate::client::docker::ImageOps;
use crate::desired::{DesiredState, ImageState};
use crate::docker::stream::{ProgressSink, ProgressStream, RawProgressStream};

pub use error::{FailureReport, ReconcileError, ReconcileFailure};
pub use present::Acquisition;
pub use result::ReconciliationResult;

pub const BUILD_STATE_DEPRECATED: &str =
    "The 'build' state has been deprecated, use 'present' instead";

/// Run one reconciliation of `desired` against `store`.
///
/// Daemon progress output is relayed to `sink`. On failure the actions and
/// warnings recorded before the abort travel with the error.
pub async fn reconcile(
    store: &dyn ImageOps,
    sink: Arc<dyn ProgressSink>,
    desired: DesiredState,
) -> Result<ReconciliationResult, ReconcileFailure> {
    let desired = desired.normalized();
    let mut reconciler = Reconciler::new(store, sink, &desired);

    match reconciler.run().await {
        Ok(()) => {
            info!(
                changed = reconciler.result.changed,
                actions = reconciler.result.actions.len(),
                "Reconciliation finished"
            );
            Ok(reconciler.result)
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            Err(ReconcileFailure {
                error: e,
                partial: reconciler.result,
            })
        }
    }
}

/// State for a single run: the store, where progress goes, what is wanted,
/// and what has happened so far.
pub(crate) struct Reconciler<'a> {
    store: &'a dyn ImageOps,
    sink: Arc<dyn ProgressSink>,
    desired: &'a DesiredState,
    result: ReconciliationResult,
}

impl<'a> Reconciler<'a> {
    fn new(store: &'a dyn ImageOps, sink: Arc<dyn ProgressSink>, desired: &'a DesiredState) -> Self {
        Self {
            store,
            sink,
            desired,
            result: ReconciliationResult::new(),
        }
    }

    async fn run(&mut self) -> Result<(), ReconcileError> {
        self.preflight()?;

        if self.desired.state == ImageState::Build {
            self.result.warn(BUILD_STATE_DEPRECATED);
        }

        if self.desired.is_present() {
            self.present().await
        } else {
            self.absent().await
        }
    }

    /// Everything that can be rejected without touching the store.
    fn preflight(&self) -> Result<(), ReconcileError> {
        self.desired
            .validate()
            .map_err(ReconcileError::InvalidDesiredState)?;

        if !self.desired.is_present() {
            return Ok(());
        }
        if let Some(path) = &self.desired.path {
            if !path.is_dir() {
                return Err(ReconcileError::BuildPathMissing { path: path.clone() });
            }
        }
        if let Some(load_path) = &self.desired.load_path {
            if !load_path.is_file() {
                return Err(ReconcileError::LoadPathMissing {
                    name: self.desired.name.clone(),
                    load_path: load_path.clone(),
                });
            }
        }
        Ok(())
    }

    fn progress<'s>(&self, raw: RawProgressStream<'s>) -> ProgressStream<'s> {
        ProgressStream::new(raw, self.sink.clone())
    }

    fn dry_run(&self) -> bool {
        self.desired.dry_run
    }
}
