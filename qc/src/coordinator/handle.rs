//! CoordinatorHandle - Client interface for requesting information

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordError, CoordRequest, CoordinatorMetrics, FailureReason, QueryOutcome};
use super::queue::Completion;
use crate::provider::InfoProvider;

/// Handle for submitting requests to a running Coordinator
///
/// Cheap to clone. Every request is a message to the control task, so
/// handles can be used from any task or thread.
pub struct CoordinatorHandle<P: InfoProvider> {
    tx: mpsc::Sender<CoordRequest<P::Info>>,
    name: &'static str,
}

impl<P: InfoProvider> Clone for CoordinatorHandle<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<P: InfoProvider> CoordinatorHandle<P> {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest<P::Info>>, name: &'static str) -> Self {
        debug!(%name, "CoordinatorHandle::new: called");
        Self { tx, name }
    }

    /// Name of the provider behind this coordinator
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue `callback` for the next completed query.
    ///
    /// Starts a query if none is in flight; otherwise the callback joins the
    /// running cycle. The callback runs exactly once on the control task.
    pub async fn request_info<F>(&self, callback: F) -> Result<(), CoordError>
    where
        F: FnOnce(Completion<'_, P::Info>) + Send + 'static,
    {
        debug!(provider = self.name, "CoordinatorHandle::request_info: called");
        self.tx
            .send(CoordRequest::RequestInfo {
                callback: Box::new(callback),
            })
            .await
            .map_err(|_| CoordError::ChannelClosed)
    }

    /// Like [`request_info`](Self::request_info) but never waits for
    /// channel capacity; usable from synchronous code.
    ///
    /// Returns [`CoordError::ChannelFull`] when the request buffer is at
    /// capacity. The coordinator is still running and the call may be retried.
    pub fn try_request_info<F>(&self, callback: F) -> Result<(), CoordError>
    where
        F: FnOnce(Completion<'_, P::Info>) + Send + 'static,
    {
        debug!(provider = self.name, "CoordinatorHandle::try_request_info: called");
        self.tx
            .try_send(CoordRequest::RequestInfo {
                callback: Box::new(callback),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => CoordError::ChannelFull,
                TrySendError::Closed(_) => CoordError::ChannelClosed,
            })
    }

    /// Request the information and wait for a copy of it
    pub async fn get(&self) -> Result<P::Info, CoordError>
    where
        P::Info: Clone,
    {
        debug!(provider = self.name, "CoordinatorHandle::get: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_info(move |done| {
            let _ = reply_tx.send((done.outcome().clone(), done.info().cloned()));
        })
        .await?;

        match reply_rx.await.map_err(|_| CoordError::ReplyDropped)? {
            (QueryOutcome::Succeeded, Some(info)) => Ok(info),
            (QueryOutcome::Succeeded, None) => Err(FailureReason::NotScheduled.into()),
            (QueryOutcome::Failed(reason), _) => Err(reason.into()),
        }
    }

    /// Get current coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics, CoordError> {
        debug!(provider = self.name, "CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| CoordError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CoordError::ReplyDropped)
    }

    /// Ask the coordinator to stop
    pub async fn shutdown(&self) -> Result<(), CoordError> {
        debug!(provider = self.name, "CoordinatorHandle::shutdown: called");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| CoordError::ChannelClosed)
    }

    /// True once the coordinator has stopped accepting requests
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
