//! Background persistence worker.
//!
//! The worker owns a [`DocumentStore`] and services raw request messages from
//! one inbound channel, strictly in arrival order. Acquiring the file handle
//! is the only point where a request suspends; once the store is ready each
//! request runs to completion before the next is read.
//!
//! Successful saves produce no response. Loads produce exactly one
//! [`Response::Loaded`]. Any failure produces one [`Response::Error`] and the
//! worker keeps serving. Messages that never parsed as JSON are queued with
//! [`WorkerHandle::post_malformed`] so their errors keep their place in line.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{PersistenceError, Result};
use crate::protocol::{ErrorResponse, Request, Response, message_type};
use crate::storage::StorageBackend;
use crate::store::DocumentStore;

/// Default inbound channel buffering.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One queued inbound message.
#[derive(Debug)]
enum Inbound {
    Message(Value),
    /// Raw input that was not JSON, with the parse error.
    Malformed(String),
}

/// Caller side of a running worker.
///
/// Responses are buffered without bound, so a caller that posts requests
/// without reading responses never blocks the worker.
pub struct WorkerHandle {
    request_tx: mpsc::Sender<Inbound>,
    response_rx: mpsc::UnboundedReceiver<Response>,
    task: JoinHandle<()>,
}

/// Spawn a worker for `store` on the current Tokio runtime.
///
/// The worker stops once every request sender is gone; see
/// [`WorkerHandle::shutdown`].
pub fn spawn_worker<S: StorageBackend>(store: DocumentStore<S>, capacity: usize) -> WorkerHandle {
    let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let span = tracing::info_span!("worker", document = %store.document_path().display());
    let worker = Worker {
        store,
        request_rx,
        response_tx,
    };
    let task = tokio::spawn(worker.run().instrument(span));

    WorkerHandle {
        request_tx,
        response_rx,
        task,
    }
}

impl WorkerHandle {
    /// Queue a raw request message.
    pub async fn post(&self, message: Value) -> Result<()> {
        self.send(Inbound::Message(message)).await
    }

    /// Queue input that could not be parsed as JSON.
    ///
    /// The worker answers it with a `protocol` error once every earlier
    /// request has been handled.
    pub async fn post_malformed(&self, reason: impl Into<String>) -> Result<()> {
        self.send(Inbound::Malformed(reason.into())).await
    }

    async fn send(&self, inbound: Inbound) -> Result<()> {
        self.request_tx
            .send(inbound)
            .await
            .map_err(|_| PersistenceError::WorkerClosed)
    }

    /// Next outbound message, or `None` once the worker has stopped.
    pub async fn recv(&mut self) -> Option<Response> {
        self.response_rx.recv().await
    }

    /// Post a load request and wait for the next response.
    ///
    /// If earlier requests failed, their error responses arrive first.
    pub async fn load(&mut self) -> Result<Response> {
        self.post(Request::load_envelope()).await?;
        self.recv().await.ok_or(PersistenceError::WorkerClosed)
    }

    /// Stop accepting requests, let the worker drain its queue and exit.
    ///
    /// Returns the responses that were never received.
    pub async fn shutdown(self) -> Vec<Response> {
        let Self {
            request_tx,
            mut response_rx,
            task,
        } = self;
        drop(request_tx);

        let mut pending = Vec::new();
        while let Some(response) = response_rx.recv().await {
            pending.push(response);
        }
        if let Err(e) = task.await {
            tracing::warn!("Persistence worker ended abnormally: {e}");
        }
        pending
    }
}

struct Worker<S: StorageBackend> {
    store: DocumentStore<S>,
    request_rx: mpsc::Receiver<Inbound>,
    response_tx: mpsc::UnboundedSender<Response>,
}

impl<S: StorageBackend> Worker<S> {
    async fn run(mut self) {
        tracing::debug!("Persistence worker started");
        while let Some(inbound) = self.request_rx.recv().await {
            let response = match inbound {
                Inbound::Message(message) => self.handle_message(message).await,
                Inbound::Malformed(reason) => Some(self.handle_malformed(reason).await),
            };
            let Some(response) = response else {
                continue;
            };
            if self.response_tx.send(response).is_err() {
                tracing::debug!("Response receiver dropped");
                break;
            }
        }
        tracing::debug!("Persistence worker stopped");
    }

    async fn handle_message(&self, message: Value) -> Option<Response> {
        let request_type = message_type(&message).unwrap_or("unknown").to_string();
        match self.dispatch(message).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(request = %request_type, kind = %error.kind(), "{error}");
                Some(Response::Error(ErrorResponse::from_error(
                    request_type,
                    &error,
                )))
            }
        }
    }

    async fn handle_malformed(&self, reason: String) -> Response {
        // Same as any other message: the store comes up first.
        let error = match self.store.ready().await {
            Ok(()) => PersistenceError::Protocol {
                reason: format!("malformed JSON: {reason}"),
            },
            Err(error) => error,
        };
        tracing::warn!(request = "unknown", kind = %error.kind(), "{error}");
        Response::Error(ErrorResponse::from_error("unknown", &error))
    }

    async fn dispatch(&self, message: Value) -> Result<Option<Response>> {
        // Any message, even a malformed one, brings the store up first.
        self.store.ready().await?;

        match Request::from_message(message)? {
            Request::Save(envelope) => {
                self.store.save(&envelope).await?;
                Ok(None)
            }
            Request::Load => {
                let text = self.store.load().await?;
                Ok(Some(Response::Loaded(text)))
            }
        }
    }
}
