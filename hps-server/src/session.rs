//! Session: the peripheral side request/response state machine
//!
//! ```text
//! Idle --write uri/headers/body--> Collecting --write control--> Proxying
//!   ^                                                              |
//!   +----------- next write starts a new cycle ---- Completed <-----+
//! ```
//!
//! All mutation goes through the `Session` methods, which serialize on one
//! lock. The HTTP fetch runs as a tracked background task and publishes the
//! cycle's status through a single-slot channel, under that same lock,
//! drained by the notification loop of the subscribed central. Only the
//! newest subscription is served.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use hyper::StatusCode;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hps_proto::{ControlCode, ControlError, NotifyStatus, Request, Response};

use crate::proxy::Proxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    Proxying,
    Completed,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("a proxied request is already in progress")]
    Busy,
    #[error("cancelling a request is not supported")]
    CancelUnsupported,
}

#[derive(thiserror::Error, Debug)]
#[error("notification not delivered: {0}")]
pub struct NotifyError(pub String);

/// The transport side of a subscription to the control point
pub trait Notifier: Send {
    /// Push a value to the subscribed central
    fn notify(&mut self, value: Vec<u8>) -> impl Future<Output = Result<(), NotifyError>> + Send;

    /// Resolves once the central unsubscribes or disconnects
    fn stopped(&mut self) -> impl Future<Output = ()> + Send;
}

struct State {
    phase: Phase,
    request: Request,
    response: Option<Response>,
    last_error: Option<SessionError>,
    task: Option<JoinHandle<()>>,
    /// Bumped per dispatch, a fetch only completes the cycle it started
    cycle: u64,
}

impl State {
    fn fail(&mut self, e: SessionError) -> SessionError {
        warn!(error = %e, "control point write rejected");
        self.last_error = Some(e.clone());
        e
    }

    /// A field write after a finished cycle starts the next one
    fn collect(&mut self) {
        if matches!(self.phase, Phase::Idle | Phase::Completed) {
            self.phase = Phase::Collecting;
        }
    }
}

struct Inner {
    state: Mutex<State>,
    proxy: Proxy,
    done_tx: mpsc::Sender<NotifyStatus>,
    done_rx: tokio::sync::Mutex<mpsc::Receiver<NotifyStatus>>,
    subscribers: watch::Sender<u64>,
}

/// Shared handle, cloned into every characteristic handler
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(proxy: Proxy) -> Self {
        let (done_tx, done_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    request: Request::default(),
                    response: None,
                    last_error: None,
                    task: None,
                    cycle: 0,
                }),
                proxy,
                done_tx,
                done_rx: tokio::sync::Mutex::new(done_rx),
                subscribers: watch::Sender::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.state().last_error.clone()
    }

    /// Response of the last completed cycle
    pub fn response(&self) -> Option<Response> {
        self.state().response.clone()
    }

    pub fn write_uri(&self, data: &[u8]) {
        let uri = String::from_utf8_lossy(data).into_owned();
        debug!(%uri, "URI written");
        let mut state = self.state();
        state.request.uri = uri;
        state.collect();
    }

    pub fn write_headers(&self, data: &[u8]) {
        let headers = String::from_utf8_lossy(data).into_owned();
        debug!(%headers, "headers written");
        let mut state = self.state();
        state.request.headers = headers;
        state.collect();
    }

    pub fn write_body(&self, data: &[u8]) {
        debug!(len = data.len(), "body written");
        let mut state = self.state();
        state.request.body = data.to_vec();
        state.collect();
    }

    /// Decode the control byte and dispatch the fetch in the background.
    ///
    /// Returns as soon as the fetch is spawned. Nothing is dispatched when
    /// the byte does not decode or a fetch is still in flight.
    pub fn write_control(&self, data: &[u8]) -> Result<(), SessionError> {
        let code = match data.first() {
            Some(&b) => ControlCode::from_byte(b),
            None => Err(ControlError::Empty),
        };

        let mut state = self.state();
        let (method, scheme) = match code {
            Ok(ControlCode::Request { method, scheme }) => (method, scheme),
            Ok(ControlCode::Cancel) => return Err(state.fail(SessionError::CancelUnsupported)),
            Err(e) => return Err(state.fail(e.into())),
        };
        if state.phase == Phase::Proxying {
            return Err(state.fail(SessionError::Busy));
        }

        state.request.method = method;
        state.request.scheme = scheme;
        state.response = None;
        state.last_error = None;
        self.drain_stale_signal();

        let request = state.request.clone();
        info!(%method, target = %request.target(), "control point written, dispatching");
        let session = self.clone();
        state.cycle += 1;
        let cycle = state.cycle;
        state.phase = Phase::Proxying;
        state.task = Some(tokio::spawn(async move { session.run_fetch(request, cycle).await }));
        Ok(())
    }

    async fn run_fetch(self, request: Request, cycle: u64) {
        let response = self.inner.proxy.execute(&request).await;
        let mut state = self.state();
        if state.cycle != cycle {
            debug!(cycle, "fetch finished after its cycle was aborted");
            return;
        }
        state.task = None;
        self.complete(&mut state, response);
    }

    /// Store the outcome and publish its status, under the state lock so a
    /// new cycle cannot start in between
    fn complete(&self, state: &mut State, response: Response) {
        let status = response.status;
        debug!(ok = response.error.is_none(), status = status.status_code, "cycle completed");
        state.response = Some(response);
        state.phase = Phase::Completed;
        if let Err(e) = self.inner.done_tx.try_send(status) {
            warn!(error = %e, "completion signal dropped");
        }
    }

    /// A signal nobody was subscribed to receive belongs to the old cycle
    fn drain_stale_signal(&self) {
        // Locked means a subscriber is parked on an empty slot.
        if let Ok(mut rx) = self.inner.done_rx.try_lock() {
            while let Ok(status) = rx.try_recv() {
                debug!(status = status.status_code, "discarding undelivered completion signal");
            }
        }
    }

    pub fn read_headers(&self) -> Vec<u8> {
        match &self.state().response {
            Some(response) => response.headers.clone(),
            None => {
                debug!("read headers: <empty> (no response)");
                Vec::new()
            }
        }
    }

    pub fn read_body(&self) -> Vec<u8> {
        match &self.state().response {
            Some(response) => response.body.clone(),
            None => {
                debug!("read body: <empty> (no response)");
                Vec::new()
            }
        }
    }

    /// Notification loop for one subscription to the control point.
    ///
    /// Sends the encoded status once per completed cycle, failed cycles
    /// included, until the subscriber goes away, a newer subscription
    /// replaces it, or a notification cannot be delivered.
    pub async fn serve_notifications<N: Notifier>(&self, mut notifier: N) {
        let mut id = 0;
        self.inner.subscribers.send_modify(|latest| {
            *latest += 1;
            id = *latest;
        });
        let superseded = superseded(self.inner.subscribers.subscribe(), id);
        tokio::pin!(superseded);

        let mut rx = tokio::select! {
            _ = notifier.stopped() => return,
            _ = &mut superseded => return,
            rx = self.inner.done_rx.lock() => rx,
        };
        debug!(subscriber = id, "subscriber waiting for completion");

        loop {
            let status = tokio::select! {
                _ = notifier.stopped() => {
                    debug!(subscriber = id, "subscriber gone");
                    return;
                }
                _ = &mut superseded => {
                    debug!(subscriber = id, "replaced by a newer subscription");
                    return;
                }
                signal = rx.recv() => match signal {
                    Some(status) => status,
                    None => return,
                },
            };

            info!(status = status.status_code, "notifying status");
            if let Err(e) = notifier.notify(status.to_bytes().to_vec()).await {
                warn!(error = %e, "notification failed, ending subscription");
                return;
            }
        }
    }

    /// Abort an in-flight fetch.
    ///
    /// The cycle completes as a 502 and the session accepts the next
    /// control write.
    pub fn abort(&self) {
        let mut state = self.state();
        let Some(task) = state.task.take() else {
            return;
        };
        task.abort();
        state.cycle += 1;
        info!("in-flight request aborted");
        self.complete(
            &mut state,
            Response::failure(StatusCode::BAD_GATEWAY.as_u16(), "request aborted"),
        );
    }
}

/// Resolves once a subscription newer than `id` has started
async fn superseded(mut latest: watch::Receiver<u64>, id: u64) {
    loop {
        if *latest.borrow_and_update() != id {
            return;
        }
        if latest.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
