// Copyright 2026 - developers of the `ferrogram` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The session coordinator: serializes all transport use behind one lock,
//! matches requests to their responses, and runs the keep-alive loop that
//! pings the server and pulls updates while no foreground call needs the
//! connection.
use crate::dispatch::{Dispatcher, Update, UpdateCatalog};
use crate::errors::{InvocationError, ReadError};
use crate::request::{Call, Request};
use crate::transport::{CancelToken, Transport};
use ferrogram_mtproto::{MsgId, Session, decrypt_message, encrypt_message};
use ferrogram_tl::{Cursor, RemoteCall, Serializable, functions};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use std::{io, mem, thread};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

/// How long `receive` waits for a single envelope unless told otherwise.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Every how often are pings sent?
const PING_DELAY: Duration = Duration::from_secs(60);

/// How long the keep-alive loop waits for updates before probing whether
/// the connection is still alive.
const UPDATES_TIMEOUT: Duration = Duration::from_secs(60);

/// Generate a "random" ping ID.
pub(crate) fn generate_random_id() -> i64 {
    static LAST_ID: AtomicI64 = AtomicI64::new(0);

    while LAST_ID.load(Ordering::SeqCst) == 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time is before epoch")
            .as_nanos() as i64;

        if LAST_ID
            .compare_exchange(0, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            thread::yield_now();
        }
    }

    LAST_ID.fetch_add(1, Ordering::SeqCst)
}

/// Identifies a registered update handler so it can be removed later.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpdateHandlerId(usize);

type UpdateHandler = Box<dyn Fn(&Update) + Send + Sync>;

/// Everything that must only ever be touched by the task currently holding
/// the transport.
struct Inner {
    transport: Box<dyn Transport>,
    session: Session,
    pending_acks: Vec<i64>,
}

/// Manages sending requests and matching them to their responses over one
/// transport connection.
///
/// All transport use is serialized behind a single async lock. A foreground
/// caller performs `send` followed by `receive` on the same request; the
/// keep-alive loop (see [`Sender::spawn_keepalive`]) borrows the transport
/// in between, yielding it back through a cancellable receive whenever a
/// foreground `send` comes in.
pub struct Sender {
    inner: Mutex<Inner>,

    /// Set while a foreground caller is sending or waiting for its reply;
    /// tells the keep-alive loop to keep its hands off the transport.
    waiting_receive: AtomicBool,

    /// Set while the keep-alive loop is blocked on a receive; tells a
    /// foreground `send` that it must cancel that receive first.
    updates_receiving: AtomicBool,

    /// Seconds the keep-alive loop must sleep before its next attempt, as
    /// mandated by a flood wait. Zero when no pause is pending.
    updates_sleep: AtomicU64,

    /// While set, an ack listing the in-flight request confirms it (logout
    /// is acknowledged this way rather than with an rpc_result).
    logging_out: AtomicBool,

    running: AtomicBool,
    handlers: StdMutex<Vec<(UpdateHandlerId, UpdateHandler)>>,
    next_handler_id: AtomicUsize,
    loop_handle: StdMutex<Option<JoinHandle<()>>>,
    last_ping: StdMutex<Instant>,
    ping_interval: Duration,
    cancel: CancelToken,
    catalog: Box<dyn UpdateCatalog>,
}

impl Sender {
    /// Creates a new sender over the given transport and session.
    ///
    /// The transport is not connected yet; use [`Sender::connect`].
    pub fn new(
        transport: impl Transport + 'static,
        session: Session,
        catalog: impl UpdateCatalog + 'static,
    ) -> Arc<Self> {
        let cancel = transport.cancel_token();
        Arc::new(Self {
            inner: Mutex::new(Inner {
                transport: Box::new(transport),
                session,
                pending_acks: Vec::new(),
            }),
            waiting_receive: AtomicBool::new(false),
            updates_receiving: AtomicBool::new(false),
            updates_sleep: AtomicU64::new(0),
            logging_out: AtomicBool::new(false),
            running: AtomicBool::new(false),
            handlers: StdMutex::new(Vec::new()),
            next_handler_id: AtomicUsize::new(0),
            loop_handle: StdMutex::new(None),
            last_ping: StdMutex::new(Instant::now()),
            ping_interval: PING_DELAY,
            cancel,
            catalog: Box::new(catalog),
        })
    }

    /// Connects the underlying transport.
    pub async fn connect(&self) -> io::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.transport.connect().await
    }

    /// Stops the keep-alive loop, if any, and closes the transport.
    pub async fn disconnect(&self) {
        self.running.store(false, Ordering::SeqCst);
        if self.updates_receiving.load(Ordering::SeqCst) {
            self.cancel.cancel();
        }

        let handle = self.loop_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.inner.lock().await.transport.close();
    }

    /// Drops the current connection and opens a fresh one, resetting the
    /// transport-level state. The session (and therefore message ids and
    /// sequence numbers) carries over.
    pub async fn reconnect(&self) -> io::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.transport.close();
        inner.transport.connect().await
    }

    /// While set, an ack listing the in-flight request confirms it.
    /// Higher layers set this right before invoking `auth.logOut`, the one
    /// request the server acknowledges this way.
    pub fn set_logging_out(&self, logging_out: bool) {
        self.logging_out.store(logging_out, Ordering::SeqCst);
    }

    /// The server-mandated pause the keep-alive loop still has to honor,
    /// if any.
    pub fn pending_flood_sleep(&self) -> Option<u32> {
        match self.updates_sleep.load(Ordering::SeqCst) {
            0 => None,
            seconds => Some(seconds as u32),
        }
    }

    /// Registers an update handler, fired once per update the keep-alive
    /// loop receives. Returns an identifier for
    /// [`Sender::remove_update_handler`].
    pub fn add_update_handler(
        &self,
        handler: impl Fn(&Update) + Send + Sync + 'static,
    ) -> UpdateHandlerId {
        let id = UpdateHandlerId(self.next_handler_id.fetch_add(1, Ordering::SeqCst));
        self.handlers.lock().unwrap().push((id, Box::new(handler)));
        id
    }

    /// Unregisters a previously added handler. Returns whether it was
    /// still registered.
    pub fn remove_update_handler(&self, id: UpdateHandlerId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    fn has_handlers(&self) -> bool {
        !self.handlers.lock().unwrap().is_empty()
    }

    fn fan_out(&self, update: &Update) {
        for (_, handler) in self.handlers.lock().unwrap().iter() {
            handler(update);
        }
    }

    /// Serializes and invokes the given request, waiting for its response
    /// with the default timeout.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError>
    where
        R::Return: Send,
    {
        let mut call = Call::new(request);
        self.send(&mut call).await?;
        self.receive(&mut call, DEFAULT_RECEIVE_TIMEOUT).await?;
        call.into_result().ok_or(InvocationError::Dropped)
    }

    /// Sends a keep-alive ping and waits for its pong.
    pub async fn ping(&self) -> Result<(), InvocationError> {
        let mut inner = self.inner.lock().await;
        self.ping_locked(&mut inner).await
    }

    /// Sends the request, transmitting any pending acknowledgements first.
    ///
    /// A fresh message identifier is recorded on the request; reading the
    /// reply is a separate [`Sender::receive`] call. If the keep-alive loop
    /// currently owns the transport, its receive is cancelled first.
    pub async fn send(&self, request: &mut dyn Request) -> Result<(), InvocationError> {
        // Only cancel the receive if it was the keep-alive loop who was
        // receiving; pending foreground requests are left alone.
        if self.updates_receiving.load(Ordering::SeqCst) {
            info!("cancelling updates receive from send()");
            self.cancel.cancel();
        }

        let mut inner = self.inner.lock().await;
        debug!("send() acquired the lock");
        self.send_locked(&mut inner, request).await
    }

    /// Receives until the given request is confirmed. Updates read along
    /// the way are discarded.
    pub async fn receive(
        &self,
        request: &mut dyn Request,
        timeout: Duration,
    ) -> Result<(), InvocationError> {
        let mut inner = self.inner.lock().await;
        debug!("receive() acquired the lock");
        self.receive_locked(&mut inner, Some(request), timeout, None)
            .await
    }

    /// Receives until the given request is confirmed, pushing any updates
    /// read along the way into `updates`.
    pub async fn receive_with_updates(
        &self,
        request: &mut dyn Request,
        timeout: Duration,
        updates: &mut Vec<Update>,
    ) -> Result<(), InvocationError> {
        let mut inner = self.inner.lock().await;
        self.receive_locked(&mut inner, Some(request), timeout, Some(updates))
            .await
    }

    /// Receives until at least one update has been read into `updates`.
    pub async fn receive_updates(
        &self,
        timeout: Duration,
        updates: &mut Vec<Update>,
    ) -> Result<(), InvocationError> {
        let mut inner = self.inner.lock().await;
        self.receive_locked(&mut inner, None, timeout, Some(updates))
            .await
    }

    /// Receives a single update object and returns it.
    pub async fn receive_update(&self, timeout: Duration) -> Result<Update, InvocationError> {
        let mut updates = Vec::new();
        self.receive_updates(timeout, &mut updates).await?;
        Ok(updates.remove(0))
    }

    async fn send_locked(
        &self,
        inner: &mut Inner,
        request: &mut dyn Request,
    ) -> Result<(), InvocationError> {
        // Pause the keep-alive loop until our reply has been read.
        self.waiting_receive.store(true, Ordering::SeqCst);

        // If any message needs confirmation, send an ack first.
        if !inner.pending_acks.is_empty() {
            let ack = ferrogram_tl::types::MsgsAck {
                msg_ids: mem::take(&mut inner.pending_acks),
            };
            debug!("acknowledging {} message(s)", ack.msg_ids.len());
            Self::transmit(inner, &ack.to_bytes(), false).await?;
        }

        let body = request.body();
        let msg_id = Self::transmit(inner, &body, request.content_related()).await?;
        request.assign_msg_id(msg_id);
        debug!("sent request with {msg_id:?}");

        inner.session.save()?;
        Ok(())
    }

    async fn transmit(
        inner: &mut Inner,
        body: &[u8],
        content_related: bool,
    ) -> Result<MsgId, InvocationError> {
        let (envelope, msg_id) = encrypt_message(&mut inner.session, body, content_related);
        inner.transport.send(&envelope).await?;
        Ok(msg_id)
    }

    /// The receive loop. Decrypts and dispatches inbound envelopes until
    /// either the request is confirmed or (with no request) an update has
    /// been produced.
    ///
    /// A `bad_server_salt` dispatch updates the session's salt and flags a
    /// retransmission, which is performed here while still holding the
    /// lock; the loop then keeps going and picks up the re-sent request's
    /// reply.
    async fn receive_locked(
        &self,
        inner: &mut Inner,
        mut request: Option<&mut dyn Request>,
        timeout: Duration,
        mut updates: Option<&mut Vec<Update>>,
    ) -> Result<(), InvocationError> {
        debug_assert!(request.is_some() || updates.is_some());

        let result = loop {
            trace!("waiting for an envelope");
            let (_, envelope) = match inner.transport.receive(timeout).await {
                Ok(received) => received,
                Err(e) => break Err(InvocationError::Read(e)),
            };

            let message = match decrypt_message(&inner.session, &envelope) {
                Ok(message) => message,
                Err(e) => break Err(InvocationError::Read(ReadError::Deserialize(e))),
            };

            let (outcome, resend) = {
                let mut dispatcher = Dispatcher {
                    session: &mut inner.session,
                    acks: &mut inner.pending_acks,
                    request: request.as_deref_mut(),
                    updates: updates.as_deref_mut(),
                    catalog: self.catalog.as_ref(),
                    logging_out: self.logging_out.load(Ordering::SeqCst),
                    resend: false,
                };
                let mut reader = Cursor::from_slice(&message.body);
                let outcome = dispatcher.dispatch(message.msg_id, message.sequence, &mut reader);
                (outcome, dispatcher.resend)
            };
            if let Err(e) = outcome {
                break Err(e);
            }

            if resend {
                if let Some(request) = request.as_deref_mut() {
                    debug!("retransmitting the in-flight request");
                    if let Err(e) = self.send_locked(inner, request).await {
                        break Err(e);
                    }
                }
            }

            match request.as_deref() {
                None => {
                    if updates.as_deref().map(|u| !u.is_empty()).unwrap_or(false) {
                        break Ok(());
                    }
                }
                Some(request) => {
                    if request.confirm_received() {
                        debug!("request confirmed");
                        break Ok(());
                    }
                }
            }
        };

        // Let the keep-alive loop observe a mandated pause even when the
        // flood wait surfaced on a foreground call.
        if let Err(InvocationError::FloodWait { seconds }) = &result {
            self.updates_sleep.store(*seconds as u64, Ordering::SeqCst);
        }

        // Resume the keep-alive loop.
        self.waiting_receive.store(false, Ordering::SeqCst);
        result
    }

    async fn ping_locked(&self, inner: &mut Inner) -> Result<(), InvocationError> {
        let mut call = Call::new(&functions::Ping {
            ping_id: generate_random_id(),
        });
        self.send_locked(inner, &mut call).await?;
        self.receive_locked(inner, Some(&mut call), DEFAULT_RECEIVE_TIMEOUT, None)
            .await
    }

    /// Starts the keep-alive task, so the connection is kept active (and
    /// updates keep flowing) for a longer time without the server
    /// disconnecting us. No-op if the task is already running.
    pub fn spawn_keepalive(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let sender = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            sender.keepalive_loop().await;
        });
        *self.loop_handle.lock().unwrap() = Some(handle);
    }

    async fn keepalive_loop(&self) {
        info!("keep-alive loop started");
        while self.running.load(Ordering::SeqCst) {
            // Always sleep a bit before each iteration to relax the CPU;
            // several arms below reach the next iteration early.
            let sleep_secs = self.updates_sleep.swap(0, Ordering::SeqCst);
            if sleep_secs > 0 {
                info!("sleeping {sleep_secs} second(s) as mandated by the server");
                time::sleep(Duration::from_secs(sleep_secs)).await;
            } else if self.has_handlers() {
                time::sleep(Duration::from_millis(100)).await;
            } else {
                time::sleep(Duration::from_secs(1)).await;
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            // Only try to receive if no foreground caller needs the
            // transport.
            if self.waiting_receive.load(Ordering::SeqCst) {
                continue;
            }

            let mut inner = self.inner.lock().await;

            let ping_due = {
                let mut last_ping = self.last_ping.lock().unwrap();
                let now = Instant::now();
                if now >= *last_ping + self.ping_interval {
                    *last_ping = now;
                    true
                } else {
                    false
                }
            };

            match self.keepalive_step(&mut inner, ping_due).await {
                Ok(updates) => {
                    drop(inner);
                    for update in &updates {
                        self.fan_out(update);
                    }
                }
                Err(InvocationError::Read(ReadError::Timeout)) => {
                    debug!("receiving updates timed out");
                    if let Err(e) = self.check_alive(&mut inner).await {
                        error!("keep-alive loop is exiting: {e}");
                        self.running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
                Err(InvocationError::Read(ReadError::Cancelled)) => {
                    // A foreground send reclaimed the transport; normal.
                    info!("receiving updates cancelled");
                }
                Err(InvocationError::Read(ReadError::Io(e))) => {
                    if self.logging_out.load(Ordering::SeqCst) {
                        info!("connection closed while logging out");
                    } else {
                        error!("i/o failure in the keep-alive loop: {e}");
                    }
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
                Err(e) => warn!("keep-alive loop error: {e}"),
            }
        }
        info!("keep-alive loop stopped");
    }

    async fn keepalive_step(
        &self,
        inner: &mut Inner,
        ping_due: bool,
    ) -> Result<Vec<Update>, InvocationError> {
        if ping_due {
            self.ping_locked(inner).await?;
            debug!("ping sent from the keep-alive loop");
        }

        if !self.has_handlers() {
            return Ok(Vec::new());
        }

        self.updates_receiving.store(true, Ordering::SeqCst);
        let mut updates = Vec::new();
        let result = self
            .receive_locked(inner, None, UPDATES_TIMEOUT, Some(&mut updates))
            .await;
        self.updates_receiving.store(false, Ordering::SeqCst);

        result.map(|()| updates)
    }

    /// The liveness probe run when receiving updates times out: ask for the
    /// update state; if even that times out, reconnect and retry once.
    async fn check_alive(&self, inner: &mut Inner) -> Result<(), InvocationError> {
        debug!("sending a liveness probe");
        let mut call = Call::new(&functions::GetState {});
        self.send_locked(inner, &mut call).await?;
        match self
            .receive_locked(inner, Some(&mut call), DEFAULT_RECEIVE_TIMEOUT, None)
            .await
        {
            Err(InvocationError::Read(ReadError::Timeout)) => {
                warn!("timed out inside a timeout, trying to reconnect");
                inner.transport.close();
                inner.transport.connect().await?;

                let mut call = Call::new(&functions::GetState {});
                self.send_locked(inner, &mut call).await?;
                self.receive_locked(inner, Some(&mut call), DEFAULT_RECEIVE_TIMEOUT, None)
                    .await
            }
            other => other,
        }
    }
}
