//! RPC session: one duplex connection to one replica endpoint.
//!
//! Outbound and inbound halves are decoupled. A writer task drains a bounded
//! outbound queue of pre-encoded frames; a reader task reassembles frames
//! from the stream and completes waiters by seqid. Responses may arrive in
//! any order; only seqid correlation is guaranteed.
//!
//! Lifecycle: Disconnected → Connecting → Ready → Failed. A failed session
//! drains every pending waiter with a connection error and is replaced by
//! the pool on next demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use kestrel_common::{KestrelError, KestrelResult};
use kestrel_proto::codec::{self, Frame};
use kestrel_proto::types::{self as wire, MessageKind, RequestBody, ResponseBody};

/// Bound on the TCP connect + handshake phase.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Capacity of the per-session outbound frame queue.
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Read buffer growth unit.
const READ_CHUNK: usize = 16 * 1024;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

type Waiter = oneshot::Sender<KestrelResult<Frame>>;

/// A multiplexed RPC connection to a single endpoint.
pub struct RpcSession {
    endpoint: String,
    state: Mutex<SessionState>,
    outbound_tx: mpsc::Sender<BytesMut>,
    pending: DashMap<u64, Waiter>,
    next_seqid: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RpcSession {
    /// Create a session and start connecting eagerly. Calls made while the
    /// connection is still being established queue up and are drained once
    /// the session is ready (or failed).
    pub fn open(endpoint: String) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let session = Arc::new(Self {
            endpoint,
            state: Mutex::new(SessionState::Connecting),
            outbound_tx,
            pending: DashMap::new(),
            next_seqid: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        });
        let driver = session.clone();
        let handle = tokio::spawn(async move { driver.run(outbound_rx).await });
        session.tasks.lock().push(handle);
        session
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session can no longer carry calls.
    pub fn is_failed(&self) -> bool {
        self.state() == SessionState::Failed
    }

    /// The remote endpoint this session is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Issue one call and await its correlated response within `deadline`.
    ///
    /// On deadline expiry the waiter is detached locally and a late server
    /// reply for that seqid is discarded by the reader.
    pub async fn call(&self, body: &RequestBody, deadline: Duration) -> KestrelResult<ResponseBody> {
        if self.is_failed() {
            return Err(KestrelError::connection(&self.endpoint, "session failed"));
        }

        let method = body.method();
        let seqid = self.next_seqid.fetch_add(1, Ordering::Relaxed);
        let frame_bytes = codec::encode_call(seqid, body);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(seqid, tx);
        // Close the race with a concurrent transition to Failed: the drain
        // may have run before our insert was visible.
        if self.is_failed() {
            self.pending.remove(&seqid);
            return Err(KestrelError::connection(&self.endpoint, "session failed"));
        }

        let outcome = time::timeout(deadline, async {
            if self.outbound_tx.send(frame_bytes).await.is_err() {
                return Err(KestrelError::connection(&self.endpoint, "outbound queue closed"));
            }
            match rx.await {
                Ok(result) => result,
                // Waiter dropped without a verdict: the session was torn down.
                Err(_) => Err(KestrelError::Cancelled),
            }
        })
        .await;

        match outcome {
            Ok(Ok(frame)) => self.interpret(frame),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                self.pending.remove(&seqid);
                Err(KestrelError::Timeout(method.to_string()))
            }
        }
    }

    /// Turn a correlated frame into a typed response or error.
    fn interpret(&self, frame: Frame) -> KestrelResult<ResponseBody> {
        match frame.kind {
            MessageKind::Reply => Ok(codec::decode_response(&frame.method, &frame.payload)?),
            MessageKind::Exception => {
                let exc = codec::decode_exception(&frame.payload)?;
                Err(self.exception_to_error(exc))
            }
            MessageKind::Call => Err(KestrelError::Proto(
                "unexpected CALL frame from server".into(),
            )),
        }
    }

    /// Map a replica-level exception onto the client error taxonomy.
    fn exception_to_error(&self, exc: wire::RemoteException) -> KestrelError {
        if wire::is_routing_error(exc.code) {
            KestrelError::routing_stale(exc.message, None)
        } else if wire::is_transient_error(exc.code) {
            KestrelError::connection(&self.endpoint, exc.message)
        } else {
            KestrelError::Application {
                code: exc.code,
                message: exc.message,
            }
        }
    }

    /// Cancel all pending calls and terminate reader/writer.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Failed {
                return;
            }
            *state = SessionState::Failed;
        }
        tracing::debug!(endpoint = %self.endpoint, "session closed");
        self.drain_pending(KestrelError::Cancelled);
        self.abort_tasks();
    }

    /// Transition to Failed and complete every pending waiter with a
    /// connection error. Idempotent.
    fn fail(&self, detail: String) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Failed {
                return;
            }
            *state = SessionState::Failed;
        }
        tracing::warn!(endpoint = %self.endpoint, detail = %detail, "session failed");
        self.drain_pending(KestrelError::connection(&self.endpoint, detail));
        self.abort_tasks();
    }

    fn drain_pending(&self, err: KestrelError) {
        let seqids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for seqid in seqids {
            if let Some((_, waiter)) = self.pending.remove(&seqid) {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    fn abort_tasks(&self) {
        // Aborting the calling task is harmless: cancellation lands at its
        // next await point, after it has already finished its teardown.
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Connection driver: establish the stream, then split into writer task
    /// and inline reader loop.
    async fn run(self: Arc<Self>, outbound_rx: mpsc::Receiver<BytesMut>) {
        let stream = match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.endpoint)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.fail(format!("connect failed: {e}"));
                return;
            }
            Err(_) => {
                self.fail("connect timed out".into());
                return;
            }
        };
        let _ = stream.set_nodelay(true);

        {
            let mut state = self.state.lock();
            // close() may have won the race during connect.
            if *state == SessionState::Failed {
                return;
            }
            *state = SessionState::Ready;
        }
        tracing::debug!(endpoint = %self.endpoint, "session ready");

        let (read_half, write_half) = stream.into_split();
        let writer = self.clone();
        let handle =
            tokio::spawn(async move { writer.write_loop(write_half, outbound_rx).await });
        self.tasks.lock().push(handle);

        self.read_loop(read_half).await;
    }

    async fn write_loop(
        self: Arc<Self>,
        mut write_half: OwnedWriteHalf,
        mut outbound_rx: mpsc::Receiver<BytesMut>,
    ) {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write_half.write_all(&frame).await {
                self.fail(format!("write error: {e}"));
                return;
            }
        }
    }

    async fn read_loop(&self, mut read_half: OwnedReadHalf) {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            loop {
                match codec::decode_frame(&buf) {
                    Ok((frame, consumed)) => {
                        let _ = buf.split_to(consumed);
                        self.complete(frame);
                    }
                    Err(e) if e.is_truncated() => break,
                    Err(e) => {
                        self.fail(format!("frame decode error: {e}"));
                        return;
                    }
                }
            }
            match read_half.read_buf(&mut buf).await {
                Ok(0) => {
                    self.fail("connection closed by peer".into());
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    self.fail(format!("read error: {e}"));
                    return;
                }
            }
        }
    }

    /// Hand a frame to its waiter; replies whose waiter already timed out
    /// or was cancelled are dropped.
    fn complete(&self, frame: Frame) {
        match self.pending.remove(&frame.seqid) {
            Some((_, waiter)) => {
                let _ = waiter.send(Ok(frame));
            }
            None => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    seqid = frame.seqid,
                    "discarding late reply"
                );
            }
        }
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_fails_pending() {
        // Bind-then-drop leaves a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let session = RpcSession::open(addr);
        let body = RequestBody::Ttl(wire::TtlRequest {
            gpid: kestrel_common::types::Gpid::new(kestrel_common::types::TableId(1), 0),
            key: b"\x00\x01hs".to_vec(),
        });
        let err = session.call(&body, Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), kestrel_common::ErrorKind::Connection);
        assert!(session.is_failed());
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_call_after_close_is_rejected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let session = RpcSession::open(addr);
        session.close();
        let body = RequestBody::Ttl(wire::TtlRequest {
            gpid: kestrel_common::types::Gpid::new(kestrel_common::types::TableId(1), 0),
            key: b"\x00\x01hs".to_vec(),
        });
        let err = session.call(&body, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind(), kestrel_common::ErrorKind::Connection);
    }

    #[test]
    fn test_seqids_are_unique() {
        let (tx, _rx) = mpsc::channel(1);
        let session = RpcSession {
            endpoint: "test:0".into(),
            state: Mutex::new(SessionState::Connecting),
            outbound_tx: tx,
            pending: DashMap::new(),
            next_seqid: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
        };
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(session.next_seqid.fetch_add(1, Ordering::Relaxed)));
        }
    }
}
