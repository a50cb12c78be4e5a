//! An in-memory transport for driving pipelines in tests and embeddings.

use bytes::{BufMut, Bytes, BytesMut};
use seqgate_api::transport::{Transport, WakeCallback};
use seqgate_api::{SgError, SgResult};
use std::sync::Mutex;


#[derive(Debug, Default)]
struct MemTransportInner {
    out: BytesMut,
    output_blocked: bool,
    closed: bool,
    sends: u64,
    finalized: bool,
}

/// An in-memory rendition of the per-connection transport: captures the
/// framed bytes, simulates output backpressure and client disconnects, and
/// invokes the registered wake when writability returns.
#[derive(Default)]
pub struct MemTransport {
    inner: Mutex<MemTransportInner>,
    wake: Mutex<Option<WakeCallback>>,
}

impl std::fmt::Debug for MemTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTransport")
            .field("inner", &self.inner)
            .finish()
    }
}

impl MemTransport {
    /// Construct a new MemTransport, writable and open.
    pub fn create() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// Everything sent so far.
    pub fn collected(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().unwrap().out)
    }

    /// Everything sent so far, lossily decoded for assertions.
    pub fn collected_text(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().unwrap().out).into_owned()
    }

    /// Simulate output backpressure (and its release, which fires the
    /// registered wake).
    pub fn set_output_blocked(&self, blocked: bool) {
        self.inner.lock().unwrap().output_blocked = blocked;
        if !blocked {
            let wake = self.wake.lock().unwrap().clone();
            if let Some(wake) = wake {
                wake();
            }
        }
    }

    /// Simulate the client going away.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }

    /// How many send calls were accepted.
    pub fn send_count(&self) -> u64 {
        self.inner.lock().unwrap().sends
    }

    /// True once an `is_last` send finalized the response.
    pub fn is_finalized(&self) -> bool {
        self.inner.lock().unwrap().finalized
    }
}

impl Transport for MemTransport {
    fn is_output_ready(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        !inner.output_blocked && !inner.closed
    }

    fn send(&self, data: Bytes, is_last: bool) -> SgResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(SgError::other("connection closed"));
        }
        if inner.finalized {
            return Err(SgError::other("response already finalized"));
        }
        inner.out.put_slice(&data);
        inner.sends += 1;
        if is_last {
            inner.finalized = true;
        }
        Ok(())
    }

    fn register_for_wake(&self, cb: WakeCallback) {
        *self.wake.lock().unwrap() = Some(cb);
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}
