//! The client transport collaborator.

use crate::SgResult;
use std::sync::Arc;

/// Callback used to wake a pipeline's owner when the transport becomes
/// ready for more output.
pub type WakeCallback = Arc<dyn Fn() + 'static + Send + Sync>;

/// Trait for the per-connection transport a reply streams out on.
///
/// The only ordering the pipeline assumes is that bytes submitted via
/// [Transport::send] before the `is_last` send are delivered in submission
/// order.
pub trait Transport: 'static + Send + Sync + std::fmt::Debug {
    /// True iff the output buffer can accept more bytes right now.
    fn is_output_ready(&self) -> bool;

    /// Push framed bytes towards the client. `is_last` finalizes the
    /// response once the bytes are out.
    fn send(&self, data: bytes::Bytes, is_last: bool) -> SgResult<()>;

    /// Register the callback invoked whenever output readiness returns.
    /// Replaces any previously registered callback.
    fn register_for_wake(&self, cb: WakeCallback);

    /// True iff the client went away.
    fn is_closed(&self) -> bool;
}

/// Trait object [Transport].
pub type DynTransport = Arc<dyn Transport>;
