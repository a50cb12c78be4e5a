//! SeqGate error types.

use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct SrcError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for SrcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for SrcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for SrcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl SrcError {
    /// Construct a new SrcError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core SeqGate error type. This type is used across the gateway
/// collaborator apis as well as internally in the request pipeline.
///
/// The type is `Clone` so that a single failure can be recorded on the
/// request and still be folded into the framed reply as a message chunk.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SgError {
    /// Generic SeqGate internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: SrcError,
    },
}

impl SgError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: SrcError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: SrcError::default(),
        }
    }
}

/// The core SeqGate result type.
pub type SgResult<T> = Result<T, SgError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            "cache open failed (src: None)",
            SgError::other("cache open failed").to_string().as_str(),
        );
        assert_eq!(
            "lookup (src: disk gone)",
            SgError::other_src("lookup", std::io::Error::other("disk gone"))
                .to_string()
                .as_str(),
        );
    }

    #[test]
    fn error_is_clone_send_and_sync() {
        fn ensure<T: Clone + std::fmt::Display + Send + Sync>(_t: T) {}
        ensure(SgError::other("bla"));
    }
}
