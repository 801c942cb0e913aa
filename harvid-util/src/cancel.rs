use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A cheaply cloneable flag threaded from an HTTP handler down into the core.
///
/// Cancelling a token only affects code that explicitly polls it at a
/// suspension point (a lease wait, a singleflight wait); it does not abort
/// an in-progress decode.
#[derive(Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
