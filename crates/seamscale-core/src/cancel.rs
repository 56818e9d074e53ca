// crates/seamscale-core/src/cancel.rs
//
// One cancellation flag shared by the dispatch loop, every in-flight
// transform, and the synchronizer's write loop. Clones observe the same flag.
//
// A child token also observes its parent, so one video session can stop its
// own workers after a mux failure without cancelling the rest of the batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag:      Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    /// Token cancelled by `self` (or any of its ancestors) or by its own
    /// `cancel()`.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.flag.clone());
        Self { flag: Arc::new(AtomicBool::new(false)), ancestors }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.ancestors.iter().any(|a| a.load(Ordering::Relaxed))
    }

    /// `Err(Error::Cancelled)` once the flag is set, for use with `?`.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() { Err(crate::Error::Cancelled) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(b.check().is_ok());
        a.cancel();
        assert!(b.is_cancelled());
        assert!(b.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let root  = CancelToken::new();
        let child = root.child();
        child.cancel();
        assert!(!root.is_cancelled());

        let other = root.child();
        assert!(!other.is_cancelled());
        root.cancel();
        assert!(other.is_cancelled());
    }
}
