use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cooperative cancellation shared between a caller and its loads.
///
/// Cancelling never aborts the engine operation. It only suppresses delivery
/// of the result, which is then released.
#[derive(Clone, Default)]
pub struct CancelToken {
    shared: Arc<Flag>,
}

#[derive(Default)]
struct Flag {
    state: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        if !self.shared.state.swap(true, Ordering::SeqCst) {
            self.shared.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.shared.notify.notified();
            if self.is_cancelled() {
                break;
            }

            notified.await;
        }
    }
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
