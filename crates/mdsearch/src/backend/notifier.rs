//! One-shot gather listener bookkeeping shared by the bundled backends.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{GatherListener, SubscriptionId};

/// Holds at most one subscribed listener and fires it at most once.
#[derive(Default)]
pub struct GatherNotifier {
    next_id: AtomicU64,
    listener: Mutex<Option<(SubscriptionId, GatherListener)>>,
}

impl std::fmt::Debug for GatherNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatherNotifier")
            .field("subscribed", &self.listener.lock().is_some())
            .finish()
    }
}

impl GatherNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previous listener.
    pub fn subscribe(&self, listener: GatherListener) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        *self.listener.lock() = Some((id, listener));
        id
    }

    /// Removes the listener if `subscription` is still the current one.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut slot = self.listener.lock();
        if slot.as_ref().is_some_and(|(id, _)| *id == subscription) {
            *slot = None;
        }
    }

    /// Fires and drops the current listener. Returns whether one was present.
    pub fn notify(&self) -> bool {
        // Release the lock before running the callback.
        let listener = self.listener.lock().take();
        match listener {
            Some((_, listener)) => {
                listener();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> GatherListener {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn notify_fires_once() {
        let notifier = GatherNotifier::new();
        let fired = Arc::new(AtomicUsize::new(0));
        notifier.subscribe(counting(&fired));
        assert!(notifier.notify());
        assert!(!notifier.notify());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_listener_never_fires() {
        let notifier = GatherNotifier::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = notifier.subscribe(counting(&fired));
        notifier.unsubscribe(id);
        assert!(!notifier.notify());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stale_unsubscribe_keeps_newer_listener() {
        let notifier = GatherNotifier::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let stale = notifier.subscribe(counting(&fired));
        notifier.subscribe(counting(&fired));
        notifier.unsubscribe(stale);
        assert!(notifier.notify());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
