//! Ordered subscriber registry.
//!
//! Subscribers are zero-argument callbacks identified by the
//! [`SubscriptionToken`] returned when they were added. [`Subscribers`] is a
//! cheap handle onto one shared registry, so a callback can capture a clone
//! and add or remove entries while a tick is being dispatched.
//!
//! Dispatch walks a snapshot taken when the tick starts. An entry removed
//! mid-dispatch still runs for the current tick if it was in the snapshot,
//! and never afterwards. An entry added mid-dispatch first runs on the next
//! tick.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Callback = Rc<RefCell<dyn FnMut()>>;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    entries: Vec<(SubscriptionToken, Callback)>,
    next_token: u64,
}

/// Shared, ordered set of tick callbacks.
#[derive(Clone, Default)]
pub struct Subscribers {
    registry: Rc<RefCell<Registry>>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}

impl Subscribers {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. The same closure logic may be added any number of
    /// times; each call yields a distinct token.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: FnMut() + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let token = SubscriptionToken(registry.next_token);
        registry.next_token += 1;
        let callback: Callback = Rc::new(RefCell::new(callback));
        registry.entries.push((token, callback));
        token
    }

    /// Remove the entry for `token`. Returns false if it was already gone.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut registry = self.registry.borrow_mut();
        let before = registry.entries.len();
        registry.entries.retain(|(t, _)| *t != token);
        registry.entries.len() != before
    }

    /// Whether `token` is still subscribed.
    #[must_use]
    pub fn contains(&self, token: SubscriptionToken) -> bool {
        self.registry.borrow().entries.iter().any(|(t, _)| *t == token)
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    /// Whether there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every subscription.
    pub fn clear(&self) {
        self.registry.borrow_mut().entries.clear();
    }

    /// Invoke every current subscriber in subscription order.
    ///
    /// Returns the number of callbacks invoked. A panic in a callback
    /// propagates to the caller and the remaining callbacks are skipped.
    pub fn dispatch(&self) -> usize {
        let snapshot: Vec<Callback> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();

        for callback in &snapshot {
            (&mut *callback.borrow_mut())();
        }
        snapshot.len()
    }
}
