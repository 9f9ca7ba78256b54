//! Topic-keyed listener registries
//!
//! Subscribers are stored per topic in registration order. A topic is created
//! on its first subscription and removed once its last subscriber leaves.
//! Callbacks are invoked outside the internal lock, so a callback may
//! subscribe or unsubscribe while it runs. A panicking callback is logged and
//! does not prevent delivery to the remaining ones.

use core::fmt;
use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
}

struct Inner<K, T> {
    topics: Mutex<HashMap<K, Vec<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash, T> Inner<K, T> {
    fn remove(&self, topic: &K, id: u64) -> bool {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = topics.get_mut(topic) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            topics.remove(topic);
        }
        removed
    }
}

// ----------------------------------------------------------------------------
// Subscription Handle
// ----------------------------------------------------------------------------

/// Keeps a callback registered; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the callback registered for the lifetime of the registry
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Listener Registry
// ----------------------------------------------------------------------------

pub struct ListenerRegistry<K, T> {
    inner: Arc<Inner<K, T>>,
}

impl<K, T> Clone for ListenerRegistry<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> Default for ListenerRegistry<K, T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl<K, T> ListenerRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: K, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
            topics.entry(topic.clone()).or_default().push(Entry {
                id,
                callback: Arc::new(callback),
            });
        }

        let weak: Weak<Inner<K, T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove(&topic, id);
                }
            })),
        }
    }

    /// Deliver `payload` to every subscriber of `topic`; returns how many ran
    pub fn publish(&self, topic: &K, payload: &T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
            match topics.get(topic) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.callback)).collect(),
                None => return 0,
            }
        };

        for callback in &callbacks {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                error!(
                    "Listener for topic {:?} panicked: {}",
                    topic,
                    panic_message(panic.as_ref())
                );
            }
        }
        callbacks.len()
    }

    pub fn has_subscribers(&self, topic: &K) -> bool {
        self.subscriber_count(topic) > 0
    }

    pub fn subscriber_count(&self, topic: &K) -> usize {
        let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.get(topic).map_or(0, Vec::len)
    }

    pub fn topic_count(&self) -> usize {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, T> fmt::Debug for ListenerRegistry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let topics = self.inner.topics.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ListenerRegistry")
            .field("topics", &topics.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

// ----------------------------------------------------------------------------
// Listener Set
// ----------------------------------------------------------------------------

/// Registry without topics, for broadcast-style notifications
pub struct ListenerSet<T> {
    registry: ListenerRegistry<(), T>,
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            registry: ListenerRegistry::default(),
        }
    }
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.registry.subscribe((), callback)
    }

    pub fn notify(&self, payload: &T) -> usize {
        self.registry.publish(&(), payload)
    }

    pub fn len(&self) -> usize {
        self.registry.subscriber_count(&())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ListenerSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_in_registration_order() {
        let registry: ListenerRegistry<u64, u32> = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = {
            let seen = Arc::clone(&seen);
            registry.subscribe(1, move |v| seen.lock().unwrap().push(("first", *v)))
        };
        let s2 = {
            let seen = Arc::clone(&seen);
            registry.subscribe(1, move |v| seen.lock().unwrap().push(("second", *v)))
        };

        assert_eq!(registry.publish(&1, &7), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
        drop((s1, s2));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let registry: ListenerRegistry<u64, u32> = ListenerRegistry::new();
        assert_eq!(registry.publish(&9, &1), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn test_empty_topic_is_pruned() {
        let registry: ListenerRegistry<u64, u32> = ListenerRegistry::new();
        let a = registry.subscribe(1, |_| {});
        let b = registry.subscribe(1, |_| {});
        assert_eq!(registry.subscriber_count(&1), 2);

        a.unsubscribe();
        assert_eq!(registry.topic_count(), 1);
        drop(b);
        assert_eq!(registry.topic_count(), 0);
        assert!(!registry.has_subscribers(&1));
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry: ListenerRegistry<u64, u32> = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _bad = registry.subscribe(1, |_| panic!("listener failure"));
        let _good = {
            let calls = Arc::clone(&calls);
            registry.subscribe(1, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert_eq!(registry.publish(&1, &0), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let registry: ListenerRegistry<u64, u32> = ListenerRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let subscription = {
            let slot = Arc::clone(&slot);
            registry.subscribe(1, move |_| {
                if let Some(own) = slot.lock().unwrap().take() {
                    own.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(subscription);

        assert_eq!(registry.publish(&1, &0), 1);
        assert_eq!(registry.topic_count(), 0);
        assert_eq!(registry.publish(&1, &0), 0);
    }

    #[test]
    fn test_detached_subscription_stays_registered() {
        let set: ListenerSet<u32> = ListenerSet::new();
        set.subscribe(|_| {}).detach();
        assert_eq!(set.len(), 1);
        assert_eq!(set.notify(&3), 1);
    }

    #[test]
    fn test_concurrent_subscribe_and_publish() {
        let registry: ListenerRegistry<u64, u32> = ListenerRegistry::new();
        let total = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8u64)
            .map(|topic| {
                let registry = registry.clone();
                let total = Arc::clone(&total);
                std::thread::spawn(move || {
                    let sub = registry.subscribe(topic % 2, move |_| {
                        total.fetch_add(1, Ordering::SeqCst);
                    });
                    registry.publish(&(topic % 2), &0);
                    drop(sub);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(total.load(Ordering::SeqCst) >= 8);
        assert_eq!(registry.topic_count(), 0);
    }
}
