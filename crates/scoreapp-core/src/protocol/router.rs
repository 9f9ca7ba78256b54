//! Frame dispatch
//!
//! Decoded frames are fanned out to three audiences: race views subscribed by
//! race id, online-barrier listeners and current-race listeners. The last
//! barrier list and current race pointer are cached so late subscribers can
//! read them without waiting for the next frame.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace, warn};

use super::frame::InboundFrame;
use crate::listeners::{ListenerRegistry, ListenerSet, Subscription};
use crate::types::{BarrierId, FullRace, RaceId};

/// What a routed frame updated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSummary {
    /// Race id and the number of race listeners that received it
    pub race: Option<(RaceId, usize)>,
    pub barriers_updated: bool,
    pub current_race_updated: bool,
}

#[derive(Default)]
struct Cached {
    online_barriers: Vec<BarrierId>,
    current_race: Option<RaceId>,
}

#[derive(Clone, Default)]
pub struct MessageRouter {
    races: ListenerRegistry<RaceId, Arc<FullRace>>,
    barriers: ListenerSet<Vec<BarrierId>>,
    current_race: ListenerSet<Option<RaceId>>,
    cached: Arc<Mutex<Cached>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    pub fn subscribe_race<F>(&self, race_id: RaceId, callback: F) -> Subscription
    where
        F: Fn(&Arc<FullRace>) + Send + Sync + 'static,
    {
        self.races.subscribe(race_id, callback)
    }

    pub fn on_barriers<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<BarrierId>) + Send + Sync + 'static,
    {
        self.barriers.subscribe(callback)
    }

    pub fn on_current_race<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Option<RaceId>) + Send + Sync + 'static,
    {
        self.current_race.subscribe(callback)
    }

    pub fn online_barriers(&self) -> Vec<BarrierId> {
        self.cached().online_barriers.clone()
    }

    pub fn current_race(&self) -> Option<RaceId> {
        self.cached().current_race
    }

    /// Number of races with at least one subscribed view
    pub fn watched_races(&self) -> usize {
        self.races.topic_count()
    }

    fn cached(&self) -> std::sync::MutexGuard<'_, Cached> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Decode and dispatch a raw payload; malformed payloads are logged and dropped
    pub fn handle_payload(&self, text: &str) -> Option<RouteSummary> {
        match InboundFrame::decode(text) {
            Ok(frame) => Some(self.dispatch(frame)),
            Err(err) => {
                warn!("Dropping malformed frame: {}", err);
                trace!("Malformed frame content: {}", text);
                None
            }
        }
    }

    pub fn dispatch(&self, frame: InboundFrame) -> RouteSummary {
        let mut summary = RouteSummary::default();
        if frame.is_empty() {
            debug!("Frame carries no recognized facet");
            return summary;
        }

        if let Some(barriers) = frame.barriers {
            self.cached().online_barriers = barriers.clone();
            self.barriers.notify(&barriers);
            summary.barriers_updated = true;
        }

        if let Some(current) = frame.current_race {
            let current = current.map(|race| race.id);
            self.cached().current_race = current;
            self.current_race.notify(&current);
            summary.current_race_updated = true;
        }

        if let Some(race) = frame.race {
            let race_id = race.id;
            let delivered = self.races.publish(&race_id, &Arc::new(race));
            trace!("Race {} delivered to {} listeners", race_id, delivered);
            summary.race = Some((race_id, delivered));
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_barriers_frame_only_notifies_barrier_listeners() {
        let router = MessageRouter::new();
        let (barriers, current, race) = (counter(), counter(), counter());

        let _b = {
            let barriers = Arc::clone(&barriers);
            router.on_barriers(move |list| {
                assert_eq!(list, &vec![1, 2]);
                barriers.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _c = {
            let current = Arc::clone(&current);
            router.on_current_race(move |_| {
                current.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _r = {
            let race = Arc::clone(&race);
            router.subscribe_race(1, move |_| {
                race.fetch_add(1, Ordering::SeqCst);
            })
        };

        let summary = router.handle_payload(r#"{"barriers":[1,2]}"#).unwrap();
        assert!(summary.barriers_updated);
        assert_eq!(barriers.load(Ordering::SeqCst), 1);
        assert_eq!(current.load(Ordering::SeqCst), 0);
        assert_eq!(race.load(Ordering::SeqCst), 0);
        assert_eq!(router.online_barriers(), vec![1, 2]);
    }

    #[test]
    fn test_race_routed_by_id() {
        let router = MessageRouter::new();
        let hits = counter();
        let _sub = {
            let hits = Arc::clone(&hits);
            router.subscribe_race(7, move |race| {
                assert_eq!(race.id, 7);
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        let frame = r#"{"race":{"id":7,"updatedAt":1,"type":"time_trial","state":"running","teamABarrierId":1,"crossings":[]}}"#;
        let summary = router.handle_payload(frame).unwrap();
        assert_eq!(summary.race, Some((7, 1)));

        let other = frame.replace("\"id\":7", "\"id\":8");
        assert_eq!(router.handle_payload(&other).unwrap().race, Some((8, 0)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_race_pointer_updates_and_clears() {
        let router = MessageRouter::new();
        router.handle_payload(r#"{"currentRace":{"id":3}}"#);
        assert_eq!(router.current_race(), Some(3));

        router.handle_payload(r#"{"currentRace":null}"#);
        assert_eq!(router.current_race(), None);
    }

    #[test]
    fn test_multi_facet_frame_dispatches_each_facet() {
        let router = MessageRouter::new();
        let summary = router
            .handle_payload(r#"{"barriers":[4],"currentRace":{"id":9}}"#)
            .unwrap();
        assert!(summary.barriers_updated);
        assert!(summary.current_race_updated);
        assert_eq!(router.current_race(), Some(9));
    }

    #[test]
    fn test_malformed_payload_is_dropped() {
        let router = MessageRouter::new();
        assert_eq!(router.handle_payload("{oops"), None);
        assert!(router.online_barriers().is_empty());
    }
}
