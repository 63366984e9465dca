use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::types::{sportsbook_key, Observation, Opportunity, OpportunityId};

/// Result of merging one poll into the active set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    pub added: usize,
    pub updated: usize,
    /// Ids no longer reported by the feed, dropped from the active set.
    pub removed: Vec<OpportunityId>,
    /// The rows actually merged, one per id (last duplicate wins). This is
    /// what must be persisted so the stored baseline matches memory.
    pub applied: Vec<Observation>,
}

// ---------------------------------------------------------------------------
// OpportunityStore
// ---------------------------------------------------------------------------

/// Active opportunities keyed by id. The initial snapshot is written when an
/// id is first inserted and never touched again; the current snapshot is
/// replaced on every observation.
pub struct OpportunityStore {
    active: DashMap<OpportunityId, Opportunity>,
    /// Serialises whole-poll merges so two polls never interleave removals.
    poll_lock: Mutex<()>,
    /// Held across merge and persistence enqueue so the database sees polls
    /// in the same order as memory.
    ingest_lock: tokio::sync::Mutex<()>,
}

impl OpportunityStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Load opportunities read back from the database, keeping their stored
    /// initial snapshots.
    pub fn hydrate(&self, opportunities: Vec<Opportunity>) {
        for opp in opportunities {
            self.active.insert(opp.id.clone(), opp);
        }
    }

    /// Insert or update one observation. Returns true when the id is new.
    pub fn upsert(&self, obs: Observation) -> bool {
        match self.active.get_mut(&obs.id) {
            Some(mut existing) => {
                existing.current = obs.snapshot;
                existing.details = obs.details;
                if existing.initial.is_none() {
                    // Read-back race left no baseline: the first full
                    // observation becomes it.
                    existing.initial = Some(existing.current.clone());
                }
                false
            }
            None => {
                let first_seen_at = obs.snapshot.observed_at;
                self.active.insert(
                    obs.id.clone(),
                    Opportunity {
                        id: obs.id,
                        details: obs.details,
                        initial: Some(obs.snapshot.clone()),
                        current: obs.snapshot,
                        first_seen_at,
                    },
                );
                true
            }
        }
    }

    /// Exclusive ingest section; see `refresh::ingest`.
    pub async fn lock_ingest(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.ingest_lock.lock().await
    }

    /// Merge a full poll: new ids are created, known ids get a new current
    /// snapshot, ids missing from the poll leave the active set. When an id
    /// appears more than once the last row wins.
    pub fn apply_poll(&self, observations: Vec<Observation>) -> PollOutcome {
        let _guard = self.poll_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut latest: Vec<Observation> = Vec::with_capacity(observations.len());
        let mut index: HashMap<OpportunityId, usize> = HashMap::new();
        for obs in observations {
            match index.get(&obs.id) {
                Some(&i) => latest[i] = obs,
                None => {
                    index.insert(obs.id.clone(), latest.len());
                    latest.push(obs);
                }
            }
        }

        let seen: HashSet<OpportunityId> = index.into_keys().collect();
        let removed: Vec<OpportunityId> = self
            .active
            .iter()
            .filter(|e| !seen.contains(e.key()))
            .map(|e| e.key().clone())
            .collect();
        for id in &removed {
            self.active.remove(id);
        }

        let mut outcome = PollOutcome {
            removed,
            ..Default::default()
        };
        outcome.applied = latest.clone();
        for obs in latest {
            if self.upsert(obs) {
                outcome.added += 1;
            } else {
                outcome.updated += 1;
            }
        }
        outcome
    }

    pub fn get(&self, id: &OpportunityId) -> Option<Opportunity> {
        self.active.get(id).map(|o| o.clone())
    }

    /// Point-in-time copy of the active set, oldest first (ties by id) so a
    /// ranking pass sees a deterministic input order.
    pub fn active_opportunities(&self) -> Vec<Opportunity> {
        let mut all: Vec<Opportunity> = self.active.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.first_seen_at.cmp(&b.first_seen_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn sportsbook_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for e in self.active.iter() {
            *counts.entry(sportsbook_key(&e.current.sportsbook)).or_default() += 1;
        }
        counts
    }

    /// Most recent observation time across the active set.
    pub fn latest_observation(&self) -> Option<DateTime<Utc>> {
        self.active.iter().map(|e| e.current.observed_at).max()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for OpportunityStore {
    fn default() -> Self {
        Self {
            active: DashMap::new(),
            poll_lock: Mutex::new(()),
            ingest_lock: tokio::sync::Mutex::new(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BetDetails, Snapshot};
    use chrono::Duration;

    fn obs(id: &str, book: &str, ev: f64, observed_at: DateTime<Utc>) -> Observation {
        Observation {
            id: OpportunityId::from(id.to_string()),
            details: BetDetails::default(),
            snapshot: Snapshot {
                odds: Some(-115.0),
                ev_percent: Some(ev),
                win_probability: Some(55.0),
                market_implied_probability: Some(53.5),
                event_time: Some(observed_at + Duration::hours(3)),
                sportsbook: book.to_string(),
                observed_at,
            },
        }
    }

    #[test]
    fn first_observation_sets_initial_equal_to_current() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        assert!(store.upsert(obs("x", "fanduel", 3.0, t0)));

        let opp = store.get(&OpportunityId::from("x".to_string())).unwrap();
        assert_eq!(opp.initial.as_ref(), Some(&opp.current));
        assert_eq!(opp.first_seen_at, t0);
    }

    #[test]
    fn later_polls_replace_current_but_never_initial() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        store.apply_poll(vec![obs("x", "fanduel", 3.0, t0)]);
        let outcome = store.apply_poll(vec![obs("x", "fanduel", 9.0, t0 + Duration::minutes(5))]);
        store.apply_poll(vec![obs("x", "fanduel", 7.0, t0 + Duration::minutes(10))]);

        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.updated, 1);
        let opp = store.get(&OpportunityId::from("x".to_string())).unwrap();
        assert_eq!(opp.current.ev_percent, Some(7.0));
        assert_eq!(opp.initial.unwrap().ev_percent, Some(3.0));
        assert_eq!(opp.first_seen_at, t0);
    }

    #[test]
    fn ids_missing_from_a_poll_leave_the_active_set() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        store.apply_poll(vec![obs("a", "fanduel", 3.0, t0), obs("b", "betmgm", 4.0, t0)]);
        let outcome = store.apply_poll(vec![obs("b", "betmgm", 5.0, t0), obs("c", "caesars", 1.0, t0)]);

        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.removed, vec![OpportunityId::from("a".to_string())]);
        assert_eq!(store.len(), 2);
        assert!(store.get(&OpportunityId::from("a".to_string())).is_none());
    }

    #[test]
    fn duplicate_ids_in_one_poll_last_row_wins() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        let outcome = store.apply_poll(vec![obs("a", "fanduel", 3.0, t0), obs("a", "fanduel", 6.0, t0)]);
        assert_eq!(outcome.added, 1);
        let opp = store.get(&OpportunityId::from("a".to_string())).unwrap();
        assert_eq!(opp.current.ev_percent, Some(6.0));
        assert_eq!(opp.initial.unwrap().ev_percent, Some(6.0));
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].snapshot.ev_percent, Some(6.0));
    }

    #[test]
    fn sportsbook_counts_ignore_case_and_padding() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        store.apply_poll(vec![
            obs("a", "FanDuel", 1.0, t0),
            obs("b", " fanduel", 1.0, t0),
            obs("c", "BetMGM", 1.0, t0),
        ]);
        let counts = store.sportsbook_counts();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["fanduel"], 2);
        assert_eq!(counts["betmgm"], 1);
    }

    #[test]
    fn hydrated_initial_survives_updates() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        let first = obs("h", "fanduel", 2.0, t0);
        store.hydrate(vec![Opportunity {
            id: first.id.clone(),
            details: BetDetails::default(),
            initial: Some(first.snapshot.clone()),
            current: first.snapshot.clone(),
            first_seen_at: t0,
        }]);
        store.apply_poll(vec![obs("h", "fanduel", 8.0, t0 + Duration::minutes(5))]);
        let opp = store.get(&first.id).unwrap();
        assert_eq!(opp.initial.unwrap().ev_percent, Some(2.0));
    }

    #[test]
    fn active_list_is_ordered_by_first_sighting() {
        let store = OpportunityStore::new();
        let t0 = Utc::now();
        store.upsert(obs("late", "fanduel", 1.0, t0 + Duration::minutes(1)));
        store.upsert(obs("b_early", "fanduel", 1.0, t0));
        store.upsert(obs("a_early", "betmgm", 1.0, t0));
        let ids: Vec<String> = store
            .active_opportunities()
            .into_iter()
            .map(|o| o.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a_early", "b_early", "late"]);
        assert_eq!(store.sportsbook_counts()["fanduel"], 2);
        assert_eq!(store.latest_observation(), Some(t0 + Duration::minutes(1)));
    }
}
