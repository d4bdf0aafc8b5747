//! Global, per-model, per-user and time-bucketed request counters.
//!
//! All counters only ever grow, and nothing survives a restart.

use crate::roles::UserId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Buckets {
    per_model: HashMap<String, u64>,
    per_user: HashMap<UserId, u64>,
    daily: HashMap<String, u64>,
    hourly: HashMap<String, u64>,
    first_seen: HashMap<UserId, DateTime<Utc>>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageSnapshot {
    pub total: u64,
    pub per_model: BTreeMap<String, u64>,
    pub per_user: BTreeMap<String, u64>,
    pub daily: BTreeMap<String, u64>,
    pub hourly: BTreeMap<String, u64>,
    pub users_seen: usize,
}

/// Thread-safe usage counters.
///
/// The total is atomic so it can be read without taking the lock; every
/// map update for one request happens under a single lock acquisition.
#[derive(Default)]
pub struct UsageRecorder {
    total: AtomicU64,
    buckets: Mutex<Buckets>,
}

impl UsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request that reached the upstream.
    pub fn record(&self, user: &UserId, model_id: &str, now: DateTime<Utc>) {
        let mut buckets = self.buckets.lock();

        *buckets.per_model.entry(model_id.to_string()).or_insert(0) += 1;
        *buckets.per_user.entry(user.clone()).or_insert(0) += 1;
        *buckets.daily.entry(date_bucket(&now)).or_insert(0) += 1;
        *buckets.hourly.entry(hour_bucket(&now)).or_insert(0) += 1;
        buckets.first_seen.entry(user.clone()).or_insert(now);

        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn first_seen(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.buckets.lock().first_seen.get(user).copied()
    }

    pub fn user_count(&self, user: &UserId) -> u64 {
        self.buckets.lock().per_user.get(user).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let buckets = self.buckets.lock();
        UsageSnapshot {
            total: self.total(),
            per_model: sorted(&buckets.per_model),
            per_user: buckets
                .per_user
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            daily: sorted(&buckets.daily),
            hourly: sorted(&buckets.hourly),
            users_seen: buckets.first_seen.len(),
        }
    }
}

fn sorted(map: &HashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

/// UTC day bucket, `YYYY-MM-DD`.
pub fn date_bucket(now: &DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// UTC hour bucket, `YYYY-MM-DD HH:00`.
pub fn hour_bucket(now: &DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:00").to_string()
}
