//! Sliding-window admission control keyed by user.
//!
//! Each user owns a deque of admission instants. Every check prunes the
//! deque to the trailing [`RATE_WINDOW`] and admits only while the pruned
//! length is below the user's quota. Users whose window has emptied are
//! dropped by [`RateLimiter::sweep`], which the server runs once per window.
//!
//! Users are spread over a fixed set of shards, each behind its own
//! `parking_lot::Mutex`. Prune, compare, and push for one user all happen
//! under that user's shard lock, so concurrent requests from the same user
//! can never both slip into the last free slot.

use crate::roles::{RoleStore, UserId, RATE_WINDOW};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};
use tracing::debug;

const SHARD_COUNT: usize = 16;

type Shard = Mutex<HashMap<UserId, VecDeque<Instant>>>;

/// Rejection details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub quota: u32,
    /// Time until the oldest admission leaves the window.
    pub retry_after: Duration,
}

/// Per-user sliding-window limiter.
pub struct RateLimiter {
    roles: RoleStore,
    window: Duration,
    shards: Vec<Shard>,
}

impl RateLimiter {
    pub fn new(roles: RoleStore) -> Self {
        Self::with_window(roles, RATE_WINDOW)
    }

    pub fn with_window(roles: RoleStore, window: Duration) -> Self {
        Self {
            roles,
            window,
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    pub fn roles(&self) -> &RoleStore {
        &self.roles
    }

    fn shard(&self, user: &UserId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        user.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Admit or reject a request at `now`.
    pub fn admit(&self, user: &UserId, now: Instant) -> bool {
        self.check(user, now).is_ok()
    }

    /// Same as [`admit`](Self::admit) but reports why a request was refused.
    pub fn check(&self, user: &UserId, now: Instant) -> Result<(), RateLimited> {
        let quota = self.roles.quota_of(user);
        let mut shard = self.shard(user).lock();
        let stamps = shard.entry(user.clone()).or_default();

        prune(stamps, now, self.window);

        if stamps.len() >= quota as usize {
            let retry_after = stamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            debug!(user = %user, quota, in_window = stamps.len(), "rate limit exceeded");
            return Err(RateLimited { quota, retry_after });
        }

        stamps.push_back(now);
        debug!(user = %user, quota, in_window = stamps.len(), "request admitted");
        Ok(())
    }

    /// Number of admissions inside the window at `now`. Prunes, never records.
    pub fn window_len(&self, user: &UserId, now: Instant) -> usize {
        let mut shard = self.shard(user).lock();
        let Some(stamps) = shard.get_mut(user) else {
            return 0;
        };
        prune(stamps, now, self.window);
        let len = stamps.len();
        if len == 0 {
            shard.remove(user);
        }
        len
    }

    /// Prune every window and forget users with nothing left in theirs.
    /// Returns how many users were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut dropped = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, stamps| {
                prune(stamps, now, self.window);
                !stamps.is_empty()
            });
            dropped += before - shard.len();
        }
        if dropped > 0 {
            debug!(dropped, "swept idle rate limit windows");
        }
        dropped
    }

    /// Number of users with a window entry.
    pub fn tracked_users(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
}

/// Drop every stamp with `now - stamp >= window`. Stamps are pushed in
/// call order, so expired ones sit at the front.
fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = stamps.front() {
        if now.saturating_duration_since(*oldest) >= window {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use std::sync::Arc;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RoleStore::new(["admin"], ["vip"]))
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn admits_quota_then_rejects_next_for_every_role() {
        let limiter = limiter();
        let start = Instant::now();

        for (user, role) in [
            ("plain", Role::Standard),
            ("vip", Role::Premium),
            ("admin", Role::Admin),
        ] {
            let user = UserId::from(user);
            for i in 0..role.quota() {
                assert!(
                    limiter.admit(&user, start + Duration::from_millis(i as u64)),
                    "{} call {} should be admitted",
                    role,
                    i + 1
                );
            }
            assert!(
                !limiter.admit(&user, start + secs(1)),
                "{} call {} should be rejected",
                role,
                role.quota() + 1
            );
        }
    }

    #[test]
    fn rejection_does_not_record_timestamp() {
        let limiter = limiter();
        let user = UserId::from("plain");
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.admit(&user, start));
        }
        for i in 1..=10 {
            assert!(!limiter.admit(&user, start + secs(i)));
        }
        assert_eq!(limiter.window_len(&user, start + secs(10)), 5);
    }

    #[test]
    fn window_fully_resets_after_sixty_seconds() {
        let limiter = limiter();
        let user = UserId::from("plain");
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.admit(&user, start));
        }
        assert!(!limiter.admit(&user, start + secs(30)));

        let later = start + secs(61);
        assert!(limiter.admit(&user, later));
        assert_eq!(limiter.window_len(&user, later), 1);
    }

    #[test]
    fn stamp_exactly_sixty_seconds_old_is_expired() {
        let limiter = limiter();
        let user = UserId::from("plain");
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.admit(&user, start));
        }
        assert!(!limiter.admit(&user, start + Duration::from_millis(59_999)));
        assert!(limiter.admit(&user, start + secs(60)));
    }

    #[test]
    fn window_slides_one_slot_at_a_time() {
        let limiter = limiter();
        let user = UserId::from("plain");
        let start = Instant::now();

        for i in 0..5 {
            assert!(limiter.admit(&user, start + secs(i * 10)));
        }
        // 55s: all five still inside.
        assert!(!limiter.admit(&user, start + secs(55)));
        // 61s: the stamp at 0s has expired, one slot opens.
        assert!(limiter.admit(&user, start + secs(61)));
        assert!(!limiter.admit(&user, start + secs(62)));
    }

    #[test]
    fn check_reports_retry_after_from_oldest_stamp() {
        let limiter = limiter();
        let user = UserId::from("plain");
        let start = Instant::now();

        for _ in 0..5 {
            limiter.check(&user, start).unwrap();
        }
        let err = limiter.check(&user, start + secs(20)).unwrap_err();
        assert_eq!(err.quota, 5);
        assert_eq!(err.retry_after, secs(40));
    }

    #[test]
    fn users_do_not_share_windows() {
        let limiter = limiter();
        let start = Instant::now();
        let a = UserId::from("a");
        let b = UserId::from("b");

        for _ in 0..5 {
            assert!(limiter.admit(&a, start));
        }
        assert!(!limiter.admit(&a, start));
        assert!(limiter.admit(&b, start));
        assert_eq!(limiter.tracked_users(), 2);
    }

    #[test]
    fn concurrent_same_user_never_exceeds_quota() {
        let limiter = Arc::new(limiter());
        let user = UserId::from("plain");
        let now = Instant::now();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                let user = user.clone();
                std::thread::spawn(move || limiter.admit(&user, now))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 5);
        assert_eq!(limiter.window_len(&user, now), 5);
    }

    #[test]
    fn sweep_forgets_users_with_expired_windows() {
        let limiter = limiter();
        let start = Instant::now();

        assert!(limiter.admit(&UserId::from("early"), start));
        assert!(limiter.admit(&UserId::from("late"), start + secs(30)));
        assert_eq!(limiter.tracked_users(), 2);

        assert_eq!(limiter.sweep(start + secs(45)), 0);
        assert_eq!(limiter.sweep(start + secs(60)), 1);
        assert_eq!(limiter.tracked_users(), 1);
        assert_eq!(limiter.window_len(&UserId::from("late"), start + secs(60)), 1);

        assert_eq!(limiter.sweep(start + secs(90)), 1);
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn swept_user_starts_with_a_fresh_window() {
        let limiter = limiter();
        let user = UserId::from("plain");
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.admit(&user, start));
        }
        assert!(!limiter.admit(&user, start + secs(10)));

        limiter.sweep(start + secs(61));
        assert_eq!(limiter.tracked_users(), 0);
        for _ in 0..5 {
            assert!(limiter.admit(&user, start + secs(62)));
        }
    }

    #[test]
    fn window_len_drops_empty_entries() {
        let limiter = limiter();
        let start = Instant::now();

        assert!(limiter.admit(&UserId::from("plain"), start));
        assert_eq!(limiter.window_len(&UserId::from("plain"), start + secs(60)), 0);
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn concurrent_distinct_users_are_all_admitted() {
        let limiter = Arc::new(limiter());
        let now = Instant::now();

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.admit(&UserId::from(format!("u{}", i)), now))
            })
            .collect();

        assert!(handles.into_iter().all(|h| h.join().unwrap()));
        assert_eq!(limiter.tracked_users(), 100);
    }
}
