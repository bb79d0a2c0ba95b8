//! Session-scoped master password cache.
//!
//! Holds at most one master password for a bounded time so back-to-back
//! lock operations do not re-prompt. The slot is wiped on expiry, on
//! profile switch and on drop. Never persisted, never logged.
//!
//! Expiry is enforced twice: every accessor drops a stale entry, and
//! inside a tokio runtime each `store` arms a timer that wipes the entry
//! when its time-to-live ends even if nothing reads the cache again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use phantomvault_common::{Password, ProfileId};

struct CachedPassword {
    profile_id: ProfileId,
    password: Password,
    stored_at: Instant,
    generation: u64,
}

type Slot = Mutex<Option<CachedPassword>>;

/// Single-slot password cache with a time-to-live.
pub struct PasswordCache {
    slot: Arc<Slot>,
    ttl: Duration,
    generation: AtomicU64,
}

impl PasswordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            ttl,
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lock the slot, wiping the entry first if it has expired.
    fn fresh_slot(&self) -> Option<MutexGuard<'_, Option<CachedPassword>>> {
        let mut slot = self.slot.lock().ok()?;
        if slot.as_ref().is_some_and(|cached| cached.stored_at.elapsed() >= self.ttl) {
            debug!("Password cache entry expired");
            *slot = None;
        }
        Some(slot)
    }

    /// Cache the master password of `profile_id`, replacing any previous entry.
    pub fn store(&self, profile_id: &ProfileId, password: &Password) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(mut slot) = self.fresh_slot() {
            // Dropping the old value wipes it.
            *slot = Some(CachedPassword {
                profile_id: profile_id.clone(),
                password: password.clone(),
                stored_at: Instant::now(),
                generation,
            });
        }
        self.arm_expiry(generation);
    }

    /// Wipe entry `generation` once the time-to-live has passed.
    ///
    /// Outside a runtime only the accessors enforce expiry.
    fn arm_expiry(&self, generation: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let slot = Arc::downgrade(&self.slot);
        let ttl = self.ttl;
        runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(slot) = slot.upgrade() else {
                return;
            };
            if let Ok(mut slot) = slot.lock() {
                if slot.as_ref().is_some_and(|cached| cached.generation == generation) {
                    debug!("Password cache entry expired");
                    *slot = None;
                }
            };
        });
    }

    /// Get the cached password for `profile_id` if present and not expired.
    ///
    /// An expired or foreign entry is wiped.
    pub fn get(&self, profile_id: &ProfileId) -> Option<Password> {
        let mut slot = self.fresh_slot()?;
        let cached = slot.as_ref()?;
        if &cached.profile_id != profile_id {
            debug!(profile_id = %profile_id, "Password cache entry belongs to another profile");
            *slot = None;
            return None;
        }
        Some(cached.password.clone())
    }

    /// Wipe the slot.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }

    /// True if a non-expired password is cached for any profile.
    pub fn is_populated(&self) -> bool {
        self.fresh_slot().is_some_and(|slot| slot.is_some())
    }
}

impl Drop for PasswordCache {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_is_empty(cache: &PasswordCache) -> bool {
        cache.slot.lock().unwrap().is_none()
    }

    #[test]
    fn test_store_and_get() {
        let cache = PasswordCache::new(Duration::from_secs(60));
        let profile = ProfileId::generate();

        cache.store(&profile, &Password::new("secret"));
        assert_eq!(cache.get(&profile).unwrap().expose(), "secret");
        assert!(cache.is_populated());
    }

    #[test]
    fn test_other_profile_clears_slot() {
        let cache = PasswordCache::new(Duration::from_secs(60));
        let alice = ProfileId::generate();
        let bob = ProfileId::generate();

        cache.store(&alice, &Password::new("secret"));
        assert!(cache.get(&bob).is_none());
        assert!(cache.get(&alice).is_none());
    }

    #[test]
    fn test_expired_entry_is_wiped() {
        let cache = PasswordCache::new(Duration::from_millis(0));
        let profile = ProfileId::generate();

        cache.store(&profile, &Password::new("secret"));
        assert!(cache.get(&profile).is_none());
        assert!(!cache.is_populated());
    }

    #[test]
    fn test_is_populated_wipes_expired_entry() {
        let cache = PasswordCache::new(Duration::from_millis(0));
        cache.store(&ProfileId::generate(), &Password::new("secret"));

        assert!(!cache.is_populated());
        assert!(slot_is_empty(&cache));
    }

    #[tokio::test]
    async fn test_entry_wiped_when_ttl_passes_unread() {
        let cache = PasswordCache::new(Duration::from_millis(20));
        cache.store(&ProfileId::generate(), &Password::new("secret"));
        assert!(!slot_is_empty(&cache));

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(slot_is_empty(&cache));
    }

    #[tokio::test]
    async fn test_stale_timer_keeps_newer_entry() {
        let cache = PasswordCache::new(Duration::from_millis(200));
        let profile = ProfileId::generate();
        cache.store(&profile, &Password::new("first"));

        tokio::time::sleep(Duration::from_millis(120)).await;
        cache.store(&profile, &Password::new("second"));
        tokio::time::sleep(Duration::from_millis(120)).await;

        // The first timer has fired; the second entry is still within its lifetime.
        assert!(!slot_is_empty(&cache));
        assert_eq!(cache.get(&profile).unwrap().expose(), "second");
    }

    #[test]
    fn test_clear() {
        let cache = PasswordCache::new(Duration::from_secs(60));
        let profile = ProfileId::generate();

        cache.store(&profile, &Password::new("secret"));
        cache.clear();
        assert!(cache.get(&profile).is_none());
    }
}
