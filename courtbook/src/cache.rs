//! Read-through cache for customer booking lists.
//!
//! Injected through [`crate::AppState`] rather than held as a module-level
//! singleton so tests can construct isolated instances. Entries expire after
//! a configurable TTL and are explicitly invalidated whenever the reconciler
//! writes an outcome for the customer.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::store::models::Booking;

/// Bookings-by-customer cache, keyed by customer email (guest checkouts have
/// no user id, so email is the stable key).
#[derive(Clone)]
pub struct BookingCache {
    inner: Cache<String, Arc<Vec<Booking>>>,
}

impl BookingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().time_to_live(ttl).max_capacity(10_000).build(),
        }
    }

    pub async fn get(&self, email: &str) -> Option<Arc<Vec<Booking>>> {
        self.inner.get(email).await
    }

    pub async fn insert(&self, email: &str, bookings: Vec<Booking>) {
        self.inner.insert(email.to_string(), Arc::new(bookings)).await;
    }

    pub async fn invalidate(&self, email: &str) {
        self.inner.invalidate(email).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{Booking, Customer, LessonCategory, Location, Slot, SlotCreate};
    use chrono::{TimeZone, Utc};

    fn booking(email: &str) -> Booking {
        let slot = Slot::new(SlotCreate {
            start: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            capacity: 1,
            price: 40,
            location: Location::CentreCourt,
            category: LessonCategory::Private,
        });
        Booking::confirmed(
            &slot,
            "cs_1",
            &Customer {
                user_id: None,
                email: email.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_get_insert_invalidate() {
        let cache = BookingCache::new(Duration::from_secs(300));

        assert!(cache.get("a@example.com").await.is_none());

        cache.insert("a@example.com", vec![booking("a@example.com")]).await;
        let cached = cache.get("a@example.com").await.unwrap();
        assert_eq!(cached.len(), 1);

        // Invalidation only affects the targeted customer
        cache.insert("b@example.com", vec![booking("b@example.com")]).await;
        cache.invalidate("a@example.com").await;
        assert!(cache.get("a@example.com").await.is_none());
        assert!(cache.get("b@example.com").await.is_some());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = BookingCache::new(Duration::from_millis(50));
        cache.insert("a@example.com", vec![booking("a@example.com")]).await;
        assert!(cache.get("a@example.com").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("a@example.com").await.is_none());
    }
}
