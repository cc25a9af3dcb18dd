// Per-vendor politeness. One process-global token map: a request to a
// vendor must wait until `min_delay` has passed since the last request any
// worker made to that vendor. Retry-After penalties push the next slot out.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::types::Vendor;

#[derive(Debug)]
pub struct VendorRateLimiter {
    min_delay: Duration,
    next_slot: Mutex<HashMap<Vendor, Instant>>,
}

impl VendorRateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Block until a request to `vendor` is allowed, then consume the slot.
    pub async fn acquire(&self, vendor: Vendor) {
        loop {
            let wait = {
                let mut slots = self.next_slot.lock().await;
                let now = Instant::now();
                match slots.get(&vendor) {
                    Some(slot) if *slot > now => Some(*slot - now),
                    _ => {
                        slots.insert(vendor, now + self.min_delay);
                        None
                    }
                }
            };
            match wait {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return,
            }
        }
    }

    /// Honour a vendor's Retry-After by pushing the next slot out.
    pub async fn penalize(&self, vendor: Vendor, delay: Duration) {
        let mut slots = self.next_slot.lock().await;
        let proposed = Instant::now() + delay;
        let slot = slots.entry(vendor).or_insert(proposed);
        if *slot < proposed {
            *slot = proposed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn acquire_spaces_out_requests() {
        let limiter = VendorRateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();
        limiter.acquire(Vendor::Granicus).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(Vendor::Granicus).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn vendors_do_not_contend_with_each_other() {
        let limiter = VendorRateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();
        limiter.acquire(Vendor::Granicus).await;
        limiter.acquire(Vendor::Legistar).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn penalties_defer_the_next_slot() {
        let limiter = VendorRateLimiter::new(Duration::from_secs(3));
        limiter.acquire(Vendor::Granicus).await;
        limiter.penalize(Vendor::Granicus, Duration::from_secs(30)).await;
        let start = Instant::now();
        limiter.acquire(Vendor::Granicus).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
