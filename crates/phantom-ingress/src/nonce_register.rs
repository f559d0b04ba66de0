//! Per-trader nonce register for one trading pair.
//!
//! Each trader's nonces must strictly increase, so only the highest one
//! seen needs remembering. The register is bounded: when full, it evicts
//! the least recently active trader whose newest order has already expired.
//! A trader with a live order is never evicted, otherwise that order could
//! be replayed.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use phantom_types::{PhantomError, Result, TraderId};

#[derive(Debug, Clone, Copy)]
struct NonceEntry {
    highest: u64,
    /// Latest expiry among this trader's admitted orders.
    live_until: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NonceRegister {
    entries: HashMap<TraderId, NonceEntry>,
    /// Least recently active first.
    recency: VecDeque<TraderId>,
    capacity: usize,
}

impl NonceRegister {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: VecDeque::new(),
            capacity,
        }
    }

    /// Check a nonce without recording it.
    ///
    /// # Errors
    /// `DuplicateNonce` if `nonce` is not above the trader's highest so far.
    pub fn check(&self, trader: &TraderId, nonce: u64) -> Result<()> {
        match self.entries.get(trader) {
            Some(entry) if nonce <= entry.highest => Err(PhantomError::DuplicateNonce {
                trader: *trader,
                nonce,
            }),
            _ => Ok(()),
        }
    }

    /// Check and record a nonce for an order living until `expires_at`.
    ///
    /// # Errors
    /// - `DuplicateNonce` per [`Self::check`]
    /// - `NonceRegisterFull` if the trader is new and no entry is evictable
    pub fn record(
        &mut self,
        trader: TraderId,
        nonce: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.check(&trader, nonce)?;

        if let Some(entry) = self.entries.get_mut(&trader) {
            entry.highest = nonce;
            entry.live_until = entry.live_until.max(expires_at);
            self.touch(trader);
            return Ok(());
        }

        if self.entries.len() >= self.capacity && !self.evict_one(now) {
            return Err(PhantomError::NonceRegisterFull {
                capacity: self.capacity,
            });
        }
        self.entries.insert(
            trader,
            NonceEntry {
                highest: nonce,
                live_until: expires_at,
            },
        );
        self.recency.push_back(trader);
        Ok(())
    }

    /// Highest nonce recorded for a trader.
    #[must_use]
    pub fn highest(&self, trader: &TraderId) -> Option<u64> {
        self.entries.get(trader).map(|e| e.highest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, trader: TraderId) {
        if let Some(pos) = self.recency.iter().position(|t| *t == trader) {
            self.recency.remove(pos);
        }
        self.recency.push_back(trader);
    }

    fn evict_one(&mut self, now: DateTime<Utc>) -> bool {
        let victim = self.recency.iter().position(|t| {
            self.entries
                .get(t)
                .is_some_and(|e| e.live_until <= now)
        });
        let Some(pos) = victim else {
            return false;
        };
        if let Some(trader) = self.recency.remove(pos) {
            self.entries.remove(&trader);
            tracing::debug!(trader = %trader, "nonce register evicted idle trader");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn trader(b: u8) -> TraderId {
        TraderId([b; 32])
    }

    #[test]
    fn nonces_must_strictly_increase() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        let mut reg = NonceRegister::new(10);
        reg.record(trader(1), 5, later, now).unwrap();

        let err = reg.record(trader(1), 5, later, now).unwrap_err();
        assert!(matches!(err, PhantomError::DuplicateNonce { nonce: 5, .. }));
        assert!(reg.record(trader(1), 3, later, now).is_err());

        reg.record(trader(1), 6, later, now).unwrap();
        assert_eq!(reg.highest(&trader(1)), Some(6));
    }

    #[test]
    fn traders_are_independent() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        let mut reg = NonceRegister::new(10);
        reg.record(trader(1), 1, later, now).unwrap();
        reg.record(trader(2), 1, later, now).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn full_register_evicts_idle_trader() {
        let now = Utc::now();
        let mut reg = NonceRegister::new(2);
        reg.record(trader(1), 1, now - Duration::seconds(1), now - Duration::minutes(1))
            .unwrap();
        reg.record(trader(2), 1, now + Duration::minutes(5), now).unwrap();

        reg.record(trader(3), 1, now + Duration::minutes(5), now).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.highest(&trader(1)).is_none());
        assert_eq!(reg.highest(&trader(2)), Some(1));
    }

    #[test]
    fn full_register_never_drops_live_entries() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        let mut reg = NonceRegister::new(2);
        reg.record(trader(1), 1, later, now).unwrap();
        reg.record(trader(2), 1, later, now).unwrap();

        let err = reg.record(trader(3), 1, later, now).unwrap_err();
        assert!(matches!(err, PhantomError::NonceRegisterFull { capacity: 2 }));
        // Known traders still get through.
        reg.record(trader(1), 2, later, now).unwrap();
    }

    #[test]
    fn eviction_prefers_least_recently_active() {
        let now = Utc::now();
        let past = now - Duration::seconds(1);
        let mut reg = NonceRegister::new(2);
        reg.record(trader(1), 1, past, now).unwrap();
        reg.record(trader(2), 1, past, now).unwrap();
        reg.record(trader(1), 2, past, now).unwrap();

        reg.record(trader(3), 1, now + Duration::minutes(1), now).unwrap();
        assert!(reg.highest(&trader(2)).is_none());
        assert_eq!(reg.highest(&trader(1)), Some(2));
    }
}
