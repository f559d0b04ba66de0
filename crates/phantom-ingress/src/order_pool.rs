//! One side of one pair's order pool.
//!
//! Admitted orders wait here until a round freezes the pool. Orders taken
//! by a round keep their slot until the round hands them back, so resting
//! and in-flight orders together never exceed capacity. The pool keeps
//! two running aggregates: the sum of the orders' amount commitments and
//! the homomorphic sum of their encrypted remainders. Neither reveals
//! anything on its own.

use chrono::{DateTime, Utc};
use phantom_crypto::{Ciphertext, Commitment, VrfOutput};
use phantom_types::{EncryptedOrder, OrderId, OrderStatus, PhantomError, Result, Side};

#[derive(Debug)]
pub struct OrderPool {
    side: Side,
    /// Orders in arrival order.
    orders: Vec<EncryptedOrder>,
    capacity: usize,
    /// Orders taken by the round in flight and not yet handed back.
    in_flight: usize,
    aggregate_amount_commitment: Commitment,
    aggregate_remaining: Ciphertext,
    /// Output that shuffled the last snapshot taken from this pool.
    vrf_seed: Option<VrfOutput>,
}

impl OrderPool {
    #[must_use]
    pub fn new(side: Side, capacity: usize) -> Self {
        Self {
            side,
            orders: Vec::new(),
            capacity,
            in_flight: 0,
            aggregate_amount_commitment: Commitment::zero(),
            aggregate_remaining: Ciphertext::zero(),
            vrf_seed: None,
        }
    }

    /// Fail unless one more order fits beside the resting and in-flight ones.
    ///
    /// # Errors
    /// `PoolFull` at capacity.
    pub fn ensure_capacity(&self) -> Result<()> {
        if self.orders.len() + self.in_flight >= self.capacity {
            return Err(PhantomError::PoolFull {
                side: self.side,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Append a newly admitted order. Returns its zero-based position.
    ///
    /// # Errors
    /// - `PoolFull` at capacity
    /// - `Internal` if the order belongs to the other side
    pub fn push(&mut self, order: EncryptedOrder) -> Result<usize> {
        self.ensure_capacity()?;
        self.insert(order)
    }

    /// Put back an order a round took. It reuses the slot it held while in
    /// flight, so no capacity check applies.
    ///
    /// # Errors
    /// `Internal` if the order belongs to the other side.
    pub fn restore(&mut self, order: EncryptedOrder) -> Result<usize> {
        let position = self.insert(order)?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Ok(position)
    }

    /// Free the slots of in-flight orders that did not come back.
    pub fn end_round(&mut self) {
        self.in_flight = 0;
    }

    fn insert(&mut self, order: EncryptedOrder) -> Result<usize> {
        if order.side != self.side {
            return Err(PhantomError::Internal(format!(
                "{} order {} pushed into {} pool",
                order.side, order.id, self.side
            )));
        }
        self.aggregate_amount_commitment =
            self.aggregate_amount_commitment + order.solvency_proof.amount_commitment;
        self.aggregate_remaining += order.remaining_amount;
        self.orders.push(order);
        Ok(self.orders.len() - 1)
    }

    /// Remove one order by id.
    pub fn remove(&mut self, id: &OrderId) -> Option<EncryptedOrder> {
        let pos = self.orders.iter().position(|o| o.id == *id)?;
        let order = self.orders.remove(pos);
        self.aggregate_amount_commitment =
            self.aggregate_amount_commitment - order.solvency_proof.amount_commitment;
        self.aggregate_remaining -= order.remaining_amount;
        Some(order)
    }

    #[must_use]
    pub fn get(&self, id: &OrderId) -> Option<&EncryptedOrder> {
        self.orders.iter().find(|o| o.id == *id)
    }

    /// Drop orders whose expiry has passed, marking them `Expired`.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<EncryptedOrder> {
        let ids: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|o| o.is_expired(now))
            .map(|o| o.id)
            .collect();
        ids.iter()
            .filter_map(|id| self.remove(id))
            .map(|mut o| {
                o.status = OrderStatus::Expired;
                o
            })
            .collect()
    }

    /// Take every order for a round shuffled by `seed`, leaving the pool
    /// empty. The taken orders hold their slots until [`OrderPool::end_round`].
    pub fn take_all(&mut self, seed: VrfOutput) -> Vec<EncryptedOrder> {
        self.vrf_seed = Some(seed);
        self.aggregate_amount_commitment = Commitment::zero();
        self.aggregate_remaining = Ciphertext::zero();
        let taken = std::mem::take(&mut self.orders);
        self.in_flight = taken.len();
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncryptedOrder> {
        self.orders.iter()
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Orders out with the current round.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Sum of the amount commitments of every resting order.
    #[must_use]
    pub fn aggregate_amount_commitment(&self) -> Commitment {
        self.aggregate_amount_commitment
    }

    /// Encrypted sum of every resting order's unfilled amount.
    #[must_use]
    pub fn aggregate_remaining(&self) -> Ciphertext {
        self.aggregate_remaining
    }

    #[must_use]
    pub fn vrf_seed(&self) -> Option<VrfOutput> {
        self.vrf_seed
    }
}
