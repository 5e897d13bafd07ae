use chrono::{DateTime, Duration, Utc};
use marquee_core::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A temporary hold on seats, handed out by [`InventoryLedger::reserve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub showing_id: Uuid,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Held,
    Committed,
    Released,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub showing_id: Uuid,
    pub capacity: u32,
    pub committed: u32,
    pub held: u32,
    pub available: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub expired: Vec<Reservation>,
    pub pruned: usize,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long seats stay held before an unpaid reservation lapses.
    pub hold_duration: Duration,
    /// How long released and expired records are kept so that late
    /// `commit`/`release` calls still get a precise answer. Committed records
    /// are kept for as long as the ledger lives.
    pub tombstone_retention: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(15),
            tombstone_retention: Duration::hours(24),
        }
    }
}

#[derive(Debug)]
struct Hold {
    quantity: u32,
    expires_at: DateTime<Utc>,
    state: ReservationState,
    settled_at: Option<DateTime<Utc>>,
}

/// Seat counters for one showing. Only ever touched under its own mutex.
#[derive(Debug)]
struct ShowingSeats {
    showing_id: Uuid,
    capacity: u32,
    committed: u32,
    held: u32,
    holds: HashMap<ReservationId, Hold>,
}

impl ShowingSeats {
    fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.committed.saturating_add(self.held))
    }

    fn availability(&self) -> Availability {
        Availability {
            showing_id: self.showing_id,
            capacity: self.capacity,
            committed: self.committed,
            held: self.held,
            available: self.available(),
        }
    }

    fn reservation(&self, id: ReservationId, hold: &Hold) -> Reservation {
        Reservation {
            id,
            showing_id: self.showing_id,
            quantity: hold.quantity,
            expires_at: hold.expires_at,
        }
    }

    fn ensure_fits(&self, quantity: u32) -> Result<(), InventoryError> {
        let wanted = u64::from(self.committed) + u64::from(self.held) + u64::from(quantity);
        if wanted > u64::from(self.capacity) {
            return Err(InventoryError::CapacityExceeded {
                showing_id: self.showing_id,
                requested: quantity,
                available: self.available(),
            });
        }
        Ok(())
    }

    /// Lapse every hold whose deadline has passed. Returns what lapsed.
    fn expire_overdue(&mut self, now: DateTime<Utc>) -> Vec<Reservation> {
        let mut expired = Vec::new();
        for (id, hold) in self.holds.iter_mut() {
            if hold.state == ReservationState::Held && hold.expires_at <= now {
                hold.state = ReservationState::Expired;
                hold.settled_at = Some(now);
                self.held = self.held.saturating_sub(hold.quantity);
                expired.push(Reservation {
                    id: *id,
                    showing_id: self.showing_id,
                    quantity: hold.quantity,
                    expires_at: hold.expires_at,
                });
            }
        }
        expired
    }

    fn release(&mut self, id: ReservationId, now: DateTime<Utc>) -> Result<(), InventoryError> {
        let hold = self
            .holds
            .get_mut(&id)
            .ok_or(InventoryError::ReservationNotFound(id))?;

        match hold.state {
            ReservationState::Held => {
                hold.state = ReservationState::Released;
                hold.settled_at = Some(now);
                self.held = self.held.saturating_sub(hold.quantity);
                Ok(())
            }
            ReservationState::Released | ReservationState::Expired => Ok(()),
            ReservationState::Committed => Err(InventoryError::AlreadyCommitted(id)),
        }
    }

    fn commit(&mut self, id: ReservationId, now: DateTime<Utc>) -> Result<Reservation, InventoryError> {
        let hold = self
            .holds
            .get_mut(&id)
            .ok_or(InventoryError::ReservationNotFound(id))?;

        match hold.state {
            ReservationState::Held if hold.expires_at <= now => {
                hold.state = ReservationState::Expired;
                hold.settled_at = Some(now);
                self.held = self.held.saturating_sub(hold.quantity);
                Err(InventoryError::ReservationExpired(id))
            }
            ReservationState::Held => {
                hold.state = ReservationState::Committed;
                hold.settled_at = Some(now);
                self.held = self.held.saturating_sub(hold.quantity);
                self.committed = self.committed.saturating_add(hold.quantity);
                let quantity = hold.quantity;
                let expires_at = hold.expires_at;
                Ok(Reservation { id, showing_id: self.showing_id, quantity, expires_at })
            }
            ReservationState::Committed => {
                let quantity = hold.quantity;
                let expires_at = hold.expires_at;
                Ok(Reservation { id, showing_id: self.showing_id, quantity, expires_at })
            }
            ReservationState::Expired => Err(InventoryError::ReservationExpired(id)),
            ReservationState::Released => Err(InventoryError::ReservationReleased(id)),
        }
    }

    /// Give seats back regardless of whether they were held or sold.
    fn restore(&mut self, id: ReservationId, now: DateTime<Utc>) -> Result<(), InventoryError> {
        let hold = self
            .holds
            .get_mut(&id)
            .ok_or(InventoryError::ReservationNotFound(id))?;

        match hold.state {
            ReservationState::Held => {
                self.held = self.held.saturating_sub(hold.quantity);
            }
            ReservationState::Committed => {
                self.committed = self.committed.saturating_sub(hold.quantity);
            }
            ReservationState::Released | ReservationState::Expired => return Ok(()),
        }
        hold.state = ReservationState::Released;
        hold.settled_at = Some(now);
        Ok(())
    }

    fn prune(&mut self, cutoff: DateTime<Utc>) -> Vec<ReservationId> {
        let pruned: Vec<ReservationId> = self
            .holds
            .iter()
            .filter(|(_, hold)| hold.state != ReservationState::Committed)
            .filter(|(_, hold)| hold.settled_at.is_some_and(|at| at <= cutoff))
            .map(|(id, _)| *id)
            .collect();
        for id in &pruned {
            self.holds.remove(id);
        }
        pruned
    }
}

/// Seat inventory for every showing.
///
/// Each showing's counters sit behind their own mutex, so reservations on
/// different showings never contend while two requests for the last seat of
/// the same showing are strictly ordered. Expiry is applied lazily whenever a
/// showing is touched and eagerly by [`InventoryLedger::sweep`].
pub struct InventoryLedger {
    showings: RwLock<HashMap<Uuid, Arc<Mutex<ShowingSeats>>>>,
    reservations: RwLock<HashMap<ReservationId, Uuid>>,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl InventoryLedger {
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            showings: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn hold_duration(&self) -> Duration {
        self.config.hold_duration
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start tracking a showing. `committed` seeds seats already sold.
    pub async fn register_showing(
        &self,
        showing_id: Uuid,
        capacity: u32,
        committed: u32,
    ) -> Result<(), InventoryError> {
        if committed > capacity {
            return Err(InventoryError::InvalidCapacity { capacity, committed });
        }

        let mut showings = self.showings.write().await;
        if showings.contains_key(&showing_id) {
            return Err(InventoryError::ShowingAlreadyRegistered(showing_id));
        }

        showings.insert(
            showing_id,
            Arc::new(Mutex::new(ShowingSeats {
                showing_id,
                capacity,
                committed,
                held: 0,
                holds: HashMap::new(),
            })),
        );
        info!("Showing {} registered with {} seats ({} sold)", showing_id, capacity, committed);
        Ok(())
    }

    pub async fn is_registered(&self, showing_id: Uuid) -> bool {
        self.showings.read().await.contains_key(&showing_id)
    }

    async fn seats(&self, showing_id: Uuid) -> Result<Arc<Mutex<ShowingSeats>>, InventoryError> {
        self.showings
            .read()
            .await
            .get(&showing_id)
            .cloned()
            .ok_or(InventoryError::ShowingNotFound(showing_id))
    }

    async fn locate(&self, id: ReservationId) -> Result<Arc<Mutex<ShowingSeats>>, InventoryError> {
        let showing_id = self
            .reservations
            .read()
            .await
            .get(&id)
            .copied()
            .ok_or(InventoryError::ReservationNotFound(id))?;
        self.seats(showing_id).await
    }

    /// Hold `quantity` seats until `now + hold_duration`.
    pub async fn reserve(&self, showing_id: Uuid, quantity: u32) -> Result<Reservation, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let seats = self.seats(showing_id).await?;
        let now = self.clock.now();

        let reservation = {
            let mut seats = seats.lock().await;
            seats.expire_overdue(now);
            seats.ensure_fits(quantity)?;

            let id = ReservationId::new();
            let expires_at = now + self.config.hold_duration;
            seats.held += quantity;
            seats.holds.insert(
                id,
                Hold { quantity, expires_at, state: ReservationState::Held, settled_at: None },
            );
            Reservation { id, showing_id, quantity, expires_at }
        };

        self.reservations.write().await.insert(reservation.id, showing_id);
        debug!(
            reservation_id = %reservation.id,
            showing_id = %showing_id,
            quantity,
            "Seats held"
        );
        Ok(reservation)
    }

    /// Put held seats back. Releasing twice, or releasing a lapsed hold, is a no-op.
    pub async fn release(&self, id: ReservationId) -> Result<(), InventoryError> {
        let seats = self.locate(id).await?;
        let now = self.clock.now();
        let mut seats = seats.lock().await;
        seats.expire_overdue(now);
        seats.release(id, now)?;
        debug!(reservation_id = %id, "Reservation released");
        Ok(())
    }

    /// Turn a hold into a permanent deduction. Idempotent per reservation id.
    pub async fn commit(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        let seats = self.locate(id).await?;
        let now = self.clock.now();
        let mut seats = seats.lock().await;
        let reservation = seats.commit(id, now)?;
        debug!(reservation_id = %id, "Reservation committed");
        Ok(reservation)
    }

    /// Return seats to the pool whether they were held or already committed.
    pub async fn restore(&self, id: ReservationId) -> Result<(), InventoryError> {
        let seats = self.locate(id).await?;
        let now = self.clock.now();
        let mut seats = seats.lock().await;
        seats.restore(id, now)?;
        debug!(reservation_id = %id, "Reservation restored to pool");
        Ok(())
    }

    /// Hand back sold seats whose reservation record is no longer known, e.g.
    /// seats seeded through `register_showing` after a restart.
    pub async fn release_committed_seats(&self, showing_id: Uuid, quantity: u32) -> Result<(), InventoryError> {
        let seats = self.seats(showing_id).await?;
        let mut seats = seats.lock().await;
        if quantity > seats.committed {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        seats.committed -= quantity;
        info!("Returned {} sold seats to showing {}", quantity, showing_id);
        Ok(())
    }

    /// Re-create a hold that existed before a restart. No-op if already known.
    pub async fn rehold(&self, reservation: &Reservation) -> Result<(), InventoryError> {
        if reservation.quantity == 0 {
            return Err(InventoryError::InvalidQuantity(0));
        }
        let seats = self.seats(reservation.showing_id).await?;
        let now = self.clock.now();

        {
            let mut seats = seats.lock().await;
            if seats.holds.contains_key(&reservation.id) {
                return Ok(());
            }
            if reservation.expires_at <= now {
                return Err(InventoryError::ReservationExpired(reservation.id));
            }
            seats.expire_overdue(now);
            seats.ensure_fits(reservation.quantity)?;
            seats.held += reservation.quantity;
            seats.holds.insert(
                reservation.id,
                Hold {
                    quantity: reservation.quantity,
                    expires_at: reservation.expires_at,
                    state: ReservationState::Held,
                    settled_at: None,
                },
            );
        }

        self.reservations
            .write()
            .await
            .insert(reservation.id, reservation.showing_id);
        Ok(())
    }

    pub async fn state(&self, id: ReservationId) -> Result<ReservationState, InventoryError> {
        let seats = self.locate(id).await?;
        let now = self.clock.now();
        let mut seats = seats.lock().await;
        seats.expire_overdue(now);
        seats
            .holds
            .get(&id)
            .map(|hold| hold.state)
            .ok_or(InventoryError::ReservationNotFound(id))
    }

    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation, InventoryError> {
        let seats = self.locate(id).await?;
        let seats = seats.lock().await;
        let hold = seats.holds.get(&id).ok_or(InventoryError::ReservationNotFound(id))?;
        Ok(seats.reservation(id, hold))
    }

    pub async fn availability(&self, showing_id: Uuid) -> Result<Availability, InventoryError> {
        let seats = self.seats(showing_id).await?;
        let now = self.clock.now();
        let mut seats = seats.lock().await;
        seats.expire_overdue(now);
        Ok(seats.availability())
    }

    /// Lapse overdue holds on every showing and drop settled records older
    /// than the retention window.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let cutoff = now - self.config.tombstone_retention;
        let all: Vec<Arc<Mutex<ShowingSeats>>> =
            self.showings.read().await.values().cloned().collect();

        let mut report = SweepReport::default();
        let mut pruned_ids = Vec::new();

        for seats in all {
            let mut seats = seats.lock().await;
            report.expired.extend(seats.expire_overdue(now));
            pruned_ids.extend(seats.prune(cutoff));
        }

        if !pruned_ids.is_empty() {
            let mut index = self.reservations.write().await;
            for id in &pruned_ids {
                index.remove(id);
            }
        }
        report.pruned = pruned_ids.len();

        if !report.expired.is_empty() || report.pruned > 0 {
            info!(
                "Inventory sweep: {} holds expired, {} settled records pruned",
                report.expired.len(),
                report.pruned
            );
        }
        report
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Showing not found: {0}")]
    ShowingNotFound(Uuid),

    #[error("Showing already registered: {0}")]
    ShowingAlreadyRegistered(Uuid),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("Capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded {
        showing_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Reservation expired: {0}")]
    ReservationExpired(ReservationId),

    #[error("Reservation was released: {0}")]
    ReservationReleased(ReservationId),

    #[error("Reservation already committed: {0}")]
    AlreadyCommitted(ReservationId),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Invalid capacity: {committed} seats sold exceeds capacity {capacity}")]
    InvalidCapacity { capacity: u32, committed: u32 },
}
