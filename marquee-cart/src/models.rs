use chrono::{DateTime, Utc};
use marquee_catalog::Reservation;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Cart status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Open,
    /// Seats are being reserved for an order; edits are refused.
    CheckingOut,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Open => "open",
            CartStatus::CheckingOut => "checking_out",
        }
    }
}

impl FromStr for CartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CartStatus::Open),
            "checking_out" => Ok(CartStatus::CheckingOut),
            other => Err(format!("unknown cart status '{}'", other)),
        }
    }
}

/// A user's pending selection. One per user, destroyed once an order exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: String,
    pub lines: Vec<CartLine>,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            lines: Vec::new(),
            status: CartStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, showing_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.showing_id == showing_id)
    }

    pub fn total_seats(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub showing_id: Uuid,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// The cart as it was when checkout reserved its seats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: Uuid,
    pub user_id: String,
    pub lines: Vec<SnapshotLine>,
    pub taken_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.lines.iter().map(|l| &l.reservation)
    }

    /// Earliest hold deadline across all lines.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lines.iter().map(|l| l.reservation.expires_at).min()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub showing_id: Uuid,
    pub quantity: u32,
    pub reservation: Reservation,
}
