//! Value objects for the matter domain.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an attorney.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttorneyId(Uuid);

impl AttorneyId {
    /// Creates a new random attorney ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an attorney ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AttorneyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttorneyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AttorneyId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as a bare integer number of cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new Money amount from whole currency units.
    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (remainder after units).
    pub fn cents_part(&self) -> i64 {
        self.0.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Sum of two amounts, or None on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-${}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.units(), self.cents_part())
        }
    }
}
