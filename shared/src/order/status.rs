//! Order status lifecycle
//!
//! Statuses move forward along
//! `pending → cooking → packing → cooked → inDelivery → completed`, or divert
//! to `canceled` from any non-terminal status. Which forward steps staff may
//! trigger from the display is configuration ([`TransitionTable`]), and so is
//! which statuses a board column shows ([`StatusFilter`]).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Order status
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Cooking,
    Packing,
    Cooked,
    InDelivery,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Cooking,
        OrderStatus::Packing,
        OrderStatus::Cooked,
        OrderStatus::InDelivery,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    /// Position on the forward path. `None` for `Canceled`, which sits off it.
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Cooking => Some(1),
            Self::Packing => Some(2),
            Self::Cooked => Some(3),
            Self::InDelivery => Some(4),
            Self::Completed => Some(5),
            Self::Canceled => None,
        }
    }

    /// Completed and canceled orders never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Whether an order currently at `self` may be observed at `next`
    ///
    /// Staying put is always allowed. Skipping forward is allowed (the
    /// backend may advance an order several steps between two events).
    pub fn can_become(self, next: OrderStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next > current,
            (None, Some(_)) => false,
        }
    }

    /// Wire name, as used in JSON bodies
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Cooking => "cooking",
            Self::Packing => "packing",
            Self::Cooked => "cooked",
            Self::InDelivery => "inDelivery",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// Transition Table
// ============================================================================

/// Forward-only table of status changes staff may request
///
/// Each status has a set of allowed targets and optionally one primary
/// target, which is what a single tap on an order card advances to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    allowed: BTreeMap<OrderStatus, BTreeSet<OrderStatus>>,
    primary: BTreeMap<OrderStatus, OrderStatus>,
}

impl TransitionTable {
    /// Empty table; nothing is allowed
    pub fn empty() -> Self {
        Self {
            allowed: BTreeMap::new(),
            primary: BTreeMap::new(),
        }
    }

    /// Allow `from → to`
    ///
    /// Backward steps and steps out of a terminal status are ignored, so a
    /// misconfigured table can never move an order backward.
    pub fn allow(mut self, from: OrderStatus, to: OrderStatus) -> Self {
        if from != to && from.can_become(to) {
            self.allowed.entry(from).or_default().insert(to);
        }
        self
    }

    /// Allow `from → to` and make it the primary step out of `from`
    pub fn primary(mut self, from: OrderStatus, to: OrderStatus) -> Self {
        self = self.allow(from, to);
        if self.allows(from, to) {
            self.primary.insert(from, to);
        }
        self
    }

    /// Allow cancellation from every non-terminal status
    pub fn with_cancellation(mut self) -> Self {
        for status in OrderStatus::ALL {
            if !status.is_terminal() {
                self = self.allow(status, OrderStatus::Canceled);
            }
        }
        self
    }

    /// Whether `from → to` is a legal request
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        self.allowed
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// Primary next status, if any
    pub fn next_step(&self, from: OrderStatus) -> Option<OrderStatus> {
        self.primary.get(&from).copied()
    }

    /// All legal targets out of `from`
    pub fn targets(&self, from: OrderStatus) -> impl Iterator<Item = OrderStatus> + '_ {
        self.allowed.get(&from).into_iter().flatten().copied()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        use OrderStatus::*;
        Self::empty()
            .primary(Pending, Cooking)
            .primary(Cooking, Packing)
            .allow(Cooking, Cooked)
            .primary(Packing, Cooked)
            .primary(Cooked, Completed)
            .allow(Cooked, InDelivery)
            .primary(InDelivery, Completed)
            .with_cancellation()
    }
}

// ============================================================================
// Status Filter
// ============================================================================

/// A set of statuses a board column displays
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusFilter {
    statuses: BTreeSet<OrderStatus>,
}

impl StatusFilter {
    pub fn new(statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Orders the kitchen still works on
    pub fn in_progress() -> Self {
        Self::new([
            OrderStatus::Pending,
            OrderStatus::Cooking,
            OrderStatus::Packing,
        ])
    }

    /// Orders waiting to leave the kitchen
    pub fn ready() -> Self {
        Self::new([OrderStatus::Cooked])
    }

    pub fn matches(&self, status: OrderStatus) -> bool {
        self.statuses.contains(&status)
    }
}
