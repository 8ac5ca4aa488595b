//! Order lifecycle state machine.
//!
//! The transition table below is the single source of truth for which status
//! changes are legal. Everything else (editability, shipment preconditions)
//! derives from it or from the status itself.

use serde::{Deserialize, Serialize};

use shopkeep_core::{DomainError, DomainResult};

/// Order status lifecycle.
///
/// Forward path: pending → confirmed → processing → shipping → completed.
/// `cancelled` and `refunded` are reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipping,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// All statuses, for exhaustive checks.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal transition targets for `current`.
///
/// Self-transitions are absent by construction; no backward transitions
/// exist except into `cancelled`/`refunded`.
pub fn allowed_transitions(current: OrderStatus) -> &'static [OrderStatus] {
    match current {
        OrderStatus::Pending => &[
            OrderStatus::Confirmed,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Confirmed => &[
            OrderStatus::Processing,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Processing => &[
            OrderStatus::Shipping,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Shipping => &[
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ],
        OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded => &[],
    }
}

/// Check that `current → target` is an edge of the lifecycle graph.
///
/// The error reports the full allowed target set for `current` so callers
/// can surface it with field-level detail.
pub fn validate_transition(current: OrderStatus, target: OrderStatus) -> DomainResult<()> {
    let allowed = allowed_transitions(current);
    if allowed.contains(&target) {
        return Ok(());
    }

    Err(DomainError::InvalidTransition {
        from: current.as_str().to_string(),
        to: target.as_str().to_string(),
        allowed: allowed
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Orders accept field edits only while pending or confirmed.
pub fn can_edit(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Pending | OrderStatus::Confirmed)
}

/// Guard used by every mutation orchestrator before touching order fields.
pub fn ensure_editable(status: OrderStatus) -> DomainResult<()> {
    if can_edit(status) {
        Ok(())
    } else {
        Err(DomainError::OrderNotEditable(status.as_str().to_string()))
    }
}
