//! Actor identity recorded on mutations.

use serde::{Deserialize, Serialize};

use crate::id::ActorId;

/// An already-authenticated administrative actor.
///
/// Authentication happens outside this engine; we only record who acted on
/// ledger entries and history records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: ActorId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}
