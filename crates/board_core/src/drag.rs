//! Drag-and-drop gesture state machine, independent of any UI toolkit.
//!
//! `Idle -> Dragging -> ResolvingDrop -> Idle`. A drop resolves to exactly one
//! [`DropOutcome`]; applying it is the board's job.

use shared::domain::{Risk, RiskId, RiskStatus};
use tracing::debug;

use crate::error::BoardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSource {
    Pointer,
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Column(RiskStatus),
    Card(RiskId),
    /// Dropped outside any droppable area.
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        risk_id: RiskId,
        source: DragSource,
    },
    ResolvingDrop {
        risk_id: RiskId,
        target: DropTarget,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The target did not map to a column, or the dragged risk disappeared.
    NoTarget,
    /// Dropped into the column the risk already sits in.
    Unchanged { risk_id: RiskId },
    Transition {
        risk_id: RiskId,
        from: RiskStatus,
        to: RiskStatus,
    },
}

#[derive(Debug)]
pub struct DragController {
    state: DragState,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn dragging(&self) -> Option<RiskId> {
        match self.state {
            DragState::Dragging { risk_id, .. } => Some(risk_id),
            _ => None,
        }
    }

    pub fn start(
        &mut self,
        risk_id: RiskId,
        source: DragSource,
        risks: &[Risk],
    ) -> Result<(), BoardError> {
        if let DragState::Dragging { risk_id: active, .. }
        | DragState::ResolvingDrop {
            risk_id: active, ..
        } = self.state
        {
            return Err(BoardError::DragInProgress(active));
        }
        if !risks.iter().any(|risk| risk.id == risk_id) {
            return Err(BoardError::RiskNotFound(risk_id));
        }
        debug!(%risk_id, ?source, "drag: started");
        self.state = DragState::Dragging { risk_id, source };
        Ok(())
    }

    /// Escape key or drop outside the board.
    pub fn cancel(&mut self) {
        if self.state != DragState::Idle {
            debug!(state = ?self.state, "drag: cancelled");
        }
        self.state = DragState::Idle;
    }

    pub fn drop_on(&mut self, target: DropTarget, risks: &[Risk]) -> Result<DropOutcome, BoardError> {
        let DragState::Dragging { risk_id, .. } = self.state else {
            return Err(BoardError::NotDragging);
        };
        self.state = DragState::ResolvingDrop { risk_id, target };
        let outcome = resolve_drop(risk_id, target, risks);
        debug!(%risk_id, ?target, ?outcome, "drag: drop resolved");
        self.state = DragState::Idle;
        Ok(outcome)
    }
}

/// Column targets win; card targets borrow the card's current status.
pub fn resolve_drop(risk_id: RiskId, target: DropTarget, risks: &[Risk]) -> DropOutcome {
    let Some(dragged) = risks.iter().find(|risk| risk.id == risk_id) else {
        return DropOutcome::NoTarget;
    };
    let destination = match target {
        DropTarget::Column(status) if status.is_board_column() => status,
        DropTarget::Column(_) | DropTarget::Outside => return DropOutcome::NoTarget,
        DropTarget::Card(card_id) => match risks.iter().find(|risk| risk.id == card_id) {
            Some(card) if card.status.is_board_column() => card.status,
            _ => return DropOutcome::NoTarget,
        },
    };

    if destination == dragged.status {
        DropOutcome::Unchanged { risk_id }
    } else {
        DropOutcome::Transition {
            risk_id,
            from: dragged.status,
            to: destination,
        }
    }
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
