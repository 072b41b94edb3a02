//! Risk-treatment Kanban board: filtering, column classification, drag-and-drop
//! resolution, and optimistic status changes persisted through a gateway.

pub mod board;
pub mod classifier;
pub mod drag;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod writer;

pub use board::{
    BoardContext, ChangeOutcome, Clock, FixedClock, Reconciliation, RiskBoard, SystemClock,
};
pub use classifier::{classify, Classification, Column};
pub use drag::{DragController, DragSource, DragState, DropOutcome, DropTarget};
pub use error::{BoardError, GatewayError};
pub use filter::RiskFilter;
pub use gateway::{Notifier, PersistenceGateway, TracingNotifier};
pub use writer::{RetryPolicy, StatusWriter, WriteOutcome, WriteRequest};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
