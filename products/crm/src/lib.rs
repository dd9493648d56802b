//! CRM pipeline board.
//!
//! Deals sit in one column per pipeline stage. Dragging a card applies the
//! stage change locally right away and persists it in the background; when
//! the store rejects the write the board reloads from the store.

pub mod board;
pub mod deal;
pub mod error;
pub mod stage;
pub mod state;
pub mod store;
pub mod transition;

pub use board::{BoardColumn, BoardView, group_by_stage};
pub use deal::{Deal, DealId, NewDeal, StagePatch};
pub use error::{PersistenceError, RegistryError, TransitionError, UnknownStageError};
pub use stage::{Stage, StageId, StageRegistry};
pub use state::{BoardState, Resolution};
pub use store::{DealSort, DealStore, MemoryDealStore};
pub use transition::{
    Commit, CommitOutcome, Move, PendingCommit, PlannedMove, SettledCommit, TransitionController,
    plan_move,
};
