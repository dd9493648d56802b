use std::{path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;

use crate::{deal::DealId, stage::StageId};

/// A deal references a stage the registry does not know.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown stage {stage}")]
pub struct UnknownStageError {
    pub stage: StageId,
}

/// Local rejection of a drag. Never reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("destination stage {0} is not in the pipeline")]
    InvalidStage(StageId),
    #[error("deal {0} is not on the board")]
    DealNotFound(DealId),
    #[error("deal {0} already has a stage move in flight")]
    MoveInFlight(DealId),
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::InvalidStage(_) => "INVALID_STAGE",
            TransitionError::DealNotFound(_) => "DEAL_NOT_FOUND",
            TransitionError::MoveInFlight(_) => "MOVE_IN_FLIGHT",
        }
    }
}

/// Failure reported by a [`DealStore`](crate::store::DealStore).
#[derive(Debug, Error, Clone)]
pub enum PersistenceError {
    #[error("deal {0} not found")]
    NotFound(DealId),
    #[error("invalid deal: {0}")]
    Validation(String),
    #[error("persistence call did not resolve within {0:?}")]
    TimedOut(Duration),
    #[error("persistence task aborted before completing")]
    Aborted,
    #[error("store backend error: {0}")]
    Backend(Arc<anyhow::Error>),
}

impl PersistenceError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(Arc::new(err.into()))
    }

    pub fn code(&self) -> &'static str {
        match self {
            PersistenceError::NotFound(_) => "NOT_FOUND",
            PersistenceError::Validation(_) => "VALIDATION",
            PersistenceError::TimedOut(_) => "TIMED_OUT",
            PersistenceError::Aborted => "ABORTED",
            PersistenceError::Backend(_) => "INTERNAL",
        }
    }
}

impl From<anyhow::Error> for PersistenceError {
    fn from(value: anyhow::Error) -> Self {
        Self::Backend(Arc::new(value))
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("stage registry must contain at least one stage")]
    Empty,
    #[error("stage ids cannot be blank")]
    BlankId,
    #[error("duplicate stage id {0}")]
    DuplicateStage(StageId),
    #[error("stage {stage} default probability {probability} exceeds 100")]
    ProbabilityOutOfRange { stage: StageId, probability: u8 },
    #[error("invalid stage registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read stage registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
