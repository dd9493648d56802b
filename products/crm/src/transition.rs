use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::{
    deal::{Deal, DealId, StagePatch},
    error::{PersistenceError, TransitionError},
    stage::{StageId, StageRegistry},
    store::DealStore,
};

/// Synchronous half of a move: the optimistic list and the write to issue.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedMove {
    pub deals: Vec<Deal>,
    /// `None` when the deal already sits in the destination stage.
    pub patch: Option<StagePatch>,
}

/// Validates a drop and computes the optimistic board.
///
/// Only the moved deal changes, and only its stage and probability; the
/// probability always becomes the destination's default.
pub fn plan_move(
    registry: &StageRegistry,
    deal_id: &DealId,
    destination: &StageId,
    current: &[Deal],
) -> Result<PlannedMove, TransitionError> {
    let stage = registry
        .stage_by_id(destination)
        .map_err(|err| TransitionError::InvalidStage(err.stage))?;
    let position = current
        .iter()
        .position(|deal| &deal.id == deal_id)
        .ok_or_else(|| TransitionError::DealNotFound(deal_id.clone()))?;

    if &current[position].stage == destination {
        return Ok(PlannedMove {
            deals: current.to_vec(),
            patch: None,
        });
    }

    let patch = StagePatch {
        stage: stage.id.clone(),
        probability: stage.default_probability,
    };
    let mut deals = current.to_vec();
    deals[position].apply_patch(&patch);
    Ok(PlannedMove {
        deals,
        patch: Some(patch),
    })
}

#[derive(Debug)]
pub enum CommitOutcome {
    Confirmed(Deal),
    Failed(PersistenceError),
}

#[derive(Debug)]
pub struct SettledCommit {
    pub deal_id: DealId,
    pub patch: StagePatch,
    pub outcome: CommitOutcome,
}

impl SettledCommit {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, CommitOutcome::Confirmed(_))
    }
}

/// Handle to a persistence call running detached from the drop.
#[derive(Debug)]
pub struct PendingCommit {
    deal_id: DealId,
    patch: StagePatch,
    handle: JoinHandle<Result<Deal, PersistenceError>>,
}

impl PendingCommit {
    pub fn deal_id(&self) -> &DealId {
        &self.deal_id
    }

    pub fn patch(&self) -> &StagePatch {
        &self.patch
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the store. A panicked or cancelled task counts as failed.
    pub async fn settle(self) -> SettledCommit {
        let outcome = match self.handle.await {
            Ok(Ok(deal)) => CommitOutcome::Confirmed(deal),
            Ok(Err(err)) => CommitOutcome::Failed(err),
            Err(join_err) => {
                warn!(deal = %self.deal_id, error = %join_err, "stage move task did not complete");
                CommitOutcome::Failed(PersistenceError::Aborted)
            }
        };
        SettledCommit {
            deal_id: self.deal_id,
            patch: self.patch,
            outcome,
        }
    }
}

#[derive(Debug)]
pub enum Commit {
    /// Same-column drop; nothing was sent to the store.
    Unchanged,
    Pending(PendingCommit),
}

impl Commit {
    pub fn is_pending(&self) -> bool {
        matches!(self, Commit::Pending(_))
    }

    pub fn into_pending(self) -> Option<PendingCommit> {
        match self {
            Commit::Unchanged => None,
            Commit::Pending(pending) => Some(pending),
        }
    }
}

#[derive(Debug)]
pub struct Move {
    pub deals: Vec<Deal>,
    pub commit: Commit,
}

/// Applies drops optimistically and persists them in the background.
pub struct TransitionController<S> {
    registry: Arc<StageRegistry>,
    store: Arc<S>,
    commit_timeout: Option<Duration>,
}

impl<S> Clone for TransitionController<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            commit_timeout: self.commit_timeout,
        }
    }
}

impl<S: DealStore> TransitionController<S> {
    pub fn new(registry: Arc<StageRegistry>, store: Arc<S>) -> Self {
        Self {
            registry,
            store,
            commit_timeout: None,
        }
    }

    /// Report a persistence call that has not resolved after `timeout` as
    /// failed. Without this a hung call leaves the optimistic board standing.
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Moves `deal_id` to `destination`.
    ///
    /// The returned deals reflect the move immediately; the store write runs
    /// on a spawned task, so this must be called inside a tokio runtime.
    pub fn move_deal(
        &self,
        deal_id: &DealId,
        destination: &StageId,
        current: &[Deal],
    ) -> Result<Move, TransitionError> {
        let span = info_span!("crm.pipeline.move", deal = %deal_id, to = %destination);
        let _guard = span.enter();

        let planned = plan_move(&self.registry, deal_id, destination, current).inspect_err(
            |err| warn!(code = err.code(), error = %err, "stage move rejected"),
        )?;
        let Some(patch) = planned.patch else {
            debug!("deal already in destination stage; nothing to persist");
            return Ok(Move {
                deals: planned.deals,
                commit: Commit::Unchanged,
            });
        };

        debug!(probability = patch.probability, "stage move applied optimistically");
        let pending = self.spawn_commit(deal_id.clone(), patch, span.clone());
        Ok(Move {
            deals: planned.deals,
            commit: Commit::Pending(pending),
        })
    }

    fn spawn_commit(
        &self,
        deal_id: DealId,
        patch: StagePatch,
        span: tracing::Span,
    ) -> PendingCommit {
        let store = Arc::clone(&self.store);
        let timeout = self.commit_timeout;
        let id = deal_id.clone();
        let body = patch.clone();
        let handle = tokio::spawn(
            async move {
                let call = store.update(&id, body);
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or(Err(PersistenceError::TimedOut(limit))),
                    None => call.await,
                }
            }
            .instrument(span),
        );
        PendingCommit {
            deal_id,
            patch,
            handle,
        }
    }
}
