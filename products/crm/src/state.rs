use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::{
    board::{BoardView, group_by_stage},
    deal::{Deal, DealId, StagePatch},
    error::{PersistenceError, TransitionError},
    stage::{StageId, StageRegistry},
    store::{DealSort, DealStore},
    transition::{Commit, CommitOutcome, Move, PendingCommit, SettledCommit, TransitionController},
};

/// What `BoardState::resolve` did with a settled commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The store accepted the move; the optimistic board stands.
    Kept,
    /// The store rejected the move; the board was reloaded from the store.
    Reloaded,
}

/// The board's deals as the user currently sees them, optimistic moves
/// included.
///
/// Owned by whoever drives the UI loop. Every mutation goes through
/// `&mut self`, so reads never observe a pre-move snapshot. Patches of
/// unsettled commits survive reloads.
#[derive(Clone, Debug, Default)]
pub struct BoardState {
    deals: Vec<Deal>,
    in_flight: HashMap<DealId, StagePatch>,
    sort: Option<DealSort>,
}

impl BoardState {
    pub fn new(deals: Vec<Deal>) -> Self {
        Self {
            deals,
            ..Self::default()
        }
    }

    pub async fn load<S: DealStore>(
        store: &S,
        sort: Option<DealSort>,
    ) -> Result<Self, PersistenceError> {
        let deals = store.list(sort).await?;
        info!(deals = deals.len(), "pipeline board loaded");
        Ok(Self {
            deals,
            in_flight: HashMap::new(),
            sort,
        })
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn deal(&self, id: &DealId) -> Option<&Deal> {
        self.deals.iter().find(|deal| &deal.id == id)
    }

    pub fn is_in_flight(&self, id: &DealId) -> bool {
        self.in_flight.contains_key(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn view(&self, registry: &StageRegistry, search: &str) -> BoardView {
        group_by_stage(registry, &self.deals, search)
    }

    /// Handles a drop. The board changes before this returns; the returned
    /// commit, if any, must be passed to [`BoardState::resolve`] once settled.
    pub fn drag<S: DealStore>(
        &mut self,
        controller: &TransitionController<S>,
        deal_id: &DealId,
        destination: &StageId,
    ) -> Result<Option<PendingCommit>, TransitionError> {
        if self.in_flight.contains_key(deal_id) {
            let err = TransitionError::MoveInFlight(deal_id.clone());
            warn!(deal = %deal_id, to = %destination, code = err.code(), "drag ignored");
            return Err(err);
        }
        let Move { deals, commit } = controller.move_deal(deal_id, destination, &self.deals)?;
        self.deals = deals;
        match commit {
            Commit::Unchanged => Ok(None),
            Commit::Pending(pending) => {
                self.in_flight.insert(deal_id.clone(), pending.patch().clone());
                Ok(Some(pending))
            }
        }
    }

    /// Applies the outcome of a settled commit: the stored deal replaces the
    /// optimistic one on success, a full reload runs on failure. A failed
    /// reload is returned and leaves the optimistic board in place.
    pub async fn resolve<S: DealStore>(
        &mut self,
        store: &S,
        settled: SettledCommit,
    ) -> Result<Resolution, PersistenceError> {
        self.in_flight.remove(&settled.deal_id);
        match settled.outcome {
            CommitOutcome::Confirmed(stored) => {
                debug!(deal = %settled.deal_id, stage = %settled.patch.stage, "stage move persisted");
                if let Some(deal) = self.deals.iter_mut().find(|deal| deal.id == stored.id) {
                    *deal = stored;
                }
                Ok(Resolution::Kept)
            }
            CommitOutcome::Failed(err) => {
                warn!(
                    deal = %settled.deal_id,
                    stage = %settled.patch.stage,
                    code = err.code(),
                    error = %err,
                    "stage move not persisted; reloading board"
                );
                self.reload(store).await?;
                Ok(Resolution::Reloaded)
            }
        }
    }

    /// Replaces the board with a fresh `list()`, then re-applies the
    /// patches of commits that have not settled yet.
    pub async fn reload<S: DealStore>(&mut self, store: &S) -> Result<(), PersistenceError> {
        let mut deals = store
            .list(self.sort)
            .await
            .inspect_err(|err| warn!(error = %err, "board reload failed"))?;
        for deal in &mut deals {
            if let Some(patch) = self.in_flight.get(&deal.id) {
                deal.apply_patch(patch);
            }
        }
        self.deals = deals;
        Ok(())
    }
}
