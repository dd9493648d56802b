use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    deal::{Deal, DealId, NewDeal, StagePatch},
    error::PersistenceError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealSort {
    Title,
    ValueDesc,
}

/// Entity store the board reads from and writes stage moves to.
///
/// Futures must be `Send`: stage moves are persisted on a spawned task.
pub trait DealStore: Send + Sync + 'static {
    /// All deals. `None` keeps creation order.
    fn list(
        &self,
        sort: Option<DealSort>,
    ) -> impl Future<Output = Result<Vec<Deal>, PersistenceError>> + Send;

    fn create(&self, deal: NewDeal) -> impl Future<Output = Result<Deal, PersistenceError>> + Send;

    fn update(
        &self,
        id: &DealId,
        patch: StagePatch,
    ) -> impl Future<Output = Result<Deal, PersistenceError>> + Send;
}

/// In-process store; creation order is insertion order.
#[derive(Debug, Default)]
pub struct MemoryDealStore {
    deals: RwLock<Vec<Deal>>,
}

impl MemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deals(deals: Vec<Deal>) -> Self {
        Self {
            deals: RwLock::new(deals),
        }
    }

    pub async fn get(&self, id: &DealId) -> Option<Deal> {
        self.deals
            .read()
            .await
            .iter()
            .find(|deal| &deal.id == id)
            .cloned()
    }
}

impl DealStore for MemoryDealStore {
    async fn list(&self, sort: Option<DealSort>) -> Result<Vec<Deal>, PersistenceError> {
        let mut deals = self.deals.read().await.clone();
        sort_deals(&mut deals, sort);
        Ok(deals)
    }

    async fn create(&self, deal: NewDeal) -> Result<Deal, PersistenceError> {
        deal.validate()?;
        let created = deal.into_deal(DealId::generate());
        self.deals.write().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &DealId, patch: StagePatch) -> Result<Deal, PersistenceError> {
        patch.validate()?;
        let mut deals = self.deals.write().await;
        let deal = deals
            .iter_mut()
            .find(|deal| &deal.id == id)
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
        deal.apply_patch(&patch);
        Ok(deal.clone())
    }
}

/// Stable sort, so equal keys keep creation order.
pub fn sort_deals(deals: &mut [Deal], sort: Option<DealSort>) {
    match sort {
        Some(DealSort::Title) => deals.sort_by(|a, b| a.title.cmp(&b.title)),
        Some(DealSort::ValueDesc) => {
            deals.sort_by(|a, b| b.value_or_zero().cmp(&a.value_or_zero()))
        }
        None => {}
    }
}
