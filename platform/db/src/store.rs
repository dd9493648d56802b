use anyhow::anyhow;
use chrono::{DateTime, Utc};
use entity::{deal, deal_stage_history};
use products_crm::{
    Deal, DealId, DealSort, DealStore, NewDeal, PersistenceError, StageId, StagePatch,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    DbErr, EntityTrait, Order, QueryFilter, QueryOrder, QueryTrait, TransactionTrait,
    prelude::DateTimeWithTimeZone, sea_query::NullOrdering,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// One recorded stage transition of a deal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageChange {
    pub from_stage: Option<StageId>,
    pub to_stage: StageId,
    pub probability: u8,
    pub changed_at: DateTime<Utc>,
}

/// [`DealStore`] over a sea-orm connection.
#[derive(Clone, Debug)]
pub struct DbDealStore {
    db: DatabaseConnection,
}

impl DbDealStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn find(&self, id: &DealId) -> Result<Option<Deal>, PersistenceError> {
        deal::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .map_err(db_error)?
            .map(into_deal)
            .transpose()
    }

    /// Stage transitions of `id`, newest first.
    pub async fn stage_history(&self, id: &DealId) -> Result<Vec<StageChange>, PersistenceError> {
        let rows = deal_stage_history::Entity::find()
            .filter(deal_stage_history::Column::DealId.eq(id.as_str()))
            .order_by_desc(deal_stage_history::Column::ChangedAt)
            .order_by_desc(deal_stage_history::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(into_stage_change).collect()
    }
}

impl DealStore for DbDealStore {
    async fn list(&self, sort: Option<DealSort>) -> Result<Vec<Deal>, PersistenceError> {
        let query = deal::Entity::find();
        let query = match sort {
            Some(DealSort::Title) => query.order_by_asc(deal::Column::Title),
            // Missing values sort like zero, after every priced deal.
            Some(DealSort::ValueDesc) => {
                let mut query = query;
                QueryTrait::query(&mut query).order_by_with_nulls(
                    deal::Column::Value,
                    Order::Desc,
                    NullOrdering::Last,
                );
                query
            }
            None => query,
        };
        let rows = query
            .order_by_asc(deal::Column::CreatedAt)
            .order_by_asc(deal::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(into_deal).collect()
    }

    async fn create(&self, new_deal: NewDeal) -> Result<Deal, PersistenceError> {
        new_deal.validate()?;
        let id = DealId::generate();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let active = deal::ActiveModel {
            id: Set(id.to_string()),
            title: Set(new_deal.title.trim().to_string()),
            contact: Set(new_deal.contact),
            stage: Set(new_deal.stage.to_string()),
            probability: Set(i16::from(new_deal.probability)),
            value: Set(new_deal.value),
            attributes: Set(Value::Object(new_deal.attributes)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        deal::Entity::insert(active)
            .exec_without_returning(&self.db)
            .await
            .map_err(db_error)?;
        debug!(deal = %id, "deal created");
        self.find(&id)
            .await?
            .ok_or_else(|| PersistenceError::backend(anyhow!("inserted deal {id} not found")))
    }

    async fn update(&self, id: &DealId, patch: StagePatch) -> Result<Deal, PersistenceError> {
        patch.validate()?;
        let txn = self.db.begin().await.map_err(db_error)?;
        let existing = deal::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;

        let now: DateTimeWithTimeZone = Utc::now().into();
        let from_stage = existing.stage.clone();
        let mut active: deal::ActiveModel = existing.into();
        active.stage = Set(patch.stage.to_string());
        active.probability = Set(i16::from(patch.probability));
        active.updated_at = Set(now);
        let updated = active.update(&txn).await.map_err(db_error)?;

        if from_stage != patch.stage.as_str() {
            let history = deal_stage_history::ActiveModel {
                id: NotSet,
                deal_id: Set(id.to_string()),
                from_stage: Set(Some(from_stage)),
                to_stage: Set(patch.stage.to_string()),
                probability: Set(i16::from(patch.probability)),
                changed_at: Set(now),
            };
            deal_stage_history::Entity::insert(history)
                .exec_without_returning(&txn)
                .await
                .map_err(db_error)?;
        }

        txn.commit().await.map_err(db_error)?;
        into_deal(updated)
    }
}

fn db_error(err: DbErr) -> PersistenceError {
    PersistenceError::backend(err)
}

fn into_probability(raw: i16, id: &str) -> Result<u8, PersistenceError> {
    u8::try_from(raw)
        .ok()
        .filter(|probability| *probability <= 100)
        .ok_or_else(|| {
            PersistenceError::Validation(format!("deal {id} has probability {raw} outside 0-100"))
        })
}

fn into_deal(model: deal::Model) -> Result<Deal, PersistenceError> {
    let probability = into_probability(model.probability, &model.id)?;
    let attributes = match model.attributes {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(PersistenceError::Validation(format!(
                "deal {} attributes must be an object, got {other}",
                model.id
            )));
        }
    };
    Ok(Deal {
        id: DealId::from(model.id),
        title: model.title,
        contact: model.contact,
        stage: StageId::from(model.stage),
        probability,
        value: model.value,
        attributes,
    })
}

fn into_stage_change(model: deal_stage_history::Model) -> Result<StageChange, PersistenceError> {
    Ok(StageChange {
        probability: into_probability(model.probability, &model.deal_id)?,
        from_stage: model.from_stage.map(StageId::from),
        to_stage: StageId::from(model.to_stage),
        changed_at: model.changed_at.into(),
    })
}
