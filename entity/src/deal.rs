use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "deal")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub contact: Option<String>,
    #[sea_orm(indexed)]
    pub stage: String,
    pub probability: i16,
    pub value: Option<i64>,
    pub attributes: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::deal_stage_history::Entity")]
    StageHistory,
}

impl Related<super::deal_stage_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StageHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
