use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub target_type: String,
    pub target_id: i64,
    pub value: f64,
    pub value_type: String,
    pub tag: String,
    pub actor_id: i64, // 0 = anonymous
    pub source: String,
    pub timestamp: i64, // unix seconds, possibly backdated by the window policy
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
