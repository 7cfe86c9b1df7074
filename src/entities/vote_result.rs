use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub target_type: String,
    pub target_id: i64,
    pub value: f64,
    pub value_type: String,
    pub tag: String,
    pub function: String, // "sum", "average", "count", "option-<value>", extensions
    pub timestamp: i64,   // time of calculation
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
