//! Bibliographic record entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "citations")]
pub struct Model {
    /// Canonical identifier, e.g. PUB00000042
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub serial: i64,

    /// PubMed identifier when the record was imported from the literature service
    #[sea_orm(unique, nullable)]
    pub pubmed_id: Option<i64>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub authors: Option<String>,

    pub journal: Option<String>,

    pub year: Option<i32>,

    pub volume: Option<String>,

    pub issue: Option<String>,

    pub pages: Option<String>,

    pub doi: Option<String>,

    pub url: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
