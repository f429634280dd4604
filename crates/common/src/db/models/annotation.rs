//! Annotation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Who wrote the annotation text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationOrigin {
    #[default]
    Human,
    Machine,
}

impl From<String> for AnnotationOrigin {
    fn from(s: String) -> Self {
        match s.as_str() {
            "machine" => AnnotationOrigin::Machine,
            _ => AnnotationOrigin::Human,
        }
    }
}

impl From<AnnotationOrigin> for String {
    fn from(origin: AnnotationOrigin) -> Self {
        match origin {
            AnnotationOrigin::Human => "human".to_string(),
            AnnotationOrigin::Machine => "machine".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "annotations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Numeric part of the identifier, used for allocation
    #[sea_orm(unique)]
    pub serial: i64,

    /// Normalized text: validated markup with canonical citation tags
    #[sea_orm(column_type = "Text")]
    pub text: String,

    /// Attribution / reason for the last change
    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,

    pub origin: String,

    pub reviewed: bool,

    pub created_by: Option<String>,

    pub updated_by: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the origin as an enum
    pub fn annotation_origin(&self) -> AnnotationOrigin {
        AnnotationOrigin::from(self.origin.clone())
    }

    /// Machine-generated text that no curator has signed off yet
    pub fn awaiting_review(&self) -> bool {
        self.annotation_origin() == AnnotationOrigin::Machine && !self.reviewed
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
