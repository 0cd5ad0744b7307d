use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveValue::NotSet, DatabaseConnection, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

/// One row of the key-value table. `created_at` is the time of the last write.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "data")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub key: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub value: Json,
    pub created_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn validate_key(key: &str) -> Result<(), ModelError> {
    if key.trim().is_empty() {
        return Err(ModelError::Validation("key must not be empty".into()));
    }
    Ok(())
}

/// Insert `key`, or overwrite its value and refresh `created_at` if it exists.
pub async fn upsert(db: &DatabaseConnection, key: &str, value: &Json) -> Result<(), ModelError> {
    validate_key(key)?;
    let am = ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.clone()),
        created_at: NotSet,
    };
    Entity::insert(am)
        .on_conflict(
            OnConflict::column(Column::Key)
                .update_column(Column::Value)
                .value(Column::CreatedAt, Expr::current_timestamp())
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Full table scan as `(key, value)` pairs.
pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<(String, Json)>, ModelError> {
    let rows = Entity::find().all(db).await?;
    Ok(rows.into_iter().map(|m| (m.key, m.value)).collect())
}

pub async fn find_by_key(db: &DatabaseConnection, key: &str) -> Result<Option<Model>, ModelError> {
    Ok(Entity::find_by_id(key.to_string()).one(db).await?)
}
