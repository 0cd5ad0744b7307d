//! Table definition for the key-value store.
//!
//! The store owns exactly one table, `data`. There is no migration history:
//! the create statement uses `if_not_exists` and runs on every start.
use sea_orm_migration::{prelude::*, schema::*};

/// `CREATE TABLE IF NOT EXISTS data (key TEXT PK, value JSONB, created_at TIMESTAMP DEFAULT NOW())`.
///
/// `created_at` is assigned by the server and refreshed on every upsert.
pub fn create_data_table() -> TableCreateStatement {
    Table::create()
        .table(Data::Table)
        .if_not_exists()
        .col(text(Data::Key).primary_key())
        .col(json_binary(Data::Value))
        .col(timestamp_null(Data::CreatedAt).default(Expr::current_timestamp()))
        .to_owned()
}

#[derive(DeriveIden)]
pub enum Data {
    Table,
    Key,
    Value,
    CreatedAt,
}
