use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder};
use sea_orm::*;
use tracing::{info, warn};

use crate::entity::{credit_transaction, item_image, status_log, workflow_run};

fn composite_indexes() -> Vec<(&'static str, IndexCreateStatement)> {
    let index = |name: &'static str| {
        let mut stmt = Index::create();
        stmt.if_not_exists().name(name);
        (name, stmt)
    };

    // Status feed: WHERE run_id = ? ORDER BY created_at DESC, id DESC
    let (name, mut status_feed) = index("idx_status_log_run_created");
    status_feed
        .table(status_log::Entity)
        .col(status_log::Column::RunId)
        .col(status_log::Column::CreatedAt)
        .col(status_log::Column::Id);
    let status_feed = (name, status_feed);

    // Credit history per user
    let (name, mut credit_history) = index("idx_credit_transaction_user_created");
    credit_history
        .table(credit_transaction::Entity)
        .col(credit_transaction::Column::UserId)
        .col(credit_transaction::Column::CreatedAt);
    let credit_history = (name, credit_history);

    // Current image per slot
    let (name, mut slots) = index("idx_item_image_note_position");
    slots
        .table(item_image::Entity)
        .col(item_image::Column::NoteId)
        .col(item_image::Column::Position)
        .col(item_image::Column::Id);
    let slots = (name, slots);

    // Run list and current-run fallback
    let (name, mut runs) = index("idx_workflow_run_user_created");
    runs.table(workflow_run::Entity)
        .col(workflow_run::Column::UserId)
        .col(workflow_run::Column::CreatedAt);
    let runs = (name, runs);

    vec![status_feed, credit_history, slots, runs]
}

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't support composite non-unique indexes,
/// so we create them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    for (name, stmt) in composite_indexes() {
        match db
            .execute_unprepared(&stmt.to_string(PostgresQueryBuilder))
            .await
        {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }
    Ok(())
}
