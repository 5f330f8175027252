use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, RunQueryDsl, prelude::*, update};
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::recalls::RecallEntity, repositories::recalls::RecallStore, schema::recalls,
    value_objects::recalls::RecallModel,
};

pub struct RecallPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl RecallPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl RecallStore for RecallPostgres {
    async fn list_undispatched(&self, now: DateTime<Utc>) -> Result<Vec<RecallModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entities = recalls::table
            .filter(recalls::dispatched_at.is_null())
            .filter(recalls::published_at.le(now))
            .order(recalls::published_at.asc())
            .select(RecallEntity::as_select())
            .load::<RecallEntity>(&mut conn)?;

        Ok(entities.into_iter().map(RecallModel::from).collect())
    }

    async fn mark_dispatched(&self, recall_id: Uuid, dispatched_at: DateTime<Utc>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(recalls::table)
            .filter(recalls::id.eq(recall_id))
            .set(recalls::dispatched_at.eq(Some(dispatched_at)))
            .execute(&mut conn)?;

        Ok(())
    }
}
