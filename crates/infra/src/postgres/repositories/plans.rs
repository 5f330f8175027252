use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::{ExpressionMethods, RunQueryDsl, prelude::*};

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::plans::PlanEntity, repositories::plans::PlanCatalog, schema::plans,
    value_objects::plans::PlanModel,
};

/// Plan catalog backed by a local table kept in sync with the external
/// source of truth; read-only from this core's point of view.
pub struct PlanPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PlanPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PlanCatalog for PlanPostgres {
    async fn plan_by_id(&self, plan_id: &str) -> Result<Option<PlanModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = plans::table
            .find(plan_id)
            .select(PlanEntity::as_select())
            .first::<PlanEntity>(&mut conn)
            .optional()?;

        Ok(entity.map(PlanModel::from))
    }

    async fn list_active_plans(&self) -> Result<Vec<PlanModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entities = plans::table
            .filter(plans::is_active.eq(true))
            .select(PlanEntity::as_select())
            .load::<PlanEntity>(&mut conn)?;

        Ok(entities.into_iter().map(PlanModel::from).collect())
    }
}
