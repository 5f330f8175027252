use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, NullableExpressionMethods, RunQueryDsl, prelude::*, update};
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::subscribers::SubscriberEntity, repositories::subscribers::SubscriberRepository,
    schema::subscribers, value_objects::subscribers::SubscriberModel,
};

pub struct SubscriberPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriberPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriberRepository for SubscriberPostgres {
    async fn find_by_id(&self, subscriber_id: Uuid) -> Result<Option<SubscriberModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = subscribers::table
            .find(subscriber_id)
            .select(SubscriberEntity::as_select())
            .first::<SubscriberEntity>(&mut conn)
            .optional()?;

        Ok(entity.map(SubscriberModel::from))
    }

    async fn find_by_billing_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<SubscriberModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = subscribers::table
            .filter(subscribers::billing_customer_ref.eq(customer_ref))
            .select(SubscriberEntity::as_select())
            .first::<SubscriberEntity>(&mut conn)
            .optional()?;

        Ok(entity.map(SubscriberModel::from))
    }

    async fn save(&self, subscriber: &SubscriberModel) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscribers::table)
            .filter(subscribers::id.eq(subscriber.id))
            .set(subscriber.to_update_entity(Utc::now()))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn try_acquire_lock(
        &self,
        subscriber_id: Uuid,
        owner: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Single-statement compare-and-swap: the row is claimed only when
        // unlocked or when the previous writer's lease has already expired.
        let claimed = update(subscribers::table)
            .filter(subscribers::id.eq(subscriber_id))
            .filter(
                subscribers::lock_owner
                    .is_null()
                    .nullable()
                    .or(subscribers::lock_expires_at.lt(now)),
            )
            .set((
                subscribers::lock_owner.eq(owner),
                subscribers::lock_expires_at.eq(lease_until),
            ))
            .execute(&mut conn)?;

        Ok(claimed == 1)
    }

    async fn release_lock(&self, subscriber_id: Uuid, owner: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscribers::table)
            .filter(subscribers::id.eq(subscriber_id))
            .filter(subscribers::lock_owner.eq(owner))
            .set((
                subscribers::lock_owner.eq(None::<String>),
                subscribers::lock_expires_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
