use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::sql_types::Bool;
use diesel::{ExpressionMethods, RunQueryDsl, prelude::*};
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::subscribers::SubscriberEntity,
    repositories::population::{EntitlementKind, PopulationFilter, PopulationStore},
    schema::subscribers,
    value_objects::subscribers::SubscriberModel,
};

pub struct PopulationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PopulationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PopulationStore for PopulationPostgres {
    async fn scan_page(
        &self,
        filter: &PopulationFilter,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<SubscriberModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let mut query = subscribers::table
            .select(SubscriberEntity::as_select())
            .order(subscribers::id.asc())
            .limit(limit)
            .into_boxed();

        if let Some(cursor) = after {
            query = query.filter(subscribers::id.gt(cursor));
        }

        if !filter.roles.is_empty() {
            let roles: Vec<String> = filter.roles.iter().map(|role| role.to_string()).collect();
            query = query.filter(subscribers::role.eq_any(roles));
        }

        if filter.confirmed_email_only {
            query = query.filter(subscribers::email_confirmed_at.is_not_null());
        }

        // Coarse JSONB predicate over the embedded entitlements; expiry is
        // re-checked by the caller against the grace clock.
        match filter.entitled {
            Some(EntitlementKind::Recall) => {
                query = query
                    .filter(sql::<Bool>("entitlements @> '[{\"recall_feature\": true}]'"));
            }
            Some(EntitlementKind::Vehicle) => {
                query = query.filter(sql::<Bool>(
                    "jsonb_path_exists(entitlements, '$[*] ? (@.vehicle_slot_count > 0)')",
                ));
            }
            None => {}
        }

        let entities = query.load::<SubscriberEntity>(&mut conn)?;
        Ok(entities.into_iter().map(SubscriberModel::from).collect())
    }
}
