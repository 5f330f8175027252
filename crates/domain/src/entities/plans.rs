use diesel::prelude::*;

use crate::schema::plans;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = plans)]
pub struct PlanEntity {
    pub id: String,
    pub name: Option<String>,
    pub recall_feature: bool,
    pub vehicle_slot_count: i32,
    pub interval: String,
    pub duration_days: i32,
    pub is_active: bool,
}
