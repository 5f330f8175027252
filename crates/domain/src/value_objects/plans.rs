use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::entities::plans::PlanEntity;

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanInterval {
    #[default]
    Month,
    Year,
}

impl Display for PlanInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let interval = match self {
            PlanInterval::Month => "month",
            PlanInterval::Year => "year",
        };
        write!(f, "{}", interval)
    }
}

impl PlanInterval {
    pub fn from_str(value: &str) -> Self {
        match value {
            "year" => PlanInterval::Year,
            _ => PlanInterval::Month,
        }
    }
}

/// One entry of the external, read-only plan catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanModel {
    pub id: String,
    pub name: Option<String>,
    pub recall_feature: bool,
    pub vehicle_slot_count: i32,
    pub interval: PlanInterval,
    pub duration_days: i32,
    pub is_active: bool,
}

impl From<PlanEntity> for PlanModel {
    fn from(entity: PlanEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            recall_feature: entity.recall_feature,
            vehicle_slot_count: entity.vehicle_slot_count,
            interval: PlanInterval::from_str(&entity.interval),
            duration_days: entity.duration_days,
            is_active: entity.is_active,
        }
    }
}
