use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const YEAR_MIN: i32 = 1900;
const YEAR_MAX: i32 = 2100;

/// Normalized make/model/year identifier. Two subscribers watching "the same
/// vehicle" and a campaign affecting it all agree on this key, so it is the
/// join point between vehicle-interest slots and vehicle recalls.
///
/// Canonical form is `make:model:year`, lowercase, single-spaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VehicleKey(String);

impl VehicleKey {
    pub fn new(make: &str, model: &str, year: i32) -> Result<Self, DomainError> {
        let make = normalize_segment(make);
        let model = normalize_segment(model);

        if make.is_empty() {
            return Err(DomainError::validation("make", "must not be empty"));
        }
        if model.is_empty() {
            return Err(DomainError::validation("model", "must not be empty"));
        }
        if !(YEAR_MIN..=YEAR_MAX).contains(&year) {
            return Err(DomainError::validation(
                "year",
                format!("must be between {} and {}", YEAR_MIN, YEAR_MAX),
            ));
        }

        Ok(Self(format!("{}:{}:{}", make, model, year)))
    }

    /// Parses an externally supplied key, re-normalizing each segment.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let segments: Vec<&str> = raw.split(':').collect();
        let [make, model, year] = segments.as_slice() else {
            return Err(DomainError::validation(
                "vehicle_key",
                "expected `make:model:year`",
            ));
        };

        let year: i32 = year.trim().parse().map_err(|_| {
            DomainError::validation("vehicle_key", format!("`{}` is not a valid year", year))
        })?;

        Self::new(make, model, year)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VehicleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn normalize_segment(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
