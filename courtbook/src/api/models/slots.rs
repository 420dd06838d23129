use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::models::{LessonCategory, Location, Slot, SlotStatus};
use crate::types::SlotId;

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlotResponse {
    /// Slot ID
    #[schema(value_type = String, format = "uuid")]
    pub id: SlotId,
    /// Lesson start time
    pub start: DateTime<Utc>,
    /// Lesson end time
    pub end: DateTime<Utc>,
    /// Number of participants the lesson takes
    pub capacity: i32,
    /// Price in major currency units
    pub price: i64,
    pub location: Location,
    pub category: LessonCategory,
    pub status: SlotStatus,
}

impl From<Slot> for SlotResponse {
    fn from(slot: Slot) -> Self {
        Self {
            id: slot.id,
            start: slot.start,
            end: slot.end,
            capacity: slot.capacity,
            price: slot.price,
            location: slot.location,
            category: slot.category,
            status: slot.status,
        }
    }
}

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlotCreateRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capacity: i32,
    /// Price in major currency units
    pub price: i64,
    pub location: Location,
    pub category: LessonCategory,
}

/// Batch hourly generation: one slot per hour in `[start_hour, end_hour)` on
/// the given date.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateSlotsRequest {
    /// Day to generate slots for
    pub date: NaiveDate,
    /// First lesson hour (0-23, inclusive)
    pub start_hour: u32,
    /// Hour generation stops at (exclusive); must be greater than start_hour
    pub end_hour: u32,
    pub capacity: i32,
    /// Price in major currency units, shared by every generated slot
    pub price: i64,
    pub location: Location,
    pub category: LessonCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateSlotsResponse {
    /// How many slots were created
    pub created: usize,
    pub slots: Vec<SlotResponse>,
}
