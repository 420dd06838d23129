//! HTTP handlers for slot listing and admin slot creation.

use axum::{Json, extract::State, http::StatusCode};
use chrono::{TimeZone, Utc};

use crate::{
    AppState,
    api::models::slots::{GenerateSlotsRequest, GenerateSlotsResponse, SlotCreateRequest, SlotResponse},
    auth::AdminToken,
    errors::{Error, Result},
    store::models::{Slot, SlotCreate},
};

/// List slots currently offerable to customers.
///
/// Every listing call first sweeps expired pending reservations back to
/// available; a pending slot, expired or not, is never offered itself. The
/// sweep exists so abandoned reservations become sellable again without any
/// background timer.
#[utoipa::path(
    get,
    path = "/slots",
    tag = "slots",
    summary = "List offerable slots",
    responses(
        (status = 200, description = "Slots open for booking", body = [SlotResponse]),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_slots(State(state): State<AppState>) -> Result<Json<Vec<SlotResponse>>> {
    let reclaimed = state.store.sweep_expired(Utc::now()).await?;
    if reclaimed > 0 {
        tracing::info!(reclaimed, "Swept expired reservations");
    }

    let slots = state.store.list_open_slots().await?;
    Ok(Json(slots.into_iter().map(SlotResponse::from).collect()))
}

fn validate_slot_fields(start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>, capacity: i32, price: i64) -> Result<()> {
    if end <= start {
        return Err(Error::BadRequest {
            message: "Slot end must be after start".to_string(),
        });
    }
    if capacity <= 0 {
        return Err(Error::BadRequest {
            message: "Slot capacity must be positive".to_string(),
        });
    }
    if price < 0 {
        return Err(Error::BadRequest {
            message: "Slot price cannot be negative".to_string(),
        });
    }
    Ok(())
}

/// Create a single slot (admin).
#[utoipa::path(
    post,
    path = "/slots",
    tag = "slots",
    summary = "Create a slot",
    request_body = SlotCreateRequest,
    responses(
        (status = 201, description = "Slot created", body = SlotResponse),
        (status = 400, description = "Invalid slot data"),
        (status = 401, description = "Missing or invalid admin token"),
    ),
    security(("AdminBearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_slot(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(data): Json<SlotCreateRequest>,
) -> Result<(StatusCode, Json<SlotResponse>)> {
    validate_slot_fields(data.start, data.end, data.capacity, data.price)?;

    let slot = Slot::new(SlotCreate {
        start: data.start,
        end: data.end,
        capacity: data.capacity,
        price: data.price,
        location: data.location,
        category: data.category,
    });
    state.store.insert_slot(&slot).await?;

    tracing::info!(slot_id = %slot.id, "Created slot");
    Ok((StatusCode::CREATED, Json(SlotResponse::from(slot))))
}

/// Generate one slot per hour for a day (admin).
#[utoipa::path(
    post,
    path = "/slots/generate",
    tag = "slots",
    summary = "Generate hourly slots",
    request_body = GenerateSlotsRequest,
    responses(
        (status = 201, description = "Slots created", body = GenerateSlotsResponse),
        (status = 400, description = "Invalid generation range"),
        (status = 401, description = "Missing or invalid admin token"),
    ),
    security(("AdminBearer" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn generate_slots(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(data): Json<GenerateSlotsRequest>,
) -> Result<(StatusCode, Json<GenerateSlotsResponse>)> {
    if data.start_hour >= data.end_hour || data.end_hour > 24 {
        return Err(Error::BadRequest {
            message: "end_hour must be greater than start_hour and at most 24".to_string(),
        });
    }

    let mut slots = Vec::with_capacity((data.end_hour - data.start_hour) as usize);
    for hour in data.start_hour..data.end_hour {
        let start = data.date.and_hms_opt(hour, 0, 0).ok_or_else(|| Error::BadRequest {
            message: format!("Invalid hour {hour}"),
        })?;
        let start = Utc.from_utc_datetime(&start);
        let end = start + chrono::Duration::hours(1);
        validate_slot_fields(start, end, data.capacity, data.price)?;

        slots.push(Slot::new(SlotCreate {
            start,
            end,
            capacity: data.capacity,
            price: data.price,
            location: data.location,
            category: data.category,
        }));
    }

    let created = state.store.insert_slots(&slots).await?;
    tracing::info!(created, date = %data.date, "Generated hourly slots");

    Ok((
        StatusCode::CREATED,
        Json(GenerateSlotsResponse {
            created,
            slots: slots.into_iter().map(SlotResponse::from).collect(),
        }),
    ))
}
