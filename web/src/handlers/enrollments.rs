//! Enrollment endpoints.

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use enrollment_core::types::{
    EnrollmentReceipt, EventId, PaymentStatus, Reservation, ReservationNumber,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /enrollments/enroll`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    /// Event to enroll in
    pub event_id: EventId,
    /// Attendee email
    pub email: String,
    /// Attendee first name
    pub first_name: String,
    /// Attendee last name
    pub last_name: String,
}

/// Public view of a reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    /// Public reservation number
    pub reservation_number: ReservationNumber,
    /// Event enrolled in
    pub event_id: EventId,
    /// Attendee email
    pub email: String,
    /// Attendee first name
    pub first_name: String,
    /// Attendee last name
    pub last_name: String,
    /// Current payment status
    pub status: PaymentStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for EnrollmentView {
    fn from(r: Reservation) -> Self {
        Self {
            reservation_number: r.reservation_number,
            event_id: r.event_id,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            status: r.payment_status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Create an enrollment.
///
/// ```text
/// POST /enrollments/enroll
/// ```
///
/// `200 OK` with a `CONFIRMED` receipt for free events, `202 Accepted` with a
/// `PENDING_PAYMENT` receipt and checkout URL for paid events.
///
/// # Errors
///
/// `404` unknown event, `409` duplicate or sold out, `422` invalid input,
/// `502` payment provider failure, `500` storage failure.
pub async fn enroll(
    State(state): State<AppState>,
    body: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnrollmentReceipt>), AppError> {
    let Json(request) = body.map_err(|e| AppError::validation(e.body_text()))?;

    let receipt = state
        .engine
        .create_reservation(
            request.event_id,
            &request.email,
            &request.first_name,
            &request.last_name,
        )
        .await?;

    let status = if receipt.status == PaymentStatus::PendingPayment {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(receipt)))
}

/// Look up an enrollment by reservation number.
///
/// ```text
/// GET /enrollments/{reservationNumber}
/// ```
///
/// # Errors
///
/// `404` when no reservation has that number.
pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(reservation_number): Path<String>,
) -> WebResult<Json<EnrollmentView>> {
    let reservation = state
        .engine
        .find_reservation(&ReservationNumber::new(reservation_number))
        .await?;

    Ok(Json(EnrollmentView::from(reservation)))
}
