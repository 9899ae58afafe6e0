use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::agent::{Commission, NewCommission};
use crate::models::booking::Booking;
use crate::store::{CrmStore, Insert};

#[derive(Debug)]
pub enum CommissionOutcome {
    Created(Commission),
    /// The booking was already credited; the existing row is returned untouched.
    AlreadyRecorded(Commission),
    NoAgent,
    NonPositiveAmount,
}

/// `total * rate / 100`, rounded to cents.
pub fn commission_amount(total_price: f64, rate_percent: f64) -> f64 {
    (total_price * rate_percent).round() / 100.0
}

/// Agent credited for a booking: the booking's own agent, else the agent on
/// the customer's newest lead, else the agent on the newest lead sharing the
/// customer's email.
pub async fn resolve_agent(
    store: &dyn CrmStore,
    booking: &Booking,
) -> Result<Option<Uuid>, AppError> {
    if let Some(agent_id) = booking.agent_id {
        return Ok(Some(agent_id));
    }

    if let Some(user_id) = booking.user_id {
        if let Some(lead) = store.latest_lead_for_user(booking.tenant_id, user_id).await? {
            if let Some(assignment) = store.active_assignment(lead.id).await? {
                return Ok(Some(assignment.agent_id));
            }
        }
    }

    match booking.customer_email.as_deref() {
        Some(email) => Ok(store
            .latest_agent_for_email(booking.tenant_id, email)
            .await?),
        None => Ok(None),
    }
}

/// Credits the responsible agent for a confirmed or completed booking.
/// Safe to call any number of times per booking.
pub async fn calculate_commission(
    store: &dyn CrmStore,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CommissionOutcome, AppError> {
    let booking = store
        .find_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} not found")))?;

    let Some(agent_id) = resolve_agent(store, &booking).await? else {
        info!(%booking_id, "No agent linked to booking, no commission");
        return Ok(CommissionOutcome::NoAgent);
    };
    let Some(agent) = store
        .find_agent(agent_id)
        .await?
        .filter(|a| a.tenant_id == booking.tenant_id)
    else {
        warn!(%booking_id, %agent_id, "Booking points at a missing agent");
        return Ok(CommissionOutcome::NoAgent);
    };

    let amount = commission_amount(booking.total_price, agent.commission_rate);
    if amount <= 0.0 {
        info!(%booking_id, %agent_id, "Commission amount is not positive, skipped");
        return Ok(CommissionOutcome::NonPositiveAmount);
    }

    let outcome = store
        .insert_commission(
            &NewCommission {
                tenant_id: booking.tenant_id,
                agent_id,
                booking_id,
                amount,
                rate_snapshot: agent.commission_rate,
            },
            now,
        )
        .await?;

    Ok(match outcome {
        Insert::Created(row) => {
            info!(%booking_id, %agent_id, amount, "Commission recorded");
            CommissionOutcome::Created(row)
        }
        Insert::Existing(row) => CommissionOutcome::AlreadyRecorded(row),
    })
}
