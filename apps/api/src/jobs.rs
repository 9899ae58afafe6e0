//! Fire-and-forget work triggered by requests.
//!
//! Handlers enqueue a `Job` and return; one worker drains the queue and runs
//! each job on its own task. `run_job` is the only place job failures are
//! handled: they are logged and dropped.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::assignment::assign_round_robin;
use crate::agents::commission::{calculate_commission, CommissionOutcome};
use crate::email::templates::{send_booking_email, send_lead_email};
use crate::errors::AppError;
use crate::matching::preferences::update_lead_preferences;
use crate::models::booking::BookingStatus;
use crate::state::Services;
use crate::tracking::{record_email_event, EmailEvent};
use crate::workflows::engine::enroll_on_lead_created;

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    CalculateCommission {
        booking_id: Uuid,
    },
    AutoAssignLead {
        tenant_id: Uuid,
        lead_id: Uuid,
    },
    EnrollLeadCreated {
        tenant_id: Uuid,
        lead_id: Uuid,
    },
    TrackEmailEvent(EmailEvent),
    RefreshLeadPreferences {
        lead_id: Uuid,
    },
    SendBookingEmail {
        booking_id: Uuid,
        status: BookingStatus,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::CalculateCommission { .. } => "calculate_commission",
            Job::AutoAssignLead { .. } => "auto_assign_lead",
            Job::EnrollLeadCreated { .. } => "enroll_lead_created",
            Job::TrackEmailEvent(_) => "track_email_event",
            Job::RefreshLeadPreferences { .. } => "refresh_lead_preferences",
            Job::SendBookingEmail { .. } => "send_booking_email",
        }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    tx: UnboundedSender<Job>,
}

impl JobQueue {
    /// Queue plus its receiving end, for callers that drain jobs themselves.
    pub fn channel() -> (Self, UnboundedReceiver<Job>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    /// Spawns the worker and returns a handle for enqueueing.
    pub fn start(services: Arc<Services>) -> Self {
        let (queue, mut rx) = Self::channel();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let services = Arc::clone(&services);
                tokio::spawn(async move { run_job(&services, job).await });
            }
            info!("Job queue closed");
        });
        queue
    }

    pub fn enqueue(&self, job: Job) {
        let name = job.name();
        if self.tx.send(job).is_err() {
            error!(job = name, "Job queue is closed, job dropped");
        }
    }
}

/// Runs one job. Never fails: errors are logged here and go no further.
pub async fn run_job(services: &Services, job: Job) {
    let name = job.name();
    if let Err(e) = execute(services, job).await {
        match e {
            AppError::NotFound(msg) => warn!(job = name, "Background job skipped: {msg}"),
            other => error!(job = name, "Background job failed: {other}"),
        }
    }
}

async fn execute(services: &Services, job: Job) -> Result<(), AppError> {
    let store = services.store.as_ref();
    let now = Utc::now();

    match job {
        Job::CalculateCommission { booking_id } => {
            match calculate_commission(store, booking_id, now).await? {
                CommissionOutcome::Created(c) => {
                    info!(%booking_id, commission_id = %c.id, "Commission job done")
                }
                CommissionOutcome::AlreadyRecorded(_) => {
                    info!(%booking_id, "Commission already recorded")
                }
                CommissionOutcome::NoAgent | CommissionOutcome::NonPositiveAmount => {}
            }
        }

        Job::AutoAssignLead { tenant_id, lead_id } => {
            let Some(assigned) = assign_round_robin(store, tenant_id, lead_id, now).await? else {
                return Ok(());
            };
            if assigned.created {
                if let Some(lead) = store.find_lead(lead_id).await? {
                    if let Err(e) =
                        send_lead_email(services.email.as_ref(), &assigned.agent, &lead).await
                    {
                        warn!(%lead_id, agent_id = %assigned.agent.id, "Agent notification failed: {e}");
                    }
                }
            }
        }

        Job::EnrollLeadCreated { tenant_id, lead_id } => {
            enroll_on_lead_created(services, tenant_id, lead_id, now).await?;
        }

        Job::TrackEmailEvent(event) => {
            record_email_event(services, &event, now).await?;
        }

        Job::RefreshLeadPreferences { lead_id } => {
            update_lead_preferences(store, lead_id, now).await?;
        }

        Job::SendBookingEmail { booking_id, status } => {
            let mut booking = store
                .find_booking(booking_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Booking {booking_id} not found")))?;
            booking.status = status;
            send_booking_email(services.email.as_ref(), &booking).await?;
        }
    }
    Ok(())
}
