//! Workflow interpreter.
//!
//! A tick executes at most one step per due enrollment. Each enrollment is
//! first claimed with a compare-and-swap on its `version`, which also pushes
//! `next_action_at` out by the claim lease. The step then runs, one log row
//! is written, and a second compare-and-swap stores the successor. A step
//! that fails leaves the enrollment where it was; it becomes due again once
//! the lease runs out.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::assignment::assign_round_robin;
use crate::errors::AppError;
use crate::leads::capture::load_tenant_lead;
use crate::models::lead::{split_tags, InteractionType, Lead};
use crate::models::workflow::{
    MarketingWorkflow, NewWorkflowLog, TriggerType, WorkflowEnrollment, WorkflowStatus,
};
use crate::state::Services;
use crate::store::Insert;
use crate::tracking::TrackingTarget;
use crate::workflows::condition::evaluate;
use crate::workflows::email::render_tracked_email;
use crate::workflows::steps::{
    entry_step_id, find_step, resolve_next, AgentTarget, DelayUnit, StepAction, TagAction,
    WorkflowStep,
};

pub const LOG_SUCCESS: &str = "SUCCESS";
pub const LOG_SKIPPED: &str = "SKIPPED";

/// Longest wait a DELAY step schedules; larger delays are capped to it.
pub const MAX_DELAY_SECONDS: u64 = 3_650 * 86_400;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub processed: usize,
    /// Paused workflows and enrollments claimed by a concurrent tick.
    pub skipped: usize,
    pub failed: usize,
}

enum Progress {
    Advanced,
    Skipped,
}

/// What a step produced, before the enrollment is moved on.
struct StepResult {
    result: Value,
    delay_seconds: u64,
    /// CONDITION outcome; selects the branch.
    branch: Option<bool>,
}

impl StepResult {
    fn done(result: Value) -> Self {
        Self {
            result,
            delay_seconds: 0,
            branch: None,
        }
    }
}

/// Explicit enrollment. Enrolling twice returns the existing enrollment.
pub async fn enroll_lead(
    services: &Services,
    tenant_id: Uuid,
    workflow_id: Uuid,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Insert<WorkflowEnrollment>, AppError> {
    let store = services.store.as_ref();
    let workflow = store
        .find_workflow(workflow_id)
        .await?
        .filter(|w| w.tenant_id == tenant_id)
        .ok_or_else(|| AppError::NotFound(format!("Workflow {workflow_id} not found")))?;
    if workflow.status == WorkflowStatus::Paused {
        return Err(AppError::Validation(format!(
            "Workflow {workflow_id} is paused"
        )));
    }
    load_tenant_lead(store, tenant_id, lead_id).await?;

    enroll_in(services, &workflow, lead_id, now).await
}

async fn enroll_in(
    services: &Services,
    workflow: &MarketingWorkflow,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Insert<WorkflowEnrollment>, AppError> {
    let first_step = entry_step_id(&workflow.steps);
    let outcome = services
        .store
        .enroll(workflow.id, lead_id, first_step, now)
        .await?;
    if outcome.is_created() {
        info!(workflow_id = %workflow.id, %lead_id, "Lead enrolled");
    }
    Ok(outcome)
}

/// Enrolls a new lead into every active LEAD_CREATED workflow of its tenant.
/// Returns how many enrollments were created.
pub async fn enroll_on_lead_created(
    services: &Services,
    tenant_id: Uuid,
    lead_id: Uuid,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let workflows = services
        .store
        .active_workflows_for_trigger(tenant_id, &TriggerType::LeadCreated)
        .await?;

    let mut created = 0;
    for workflow in &workflows {
        if enroll_in(services, workflow, lead_id, now).await?.is_created() {
            created += 1;
        }
    }
    Ok(created)
}

/// One tick over every due enrollment. A failing enrollment is logged and
/// counted; it never stops the batch.
pub async fn process_workflows(
    services: &Services,
    now: DateTime<Utc>,
) -> Result<TickSummary, AppError> {
    let due = services.store.due_enrollments(now).await?;
    let mut summary = TickSummary::default();

    for enrollment in &due {
        match process_enrollment(services, enrollment, now).await {
            Ok(Progress::Advanced) => summary.processed += 1,
            Ok(Progress::Skipped) => summary.skipped += 1,
            Err(e) => {
                error!(
                    enrollment_id = %enrollment.id,
                    step = ?enrollment.current_step,
                    "Workflow step failed: {e}"
                );
                summary.failed += 1;
            }
        }
    }

    if !due.is_empty() {
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Workflow tick finished"
        );
    }
    Ok(summary)
}

async fn process_enrollment(
    services: &Services,
    enrollment: &WorkflowEnrollment,
    now: DateTime<Utc>,
) -> Result<Progress, AppError> {
    let store = services.store.as_ref();
    let workflow = store
        .find_workflow(enrollment.workflow_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Workflow {} not found", enrollment.workflow_id))
        })?;
    if workflow.status == WorkflowStatus::Paused {
        return Ok(Progress::Skipped);
    }

    let lease_until = now + services.claim_lease;
    let Some(claimed) = store.claim_enrollment(enrollment, now, lease_until).await? else {
        debug!(enrollment_id = %enrollment.id, "Enrollment claimed elsewhere");
        return Ok(Progress::Skipped);
    };

    let steps: &[WorkflowStep] = &workflow.steps;
    let current = claimed.current_step.as_deref();
    let Some(step) = current.and_then(|id| find_step(steps, id)) else {
        // the definition changed under the enrollment; nothing left to run
        warn!(enrollment_id = %claimed.id, step = ?current, "Current step not in workflow");
        write_log(
            services,
            &claimed,
            current.unwrap_or_default(),
            "UNKNOWN",
            LOG_SKIPPED,
            json!({ "reason": "step not found" }),
            now,
        )
        .await?;
        return finish(services, &claimed, None, None, now).await;
    };

    let lead = store
        .find_lead(claimed.lead_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", claimed.lead_id)))?;

    let outcome = execute_step(services, &workflow, &lead, step, now).await?;

    let next_id = resolve_next(steps, step, outcome.branch).step_id();
    let next_action_at = next_id
        .map(|_| wake_at(now, outcome.delay_seconds))
        .transpose()?;

    write_log(
        services,
        &claimed,
        &step.id,
        step.action.kind(),
        LOG_SUCCESS,
        outcome.result,
        now,
    )
    .await?;
    finish(services, &claimed, next_id, next_action_at, now).await
}

fn delay_seconds(duration: u64, unit: DelayUnit) -> u64 {
    duration
        .checked_mul(unit.seconds())
        .map_or(MAX_DELAY_SECONDS, |secs| secs.min(MAX_DELAY_SECONDS))
}

fn wake_at(now: DateTime<Utc>, seconds: u64) -> Result<DateTime<Utc>, AppError> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or_else(|| AppError::Validation(format!("delay of {seconds}s is out of range")))
}

async fn write_log(
    services: &Services,
    enrollment: &WorkflowEnrollment,
    step_id: &str,
    action_type: &str,
    status: &str,
    result: Value,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    services
        .store
        .write_workflow_log(
            &NewWorkflowLog {
                enrollment_id: enrollment.id,
                step_id: step_id.to_string(),
                action_type: action_type.to_string(),
                status: status.to_string(),
                result,
            },
            now,
        )
        .await?;
    Ok(())
}

async fn finish(
    services: &Services,
    claimed: &WorkflowEnrollment,
    next_step: Option<&str>,
    next_action_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Progress, AppError> {
    let advanced = services
        .store
        .advance_enrollment(claimed, next_step, next_action_at, now)
        .await?;
    if !advanced {
        warn!(enrollment_id = %claimed.id, "Enrollment changed while its step ran");
        return Ok(Progress::Skipped);
    }
    if next_step.is_none() {
        info!(enrollment_id = %claimed.id, "Enrollment completed");
    }
    Ok(Progress::Advanced)
}

async fn execute_step(
    services: &Services,
    workflow: &MarketingWorkflow,
    lead: &Lead,
    step: &WorkflowStep,
    now: DateTime<Utc>,
) -> Result<StepResult, AppError> {
    match &step.action {
        StepAction::Start => Ok(StepResult::done(json!({}))),

        StepAction::Email {
            template_id,
            subject,
        } => {
            send_step_email(services, workflow, lead, step, *template_id, subject.as_deref(), now)
                .await
        }

        StepAction::Delay { duration, unit } => {
            let delay_seconds = delay_seconds(*duration, *unit);
            let capped = delay_seconds == MAX_DELAY_SECONDS;
            Ok(StepResult {
                result: json!({ "delaySeconds": delay_seconds, "capped": capped }),
                delay_seconds,
                branch: None,
            })
        }

        StepAction::Condition {
            field,
            operator,
            value,
            ..
        } => {
            let matched = evaluate(lead, field, operator, value);
            Ok(StepResult {
                result: json!({ "matched": matched }),
                delay_seconds: 0,
                branch: Some(matched),
            })
        }

        StepAction::Tag { action, tag } => {
            let tag = tag.trim();
            if tag.is_empty() {
                return Ok(StepResult::done(json!({ "skipped": "empty tag" })));
            }
            let tags = apply_tag(lead.tags.as_deref(), *action, tag);
            let joined = tags.join(",");
            services
                .store
                .update_lead_tags(lead.id, (!joined.is_empty()).then_some(joined.as_str()), now)
                .await?;
            Ok(StepResult::done(json!({ "tags": tags })))
        }

        StepAction::Assign { agent_id } => assign_step(services, lead, agent_id, now).await,

        StepAction::Unknown => Ok(StepResult::done(
            json!({ "skipped": "unsupported step type" }),
        )),
    }
}

/// Idempotent add or remove on a comma-joined tag list.
pub fn apply_tag(current: Option<&str>, action: TagAction, tag: &str) -> Vec<String> {
    let mut tags = split_tags(current);
    match action {
        TagAction::Add => {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        TagAction::Remove => tags.retain(|t| t != tag),
    }
    tags
}

async fn send_step_email(
    services: &Services,
    workflow: &MarketingWorkflow,
    lead: &Lead,
    step: &WorkflowStep,
    template_id: Uuid,
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> Result<StepResult, AppError> {
    let template = services
        .store
        .find_template(template_id)
        .await?
        .filter(|t| t.tenant_id == workflow.tenant_id)
        .ok_or_else(|| AppError::NotFound(format!("Email template {template_id} not found")))?;

    let Some(to) = lead.email.as_deref() else {
        return Ok(StepResult::done(json!({ "skipped": "lead has no email" })));
    };

    let html = render_tracked_email(
        &template.body_html,
        lead.display_name(),
        &services.links,
        &TrackingTarget {
            lead_id: lead.id,
            workflow_id: Some(workflow.id),
            campaign_id: None,
        },
    );
    let subject = subject.unwrap_or(&template.subject);

    match services.email.send(to, subject, &html).await {
        Ok(accepted) => {
            if accepted {
                let metadata = json!({
                    "workflowId": workflow.id,
                    "templateId": template_id,
                    "stepId": step.id,
                });
                services
                    .store
                    .record_interaction(
                        lead.id,
                        InteractionType::EmailSent,
                        services.weights.weight(InteractionType::EmailSent),
                        &metadata,
                        now,
                    )
                    .await?;
            }
            Ok(StepResult::done(json!({ "sent": accepted, "to": to })))
        }
        Err(e) => {
            warn!(lead_id = %lead.id, %template_id, "Workflow email failed: {e}");
            Ok(StepResult::done(
                json!({ "sent": false, "to": to, "error": e.to_string() }),
            ))
        }
    }
}

async fn assign_step(
    services: &Services,
    lead: &Lead,
    target: &AgentTarget,
    now: DateTime<Utc>,
) -> Result<StepResult, AppError> {
    let store = services.store.as_ref();
    match target {
        AgentTarget::Auto => {
            let assigned = assign_round_robin(store, lead.tenant_id, lead.id, now).await?;
            Ok(StepResult::done(match assigned {
                Some(a) => json!({ "agentId": a.agent.id, "created": a.created }),
                None => json!({ "agentId": null, "skipped": "no active agents" }),
            }))
        }
        AgentTarget::Agent(agent_id) => {
            let known = store
                .find_agent(*agent_id)
                .await?
                .is_some_and(|a| a.tenant_id == lead.tenant_id);
            if !known {
                return Ok(StepResult::done(
                    json!({ "agentId": agent_id, "skipped": "agent not found" }),
                ));
            }
            store.reassign_lead(lead.id, Some(*agent_id), now).await?;
            Ok(StepResult::done(json!({ "agentId": agent_id })))
        }
        AgentTarget::Invalid(raw) => Ok(StepResult::done(
            json!({ "skipped": format!("invalid agent id '{raw}'") }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::agent::AssignmentStatus;
    use crate::models::workflow::EnrollmentStatus;
    use crate::store::CrmStore;
    use crate::testing::{agent, at, seed_lead, template, workflow, Harness};

    async fn enrolled(h: &Harness, steps: Value) -> (Lead, WorkflowEnrollment) {
        let lead = seed_lead(h, "flow@example.com").await;
        let wf = workflow(h.tenant_id, steps, WorkflowStatus::Active);
        h.store.insert_workflow(wf.clone()).await;
        let enrollment = enroll_lead(&h.services, h.tenant_id, wf.id, lead.id, at(9, 0))
            .await
            .unwrap()
            .into_inner();
        (lead, enrollment)
    }

    async fn reload(h: &Harness, id: Uuid) -> WorkflowEnrollment {
        h.store.find_enrollment(id).await.unwrap().unwrap()
    }

    #[test]
    fn test_apply_tag_is_idempotent() {
        assert_eq!(apply_tag(Some("vip,hot"), TagAction::Add, "hot"), vec!["vip", "hot"]);
        assert_eq!(apply_tag(None, TagAction::Add, "new"), vec!["new"]);
        assert_eq!(apply_tag(Some("vip, hot"), TagAction::Remove, "vip"), vec!["hot"]);
    }

    #[tokio::test]
    async fn test_enrollment_starts_at_start_step_and_is_unique() {
        let h = Harness::new();
        let (lead, enrollment) = enrolled(
            &h,
            json!([
                { "id": "t", "type": "TAG", "tag": "x" },
                { "id": "s", "type": "START" }
            ]),
        )
        .await;
        assert_eq!(enrollment.current_step.as_deref(), Some("s"));
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
        assert_eq!(enrollment.next_action_at, Some(at(9, 0)));

        let again = enroll_lead(&h.services, h.tenant_id, enrollment.workflow_id, lead.id, at(9, 5))
            .await
            .unwrap();
        assert!(!again.is_created());
        assert_eq!(again.get().id, enrollment.id);
    }

    #[tokio::test]
    async fn test_empty_workflow_completes_on_enroll() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(&h, json!([])).await;
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
        assert_eq!(enrollment.next_action_at, None);
        assert!(h.store.due_enrollments(at(23, 0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paused_workflow_refuses_enrollment() {
        let h = Harness::new();
        let lead = seed_lead(&h, "p@example.com").await;
        let wf = workflow(h.tenant_id, json!([{ "id": "s", "type": "START" }]), WorkflowStatus::Paused);
        h.store.insert_workflow(wf.clone()).await;

        let result = enroll_lead(&h.services, h.tenant_id, wf.id, lead.id, at(9, 0)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_oversized_delay_is_capped() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(
            &h,
            json!([
                { "id": "wait", "type": "DELAY", "duration": 100_000_000u64, "unit": "days" },
                { "id": "after", "type": "TAG", "tag": "later" }
            ]),
        )
        .await;

        let tick = at(10, 0);
        let summary = process_workflows(&h.services, tick).await.unwrap();
        assert_eq!(summary.processed, 1);

        let after = reload(&h, enrollment.id).await;
        assert_eq!(after.status, EnrollmentStatus::Active);
        assert_eq!(after.current_step.as_deref(), Some("after"));
        assert_eq!(
            after.next_action_at,
            Some(tick + Duration::seconds(MAX_DELAY_SECONDS as i64))
        );
        let logs = h.store.workflow_logs(enrollment.id).await.unwrap();
        assert_eq!(logs[0].result["capped"], true);
    }

    #[test]
    fn test_delay_overflow_never_wraps() {
        assert_eq!(delay_seconds(u64::MAX, DelayUnit::Days), MAX_DELAY_SECONDS);
        assert_eq!(delay_seconds(2, DelayUnit::Hours), 7_200);
        assert!(wake_at(at(0, 0), u64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_delay_sets_next_action_and_stays_active() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(
            &h,
            json!([
                { "id": "wait", "type": "DELAY", "duration": 2, "unit": "hours" },
                { "id": "after", "type": "TAG", "tag": "nurtured" }
            ]),
        )
        .await;

        let tick = at(10, 0);
        let summary = process_workflows(&h.services, tick).await.unwrap();
        assert_eq!(summary.processed, 1);

        let after = reload(&h, enrollment.id).await;
        assert_eq!(after.status, EnrollmentStatus::Active);
        assert_eq!(after.current_step.as_deref(), Some("after"));
        assert_eq!(after.next_action_at, Some(tick + Duration::seconds(7200)));

        // not due before the delay has elapsed
        let early = process_workflows(&h.services, tick + Duration::minutes(30)).await.unwrap();
        assert_eq!(early.processed, 0);
    }

    #[tokio::test]
    async fn test_one_step_per_tick_until_completion() {
        let h = Harness::new();
        let (lead, enrollment) = enrolled(
            &h,
            json!([
                { "id": "start", "type": "START" },
                { "id": "tag", "type": "TAG", "tag": "warm" }
            ]),
        )
        .await;

        process_workflows(&h.services, at(10, 0)).await.unwrap();
        let mid = reload(&h, enrollment.id).await;
        assert_eq!(mid.current_step.as_deref(), Some("tag"));
        assert_eq!(mid.status, EnrollmentStatus::Active);

        process_workflows(&h.services, at(10, 1)).await.unwrap();
        let done = reload(&h, enrollment.id).await;
        assert_eq!(done.status, EnrollmentStatus::Completed);
        assert_eq!(done.current_step, None);
        assert_eq!(done.next_action_at, None);

        let stored = h.store.find_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.tags.as_deref(), Some("warm"));
        let logs = h.store.workflow_logs(enrollment.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == LOG_SUCCESS));
        assert_eq!(logs[1].action_type, "TAG");
    }

    #[tokio::test]
    async fn test_empty_branch_falls_through_to_next_sibling() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(
            &h,
            json!([
                {
                    "id": "check", "type": "CONDITION",
                    "field": "leadScore", "operator": "greater_than", "value": 50,
                    "yesSteps": [{ "id": "hot", "type": "TAG", "tag": "hot" }],
                    "noSteps": []
                },
                { "id": "after", "type": "TAG", "tag": "seen" }
            ]),
        )
        .await;

        process_workflows(&h.services, at(10, 0)).await.unwrap();
        let after = reload(&h, enrollment.id).await;
        assert_eq!(after.status, EnrollmentStatus::Active);
        assert_eq!(after.current_step.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn test_branch_end_rejoins_parent_list() {
        let h = Harness::new();
        let (lead, enrollment) = enrolled(
            &h,
            json!([
                {
                    "id": "check", "type": "CONDITION",
                    "field": "email", "operator": "contains", "value": "EXAMPLE",
                    "yesSteps": [{ "id": "hot", "type": "TAG", "tag": "hot" }],
                    "noSteps": [{ "id": "cold", "type": "TAG", "tag": "cold" }]
                },
                { "id": "after", "type": "TAG", "tag": "seen" }
            ]),
        )
        .await;

        process_workflows(&h.services, at(10, 0)).await.unwrap();
        assert_eq!(reload(&h, enrollment.id).await.current_step.as_deref(), Some("hot"));
        process_workflows(&h.services, at(10, 1)).await.unwrap();
        assert_eq!(reload(&h, enrollment.id).await.current_step.as_deref(), Some("after"));
        process_workflows(&h.services, at(10, 2)).await.unwrap();

        let done = reload(&h, enrollment.id).await;
        assert_eq!(done.status, EnrollmentStatus::Completed);
        let tags = h.store.find_lead(lead.id).await.unwrap().unwrap().tags;
        assert_eq!(tags.as_deref(), Some("hot,seen"));
    }

    #[tokio::test]
    async fn test_email_step_sends_tracked_mail() {
        let h = Harness::new();
        let tpl = template(
            h.tenant_id,
            "Welcome",
            r#"<html><body>Hi {{NAME}} <a href="https://homes.example/x">look</a></body></html>"#,
        );
        h.store.insert_template(tpl.clone()).await;
        let (lead, enrollment) = enrolled(
            &h,
            json!([{ "id": "mail", "type": "EMAIL", "templateId": tpl.id }]),
        )
        .await;

        let summary = process_workflows(&h.services, at(10, 0)).await.unwrap();
        assert_eq!(summary.processed, 1);

        let sent = h.email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "flow@example.com");
        assert_eq!(sent[0].subject, "Welcome");
        assert!(sent[0].html.contains("Hi Seeded Lead"));
        assert!(sent[0].html.contains("/track/click?"));
        assert!(sent[0].html.contains(&format!("w={}", enrollment.workflow_id)));
        assert!(sent[0].html.contains("/track/open?"));

        let interactions = h.store.interactions_for_lead(lead.id).await.unwrap();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].interaction_type, InteractionType::EmailSent);
        assert_eq!(h.store.find_lead(lead.id).await.unwrap().unwrap().lead_score, 0);
        assert_eq!(reload(&h, enrollment.id).await.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_email_step_without_address_still_advances() {
        let h = Harness::new();
        let tpl = template(h.tenant_id, "Welcome", "<p>Hi</p>");
        h.store.insert_template(tpl.clone()).await;
        let lead = h
            .store
            .capture_lead(
                h.tenant_id,
                &crate::models::lead::LeadCapture {
                    phone: Some("555-0000".to_string()),
                    ..Default::default()
                },
                at(8, 0),
            )
            .await
            .unwrap()
            .into_inner();
        let wf = workflow(
            h.tenant_id,
            json!([{ "id": "mail", "type": "EMAIL", "templateId": tpl.id }]),
            WorkflowStatus::Active,
        );
        h.store.insert_workflow(wf.clone()).await;
        let enrollment = enroll_lead(&h.services, h.tenant_id, wf.id, lead.id, at(9, 0))
            .await
            .unwrap()
            .into_inner();

        let summary = process_workflows(&h.services, at(10, 0)).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert!(h.email.sent().is_empty());
        assert_eq!(reload(&h, enrollment.id).await.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_step_is_retried_after_lease() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(
            &h,
            json!([{ "id": "mail", "type": "EMAIL", "templateId": Uuid::new_v4() }]),
        )
        .await;

        let summary = process_workflows(&h.services, at(10, 0)).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(h.store.workflow_logs(enrollment.id).await.unwrap().is_empty());

        let held = reload(&h, enrollment.id).await;
        assert_eq!(held.current_step.as_deref(), Some("mail"));
        assert_eq!(held.status, EnrollmentStatus::Active);
        assert_eq!(held.next_action_at, Some(at(10, 0) + h.services.claim_lease));

        let within_lease = process_workflows(&h.services, at(10, 0) + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(within_lease, TickSummary::default());
        let after_lease = process_workflows(&h.services, at(10, 5)).await.unwrap();
        assert_eq!(after_lease.failed, 1);
    }

    #[tokio::test]
    async fn test_stale_claim_is_skipped() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(&h, json!([{ "id": "s", "type": "START" }])).await;

        let winner = h
            .store
            .claim_enrollment(&enrollment, at(10, 0), at(10, 1))
            .await
            .unwrap();
        assert!(winner.is_some());
        let loser = h
            .store
            .claim_enrollment(&enrollment, at(10, 0), at(10, 1))
            .await
            .unwrap();
        assert!(loser.is_none());
    }

    #[tokio::test]
    async fn test_paused_workflow_is_not_ticked() {
        let h = Harness::new();
        let (_, enrollment) = enrolled(&h, json!([{ "id": "s", "type": "START" }])).await;
        h.store
            .set_workflow_status(enrollment.workflow_id, WorkflowStatus::Paused)
            .await;

        let summary = process_workflows(&h.services, at(10, 0)).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 0);

        let untouched = reload(&h, enrollment.id).await;
        assert_eq!(untouched.version, enrollment.version);
        assert_eq!(untouched.next_action_at, enrollment.next_action_at);
    }

    #[tokio::test]
    async fn test_assign_auto_rotates_and_named_agent_reassigns() {
        let h = Harness::new();
        let first = agent(h.tenant_id, "First", None, at(0, 0));
        let named = agent(h.tenant_id, "Named", Some(at(1, 0)), at(0, 0));
        h.store.insert_agent(first.clone()).await;
        h.store.insert_agent(named.clone()).await;

        let (lead, _) = enrolled(
            &h,
            json!([
                { "id": "auto", "type": "ASSIGN", "agentId": "auto" },
                { "id": "pick", "type": "ASSIGN", "agentId": named.id.to_string() }
            ]),
        )
        .await;

        process_workflows(&h.services, at(10, 0)).await.unwrap();
        let active = h.store.active_assignment(lead.id).await.unwrap().unwrap();
        assert_eq!(active.agent_id, first.id);
        assert_eq!(h.store.find_agent(first.id).await.unwrap().unwrap().total_leads, 1);

        process_workflows(&h.services, at(10, 1)).await.unwrap();
        let history = h.store.assignment_history(lead.id).await.unwrap();
        let active: Vec<_> = history
            .iter()
            .filter(|r| r.status == AssignmentStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].agent_id, named.id);
        // the named path does not touch rotation counters
        let named_after = h.store.find_agent(named.id).await.unwrap().unwrap();
        assert_eq!(named_after.total_leads, named.total_leads);
    }

    #[tokio::test]
    async fn test_lead_created_trigger_enrolls_into_active_workflows() {
        let h = Harness::new();
        let lead = seed_lead(&h, "n@example.com").await;
        let welcome = workflow(h.tenant_id, json!([{ "id": "s", "type": "START" }]), WorkflowStatus::Active);
        let paused = workflow(h.tenant_id, json!([{ "id": "s", "type": "START" }]), WorkflowStatus::Paused);
        let mut manual = workflow(h.tenant_id, json!([{ "id": "s", "type": "START" }]), WorkflowStatus::Active);
        manual.trigger.0.trigger_type = TriggerType::Manual;
        for wf in [welcome, paused, manual] {
            h.store.insert_workflow(wf).await;
        }

        let created = enroll_on_lead_created(&h.services, h.tenant_id, lead.id, at(9, 0))
            .await
            .unwrap();
        assert_eq!(created, 1);
        let again = enroll_on_lead_created(&h.services, h.tenant_id, lead.id, at(9, 1))
            .await
            .unwrap();
        assert_eq!(again, 0);
    }
}
