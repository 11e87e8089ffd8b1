//! Registry of previewed reorder plans.
//!
//! A plan is registered as `Proposed` when previewed and can be claimed for
//! apply exactly once. Claims are refused for unknown, expired, finished or
//! altered plans, and while another apply of the same plan is in flight.
//!
//! The registry is local to one orchestrator. A plan previewed through one
//! process is unknown to another and must be previewed again there; the
//! queue version check at apply time is what guards the data itself.

use std::collections::HashMap;
use std::time::Duration;

use karaoke_core::error::CoreError;
use karaoke_core::reorder::state_machine::validate_transition;
use karaoke_core::reorder::{PlanId, PlanState, ReorderPlan};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct TrackedPlan {
    plan: ReorderPlan,
    state: PlanState,
    claimed: bool,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct PlanRegistry {
    ttl: Duration,
    plans: Mutex<HashMap<PlanId, TrackedPlan>>,
}

impl PlanRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Register a freshly drafted plan as `Proposed`.
    pub async fn propose(&self, plan: ReorderPlan) -> Result<(), CoreError> {
        validate_transition(PlanState::Drafting, PlanState::Proposed)
            .map_err(CoreError::Internal)?;

        let now = Instant::now();
        let mut plans = self.plans.lock().await;
        plans.retain(|_, tracked| tracked.expires_at > now);
        plans.insert(
            plan.plan_id,
            TrackedPlan {
                plan,
                state: PlanState::Proposed,
                claimed: false,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    /// Reserve `plan` for apply. The body must match the previewed plan.
    pub async fn claim(&self, plan: &ReorderPlan) -> Result<(), CoreError> {
        let mut plans = self.plans.lock().await;
        let Some(tracked) = plans.get_mut(&plan.plan_id) else {
            return Err(unknown_plan(plan.plan_id));
        };
        if tracked.expires_at <= Instant::now() {
            plans.remove(&plan.plan_id);
            return Err(unknown_plan(plan.plan_id));
        }

        match tracked.state {
            PlanState::Proposed => {}
            PlanState::Applied => {
                return Err(CoreError::Validation(format!(
                    "Reorder plan {} was already applied",
                    plan.plan_id
                )))
            }
            PlanState::Rejected => {
                return Err(CoreError::Validation(format!(
                    "Reorder plan {} was rejected and cannot be applied",
                    plan.plan_id
                )))
            }
            PlanState::Drafting => return Err(unknown_plan(plan.plan_id)),
        }
        if tracked.claimed {
            return Err(CoreError::Validation(format!(
                "Reorder plan {} is already being applied",
                plan.plan_id
            )));
        }
        if tracked.plan != *plan {
            return Err(CoreError::Validation(format!(
                "Reorder plan {} does not match the previewed plan",
                plan.plan_id
            )));
        }

        tracked.claimed = true;
        Ok(())
    }

    /// Move a claimed plan to its final state (`Applied` or `Rejected`).
    pub async fn finish(&self, plan_id: PlanId, outcome: PlanState) -> Result<(), CoreError> {
        let mut plans = self.plans.lock().await;
        let tracked = plans.get_mut(&plan_id).ok_or_else(|| unknown_plan(plan_id))?;
        validate_transition(tracked.state, outcome).map_err(CoreError::Validation)?;
        tracked.state = outcome;
        tracked.claimed = false;
        Ok(())
    }

    /// Give a claim back without finishing the plan, so apply can be retried.
    pub async fn release(&self, plan_id: PlanId) {
        if let Some(tracked) = self.plans.lock().await.get_mut(&plan_id) {
            tracked.claimed = false;
        }
    }

    pub async fn state(&self, plan_id: PlanId) -> Option<PlanState> {
        self.plans.lock().await.get(&plan_id).map(|t| t.state)
    }
}

fn unknown_plan(plan_id: PlanId) -> CoreError {
    CoreError::Validation(format!(
        "Reorder plan {plan_id} is unknown or has expired; preview again"
    ))
}
