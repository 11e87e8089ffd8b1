//! Queue orchestration: autoplay, the now-playing transition, reorder
//! plans, request intake and presence updates for live karaoke events.
//!
//! Every mutation commits through the [`QueueStore`] first and is then
//! published to the [`BroadcastSink`]. Publishing is fire-and-forget: a
//! failed publish is logged and the committed change stands.

use std::collections::HashMap;
use std::slice;
use std::sync::Arc;

use karaoke_core::autoplay::{walk_queue, HoldDecision};
use karaoke_core::eligibility::{is_eligible, EligibilityMode};
use karaoke_core::error::CoreError;
use karaoke_core::event::Event;
use karaoke_core::presence::{
    relevant_user_names, AttendanceChange, EventAttendance, PresenceFacts, SingerFlags,
    SingerStatus, SingerStatusPatch,
};
use karaoke_core::queue::{HoldReason, NewQueueEntry, QueueEntry, QueueFilter};
use karaoke_core::reorder::{
    propose_balanced, validate_moves, warnings_for_moves, AppliedReorder, PlanState, PositionMove,
    ReorderPlan,
};
use karaoke_core::singer::{named_singers, normalize_singers};
use karaoke_core::status::resolve;
use karaoke_core::types::{DbId, Timestamp};
use karaoke_events::{BroadcastSink, EventBus, QueueAction};
use serde::Serialize;
use validator::Validate;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::hold_cache::{EventHolds, HoldReasonCache};
use crate::identity::{IdentityLookup, IdentityMap, PgIdentityLookup};
use crate::payload::{resolve_entries, ResolvedEntry};
use crate::plans::PlanRegistry;
use crate::store::{entry_not_found, event_not_found, FinishOutcome, PgQueueStore, QueueStore};

/// Result of an autoplay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoplayOutcome {
    /// `entry` is now the event's only playing entry.
    Selected {
        entry: ResolvedEntry,
        held: Vec<HoldDecision>,
    },
    /// Nothing in the queue can be played right now.
    NoneEligible { held: Vec<HoldDecision> },
}

impl AutoplayOutcome {
    pub fn selected(&self) -> Option<&ResolvedEntry> {
        match self {
            Self::Selected { entry, .. } => Some(entry),
            Self::NoneEligible { .. } => None,
        }
    }

    pub fn held(&self) -> &[HoldDecision] {
        match self {
            Self::Selected { held, .. } | Self::NoneEligible { held } => held,
        }
    }
}

pub struct QueueOrchestrator {
    store: Arc<dyn QueueStore>,
    sink: Arc<dyn BroadcastSink>,
    identity: Arc<dyn IdentityLookup>,
    holds: HoldReasonCache,
    plans: PlanRegistry,
    config: EngineConfig,
}

impl QueueOrchestrator {
    pub fn new(
        store: Arc<dyn QueueStore>,
        sink: Arc<dyn BroadcastSink>,
        identity: Arc<dyn IdentityLookup>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            sink,
            identity,
            holds: HoldReasonCache::new(),
            plans: PlanRegistry::new(config.plan_ttl),
            config,
        }
    }

    /// Publish to a fresh [`EventBus`] sized by `config.event_bus_capacity`.
    pub fn with_event_bus(
        store: Arc<dyn QueueStore>,
        identity: Arc<dyn IdentityLookup>,
        config: EngineConfig,
    ) -> (Self, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(config.event_bus_capacity));
        let engine = Self::new(store, bus.clone(), identity, config);
        (engine, bus)
    }

    /// Connect to the database named by `config` and wire the Postgres store
    /// and user directory.
    pub async fn connect_postgres(config: EngineConfig) -> EngineResult<(Self, Arc<EventBus>)> {
        let store = PgQueueStore::connect(&config).await?;
        let identity = PgIdentityLookup::new(store.pool().clone());
        Ok(Self::with_event_bus(
            Arc::new(store),
            Arc::new(identity),
            config,
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hold_reasons(&self) -> &HoldReasonCache {
        &self.holds
    }

    pub fn plans(&self) -> &PlanRegistry {
        &self.plans
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every entry of the event, resolved from one bulk presence fetch.
    pub async fn queue_snapshot(&self, event_id: DbId) -> EngineResult<Vec<ResolvedEntry>> {
        self.require_event(event_id).await?;
        let entries = self
            .store
            .get_queue_entries(event_id, QueueFilter::All)
            .await?;
        self.resolve(event_id, &entries).await
    }

    pub async fn get_entry(&self, event_id: DbId, queue_id: DbId) -> EngineResult<ResolvedEntry> {
        let entry = self.require_entry(event_id, queue_id).await?;
        let mut resolved = self.resolve(event_id, slice::from_ref(&entry)).await?;
        resolved
            .pop()
            .ok_or_else(|| CoreError::Internal(format!("Queue entry {queue_id} did not resolve")).into())
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Add a song request to the end of a live event's queue.
    pub async fn add_entry(
        &self,
        event_id: DbId,
        request: NewQueueEntry,
    ) -> EngineResult<ResolvedEntry> {
        request.validate()?;
        self.require_live_event(event_id).await?;

        let singers = normalize_singers(&request.requestor, request.singers);
        let entry = self
            .store
            .append_entry(event_id, &request.requestor, &request.song_id, &singers)
            .await?;
        tracing::info!(
            event_id,
            queue_id = entry.id,
            requestor = %entry.requestor,
            position = entry.position,
            "Song request added",
        );

        let resolved = self.resolve_committed(&entry).await;
        self.publish_entry(event_id, &resolved, QueueAction::Added);
        Ok(resolved)
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Pick the next playable entry.
    ///
    /// Walks unplayed entries in play order. Each entry passed over is held
    /// with the reason it failed eligibility, and its `Held` event goes out
    /// before the winner's `Playing` event. Entries on a manual hold are
    /// left alone. Hold marking is best effort: a failed write is logged and
    /// the walk continues.
    pub async fn autoplay_next(
        &self,
        event_id: DbId,
        mode: Option<EligibilityMode>,
    ) -> EngineResult<AutoplayOutcome> {
        let mode = mode.unwrap_or(self.config.autoplay_mode);
        self.require_live_event(event_id).await?;

        let holds = self.holds.snapshot(event_id).await;
        let entries: Vec<QueueEntry> = self
            .store
            .get_queue_entries(event_id, QueueFilter::Unplayed)
            .await?
            .into_iter()
            .filter(|e| !is_manually_held(e, &holds))
            .collect();
        let facts = self.load_presence(event_id, &entries).await?;

        let walk = walk_queue(&entries, &facts, mode);
        tracing::debug!(
            event_id,
            mode = mode.as_str(),
            candidates = entries.len(),
            holds = walk.holds.len(),
            selected = ?walk.selected,
            "Autoplay walk finished",
        );

        if !walk.holds.is_empty() {
            let identities = self.load_identities(&entries).await;
            let by_id: HashMap<DbId, &QueueEntry> = entries.iter().map(|e| (e.id, e)).collect();
            for decision in &walk.holds {
                if let Some(entry) = by_id.get(&decision.queue_id) {
                    self.apply_autoplay_hold(entry, decision, &facts, &identities, mode)
                        .await;
                }
            }
        }

        match walk.selected {
            Some(queue_id) => {
                let entry = self.set_currently_playing(event_id, queue_id).await?;
                Ok(AutoplayOutcome::Selected {
                    entry,
                    held: walk.holds,
                })
            }
            None => {
                tracing::info!(event_id, held = walk.holds.len(), "No eligible songs");
                Ok(AutoplayOutcome::NoneEligible { held: walk.holds })
            }
        }
    }

    async fn apply_autoplay_hold(
        &self,
        entry: &QueueEntry,
        decision: &HoldDecision,
        facts: &PresenceFacts,
        identities: &IdentityMap,
        mode: EligibilityMode,
    ) {
        let event_id = entry.event_id;
        let updated = match self.store.set_hold(event_id, entry.id, true).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    event_id,
                    queue_id = entry.id,
                    reason = decision.reason.as_str(),
                    error = %e,
                    "Failed to mark entry held",
                );
                return;
            }
        };

        let previous = self.holds.record(event_id, entry.id, decision.reason).await;
        let unchanged = entry.is_on_break && previous == Some(decision.reason);
        if unchanged && self.config.suppress_unchanged_holds {
            tracing::debug!(event_id, queue_id = entry.id, "Hold unchanged, not republished");
            return;
        }

        tracing::info!(
            event_id,
            queue_id = entry.id,
            reason = decision.reason.as_str(),
            "Entry held",
        );
        let resolved = ResolvedEntry::new(
            &updated,
            resolve(&updated, facts, Some(decision.reason)),
            is_eligible(&updated, facts, mode).eligible,
            identities,
        );
        self.publish_entry(event_id, &resolved, QueueAction::Held);
    }

    /// Make `queue_id` the event's only playing entry.
    pub async fn set_currently_playing(
        &self,
        event_id: DbId,
        queue_id: DbId,
    ) -> EngineResult<ResolvedEntry> {
        let entry = self.store.clear_and_set_playing(event_id, queue_id).await?;
        self.holds.clear(event_id, queue_id).await;
        tracing::info!(event_id, queue_id, song_id = %entry.song_id, "Now playing");

        let resolved = self.resolve_committed(&entry).await;
        self.publish_entry(event_id, &resolved, QueueAction::Playing);
        Ok(resolved)
    }

    /// Mark an entry as sung.
    pub async fn complete_entry(
        &self,
        event_id: DbId,
        queue_id: DbId,
    ) -> EngineResult<ResolvedEntry> {
        self.finish(event_id, queue_id, FinishOutcome::Sung).await
    }

    /// Mark an entry as skipped.
    pub async fn skip_entry(&self, event_id: DbId, queue_id: DbId) -> EngineResult<ResolvedEntry> {
        self.finish(event_id, queue_id, FinishOutcome::Skipped).await
    }

    async fn finish(
        &self,
        event_id: DbId,
        queue_id: DbId,
        outcome: FinishOutcome,
    ) -> EngineResult<ResolvedEntry> {
        let entry = self.store.finish_entry(event_id, queue_id, outcome).await?;
        self.holds.clear(event_id, queue_id).await;
        tracing::info!(event_id, queue_id, outcome = ?outcome, "Entry finished");

        let action = match outcome {
            FinishOutcome::Sung => QueueAction::Sung,
            FinishOutcome::Skipped => QueueAction::Skipped,
        };
        let resolved = self.resolve_committed(&entry).await;
        self.publish_entry(event_id, &resolved, action);
        Ok(resolved)
    }

    /// Put a manual hold on an entry. Autoplay passes over it until released.
    pub async fn hold_entry(&self, event_id: DbId, queue_id: DbId) -> EngineResult<ResolvedEntry> {
        let entry = self.store.set_hold(event_id, queue_id, true).await?;
        self.holds.record(event_id, queue_id, HoldReason::OnHold).await;
        tracing::info!(event_id, queue_id, "Entry put on hold");

        let resolved = self.resolve_committed(&entry).await;
        self.publish_entry(event_id, &resolved, QueueAction::Held);
        Ok(resolved)
    }

    /// Lift any hold on an entry.
    pub async fn release_entry(
        &self,
        event_id: DbId,
        queue_id: DbId,
    ) -> EngineResult<ResolvedEntry> {
        let entry = self.store.set_hold(event_id, queue_id, false).await?;
        self.holds.clear(event_id, queue_id).await;
        tracing::info!(event_id, queue_id, "Entry released");

        let resolved = self.resolve_committed(&entry).await;
        self.publish_entry(event_id, &resolved, QueueAction::Released);
        Ok(resolved)
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Compare-and-swap update of a singer's flags.
    ///
    /// With `expected = None` the current row (if any) is read and its
    /// `updated_at` used as the expected token. A stale token fails with
    /// `SingerStatusConflict` carrying the current row.
    pub async fn update_singer_status(
        &self,
        event_id: DbId,
        user_name: &str,
        patch: SingerStatusPatch,
        expected: Option<Timestamp>,
    ) -> EngineResult<SingerStatus> {
        self.require_event(event_id).await?;
        let current = self.current_singer_status(event_id, user_name).await?;
        if let (Some(current), Some(expected)) = (&current, expected) {
            if current.updated_at != expected {
                return Err(CoreError::SingerStatusConflict {
                    current: Box::new(current.clone()),
                }
                .into());
            }
        }

        let flags = patch.apply(current.as_ref().map(SingerStatus::flags));
        let token = expected.or(current.as_ref().map(|c| c.updated_at));
        let saved = self
            .store
            .save_singer_status(event_id, user_name, flags, token)
            .await?;
        tracing::info!(
            event_id,
            user_name,
            is_logged_in = flags.is_logged_in,
            is_joined = flags.is_joined,
            is_on_break = flags.is_on_break,
            available = flags.is_available(),
            "Singer status updated",
        );

        self.publish_singer(event_id, user_name, saved.flags());
        self.refresh_presence_holds(event_id, user_name).await;
        Ok(saved)
    }

    /// Compare-and-swap attendance change for a requestor.
    ///
    /// Check-in and check-out also flip `is_active` on the requestor's
    /// unfinished entries in the same write.
    pub async fn record_attendance(
        &self,
        event_id: DbId,
        user_name: &str,
        change: AttendanceChange,
        expected: Option<Timestamp>,
    ) -> EngineResult<EventAttendance> {
        self.require_event(event_id).await?;
        let names = [user_name.to_string()];
        let current = self.store.get_attendance(event_id, &names).await?.pop();
        if let (Some(current), Some(expected)) = (&current, expected) {
            if current.updated_at != expected {
                return Err(CoreError::AttendanceConflict {
                    current: Box::new(current.clone()),
                }
                .into());
            }
        }

        let state = change.apply(current.as_ref(), chrono::Utc::now());
        let entries_active = match change {
            AttendanceChange::CheckIn => Some(true),
            AttendanceChange::CheckOut => Some(false),
            AttendanceChange::StartBreak | AttendanceChange::EndBreak => None,
        };
        let token = expected.or(current.as_ref().map(|c| c.updated_at));
        let saved = self
            .store
            .save_attendance(event_id, user_name, state, token, entries_active)
            .await?;
        tracing::info!(
            event_id,
            user_name,
            change = change.as_str(),
            is_checked_in = saved.is_checked_in,
            is_on_break = saved.is_on_break,
            "Attendance updated",
        );

        let flags = match self.current_singer_status(event_id, user_name).await {
            Ok(status) => status.map(|s| s.flags()).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(event_id, user_name, error = %e, "Failed to read singer status");
                SingerFlags::default()
            }
        };
        self.publish_singer(
            event_id,
            user_name,
            SingerFlags {
                is_on_break: flags.is_on_break || saved.is_on_break,
                ..flags
            },
        );
        self.refresh_presence_holds(event_id, user_name).await;
        Ok(saved)
    }

    pub async fn check_in(&self, event_id: DbId, user_name: &str) -> EngineResult<EventAttendance> {
        self.record_attendance(event_id, user_name, AttendanceChange::CheckIn, None)
            .await
    }

    pub async fn check_out(&self, event_id: DbId, user_name: &str) -> EngineResult<EventAttendance> {
        self.record_attendance(event_id, user_name, AttendanceChange::CheckOut, None)
            .await
    }

    pub async fn start_break(
        &self,
        event_id: DbId,
        user_name: &str,
    ) -> EngineResult<EventAttendance> {
        self.record_attendance(event_id, user_name, AttendanceChange::StartBreak, None)
            .await
    }

    pub async fn end_break(&self, event_id: DbId, user_name: &str) -> EngineResult<EventAttendance> {
        self.record_attendance(event_id, user_name, AttendanceChange::EndBreak, None)
            .await
    }

    /// Re-check presence holds on unplayed entries naming `user_name` after
    /// a presence write commits.
    ///
    /// An entry that is now eligible is released, one still blocked for a
    /// different reason gets the new reason. Manual holds are left alone.
    /// Best effort: failures are logged and the presence write stands.
    async fn refresh_presence_holds(&self, event_id: DbId, user_name: &str) {
        let holds = self.holds.snapshot(event_id).await;
        if holds.is_empty() {
            return;
        }
        let entries: Vec<QueueEntry> = match self
            .store
            .get_queue_entries(event_id, QueueFilter::Unplayed)
            .await
        {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| named_singers(&e.singers).any(|name| name == user_name))
                .filter(|e| holds.get(e.id).is_some_and(|r| r != HoldReason::OnHold))
                .collect(),
            Err(e) => {
                tracing::warn!(event_id, user_name, error = %e, "Failed to load held entries");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        let facts = match self.load_presence(event_id, &entries).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(event_id, user_name, error = %e, "Failed to reload presence");
                return;
            }
        };
        let identities = self.load_identities(&entries).await;

        for entry in &entries {
            let eligibility = is_eligible(entry, &facts, self.config.autoplay_mode);
            match eligibility.hold_reason {
                None => self.lift_presence_hold(entry, &facts, &identities).await,
                Some(reason) if holds.get(entry.id) != Some(reason) => {
                    self.holds.record(event_id, entry.id, reason).await;
                    tracing::info!(
                        event_id,
                        queue_id = entry.id,
                        reason = reason.as_str(),
                        "Hold reason changed",
                    );
                    let resolved = ResolvedEntry::new(
                        entry,
                        resolve(entry, &facts, Some(reason)),
                        false,
                        &identities,
                    );
                    self.publish_entry(event_id, &resolved, QueueAction::Held);
                }
                Some(_) => {}
            }
        }
    }

    async fn lift_presence_hold(
        &self,
        entry: &QueueEntry,
        facts: &PresenceFacts,
        identities: &IdentityMap,
    ) {
        let event_id = entry.event_id;
        let updated = if entry.is_on_break {
            match self.store.set_hold(event_id, entry.id, false).await {
                Ok(updated) => updated,
                Err(e) => {
                    tracing::warn!(
                        event_id,
                        queue_id = entry.id,
                        error = %e,
                        "Failed to lift presence hold",
                    );
                    return;
                }
            }
        } else {
            entry.clone()
        };
        self.holds.clear(event_id, entry.id).await;
        tracing::info!(event_id, queue_id = entry.id, "Presence hold lifted");

        let resolved = ResolvedEntry::new(&updated, resolve(&updated, facts, None), true, identities);
        self.publish_entry(event_id, &resolved, QueueAction::Released);
    }

    // -----------------------------------------------------------------------
    // Reorder plans
    // -----------------------------------------------------------------------

    /// Propose a fairness-balanced order for the unplayed, non-held entries.
    pub async fn preview_reorder(&self, event_id: DbId) -> EngineResult<ReorderPlan> {
        let event = self.require_live_event(event_id).await?;
        let entries = self
            .store
            .get_queue_entries(event_id, QueueFilter::Unplayed)
            .await?;
        let facts = self.load_presence(event_id, &entries).await?;
        let holds = self.holds.snapshot(event_id).await;

        let proposal = propose_balanced(&entries, &facts, |queue_id| holds.get(queue_id));
        let plan = ReorderPlan::new(
            event_id,
            event.queue_version,
            proposal.moves,
            proposal.warnings,
        );
        self.register_plan(&plan).await?;
        Ok(plan)
    }

    /// Validate a DJ-supplied move list and turn it into a plan.
    pub async fn preview_moves(
        &self,
        event_id: DbId,
        moves: Vec<PositionMove>,
    ) -> EngineResult<ReorderPlan> {
        let event = self.require_live_event(event_id).await?;
        let mut entries = self
            .store
            .get_queue_entries(event_id, QueueFilter::All)
            .await?;
        for m in &moves {
            if entries.iter().all(|e| e.id != m.queue_id) {
                if let Some(foreign) = self.store.get_queue_entry(m.queue_id).await? {
                    entries.push(foreign);
                }
            }
        }

        if let Err(e) = validate_moves(event_id, &entries, &moves) {
            tracing::info!(event_id, error = %e, "Reorder draft rejected");
            return Err(e.into());
        }

        let warnings = warnings_for_moves(&entries, &moves);
        let plan = ReorderPlan::new(event_id, event.queue_version, moves, warnings);
        self.register_plan(&plan).await?;
        Ok(plan)
    }

    async fn register_plan(&self, plan: &ReorderPlan) -> EngineResult<()> {
        self.plans.propose(plan.clone()).await?;
        tracing::info!(
            event_id = plan.event_id,
            plan_id = %plan.plan_id,
            version = plan.version,
            moves = plan.moves.len(),
            degraded = plan.is_degraded(),
            "Reorder plan proposed",
        );
        Ok(())
    }

    /// Apply a previewed plan if the queue has not moved on since.
    ///
    /// A version mismatch fails with `StaleVersion` and writes nothing. On
    /// success one batch event is published for the whole plan.
    pub async fn apply_reorder(&self, plan: &ReorderPlan) -> EngineResult<AppliedReorder> {
        plan.validate()?;
        self.plans.claim(plan).await?;

        let result = self
            .store
            .apply_reorder(plan.event_id, plan.version, &plan.moves)
            .await;

        match result {
            Ok(applied_version) => {
                if let Err(e) = self.plans.finish(plan.plan_id, PlanState::Applied).await {
                    tracing::warn!(plan_id = %plan.plan_id, error = %e, "Failed to close plan");
                }
                let moved_ids = plan.moved_ids();
                tracing::info!(
                    event_id = plan.event_id,
                    plan_id = %plan.plan_id,
                    applied_version,
                    moved = moved_ids.len(),
                    "Reorder plan applied",
                );
                if let Err(e) =
                    self.sink
                        .publish_reorder_applied(plan.event_id, applied_version, &moved_ids)
                {
                    tracing::warn!(
                        event_id = plan.event_id,
                        plan_id = %plan.plan_id,
                        error = %e,
                        "Failed to publish reorder",
                    );
                }
                Ok(AppliedReorder {
                    plan_id: plan.plan_id,
                    event_id: plan.event_id,
                    applied_version,
                    moved_count: moved_ids.len(),
                    moved_ids,
                })
            }
            Err(EngineError::Core(e)) => {
                if let Err(finish_err) = self.plans.finish(plan.plan_id, PlanState::Rejected).await {
                    tracing::warn!(plan_id = %plan.plan_id, error = %finish_err, "Failed to close plan");
                }
                tracing::info!(
                    event_id = plan.event_id,
                    plan_id = %plan.plan_id,
                    error = %e,
                    "Reorder plan rejected",
                );
                Err(e.into())
            }
            Err(e) => {
                self.plans.release(plan.plan_id).await;
                tracing::warn!(
                    event_id = plan.event_id,
                    plan_id = %plan.plan_id,
                    error = %e,
                    "Reorder apply failed, plan left open",
                );
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn require_event(&self, event_id: DbId) -> EngineResult<Event> {
        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| event_not_found(event_id))?;
        Ok(event)
    }

    async fn require_live_event(&self, event_id: DbId) -> EngineResult<Event> {
        let event = self.require_event(event_id).await?;
        event.require_live()?;
        Ok(event)
    }

    async fn require_entry(&self, event_id: DbId, queue_id: DbId) -> EngineResult<QueueEntry> {
        let entry = self
            .store
            .get_queue_entry(queue_id)
            .await?
            .filter(|e| e.event_id == event_id)
            .ok_or_else(|| entry_not_found(queue_id))?;
        Ok(entry)
    }

    async fn current_singer_status(
        &self,
        event_id: DbId,
        user_name: &str,
    ) -> EngineResult<Option<SingerStatus>> {
        let names = [user_name.to_string()];
        Ok(self.store.get_singer_statuses(event_id, &names).await?.pop())
    }

    /// One bulk fetch per presence source for everyone `entries` mention.
    async fn load_presence(
        &self,
        event_id: DbId,
        entries: &[QueueEntry],
    ) -> EngineResult<PresenceFacts> {
        let names = relevant_user_names(entries);
        if names.is_empty() {
            return Ok(PresenceFacts::default());
        }
        let statuses = self.store.get_singer_statuses(event_id, &names).await?;
        let attendance = self.store.get_attendance(event_id, &names).await?;
        Ok(PresenceFacts::new(statuses, attendance))
    }

    /// Display names are cosmetic: a failed lookup falls back to user names.
    async fn load_identities(&self, entries: &[QueueEntry]) -> IdentityMap {
        let names = relevant_user_names(entries);
        if names.is_empty() {
            return IdentityMap::new();
        }
        match self.identity.lookup(&names).await {
            Ok(identities) => identities,
            Err(e) => {
                tracing::warn!(error = %e, "Identity lookup failed, using user names");
                IdentityMap::new()
            }
        }
    }

    async fn resolve(
        &self,
        event_id: DbId,
        entries: &[QueueEntry],
    ) -> EngineResult<Vec<ResolvedEntry>> {
        let facts = self.load_presence(event_id, entries).await?;
        let holds = self.holds.snapshot(event_id).await;
        let identities = self.load_identities(entries).await;
        Ok(resolve_entries(
            entries,
            &facts,
            &holds,
            &identities,
            self.config.autoplay_mode,
        ))
    }

    /// Resolve an entry whose change is already committed. Presence read
    /// failures degrade to an empty snapshot instead of failing the call.
    async fn resolve_committed(&self, entry: &QueueEntry) -> ResolvedEntry {
        let facts = match self.load_presence(entry.event_id, slice::from_ref(entry)).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(
                    event_id = entry.event_id,
                    queue_id = entry.id,
                    error = %e,
                    "Presence read failed after commit, payload uses empty presence",
                );
                PresenceFacts::default()
            }
        };
        let cached = self.holds.get(entry.event_id, entry.id).await;
        let identities = self.load_identities(slice::from_ref(entry)).await;
        ResolvedEntry::new(
            entry,
            resolve(entry, &facts, cached),
            is_eligible(entry, &facts, self.config.autoplay_mode).eligible,
            &identities,
        )
    }

    fn publish_entry(&self, event_id: DbId, entry: &ResolvedEntry, action: QueueAction) {
        let payload = match entry.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    event_id,
                    queue_id = entry.queue_id,
                    error = %e,
                    "Failed to serialize queue payload",
                );
                return;
            }
        };
        if let Err(e) = self.sink.publish_queue_changed(event_id, payload, action) {
            tracing::warn!(
                event_id,
                queue_id = entry.queue_id,
                action = action.as_str(),
                error = %e,
                "Failed to publish queue change",
            );
        }
    }

    fn publish_singer(&self, event_id: DbId, user_name: &str, flags: SingerFlags) {
        if let Err(e) = self
            .sink
            .publish_singer_status_changed(event_id, user_name, flags)
        {
            tracing::warn!(event_id, user_name, error = %e, "Failed to publish singer status");
        }
    }
}

/// Manual holds are told apart from presence holds by the in-process reason
/// cache only. After a restart every held entry resolves as `OnHold` but is
/// walked by autoplay again like a presence hold.
fn is_manually_held(entry: &QueueEntry, holds: &EventHolds) -> bool {
    entry.is_on_break && holds.get(entry.id) == Some(HoldReason::OnHold)
}
