//! Conversation registry.
//!
//! Owns every [`ConversationRecord`] and is the only place their status
//! changes. The table is bounded both by age (`expiry_window`) and by size
//! (`max_conversations`); eviction runs inside the same critical section as
//! the registration that triggered it. Callers only ever see clones.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use murmur_core::{Clock, RegistryConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::keywords::extract_keywords;
use crate::types::{ConversationStatus, RoutingDecision, SessionId};

// =============================================================================
// ConversationRecord
// =============================================================================

/// Bookkeeping for one conversation.
///
/// Invariants: `commands.len() == turn_count`, `last_active_at >= created_at`,
/// and `topic_keywords` contains the keywords of every entry in `commands`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRecord {
    pub session_id: SessionId,
    status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Caller-supplied tag, e.g. "plan" or "edit".
    pub task_kind: String,
    /// Every command routed here, oldest first.
    pub commands: Vec<String>,
    pub topic_keywords: BTreeSet<String>,
    pub working_directory: PathBuf,
    pub turn_count: u32,
    /// When the in-flight turn started. Only set while `Active`.
    active_since: Option<DateTime<Utc>>,
}

impl ConversationRecord {
    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn is_routable(&self) -> bool {
        self.status == ConversationStatus::Idle
    }

    /// Time since the last successful turn, never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_active_at).max(Duration::zero())
    }
}

// =============================================================================
// ConversationRegistry
// =============================================================================

/// Thread-safe, size- and age-bounded conversation table.
pub struct ConversationRegistry {
    records: Mutex<HashMap<SessionId, ConversationRecord>>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
}

impl ConversationRegistry {
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, ConversationRecord>>, SessionError> {
        self.records
            .lock()
            .map_err(|e| SessionError::LockPoisoned(e.to_string()))
    }

    /// Record a brand-new conversation after its first successful turn.
    ///
    /// The record starts `Idle` with one turn. Fails if the id is already
    /// present, which means the caller reused a session id.
    pub fn register(
        &self,
        session_id: SessionId,
        command: &str,
        task_kind: &str,
        working_directory: &Path,
    ) -> Result<ConversationRecord, SessionError> {
        let mut records = self.lock()?;
        if records.contains_key(&session_id) {
            return Err(SessionError::DuplicateSession(session_id));
        }

        let now = self.clock.now();
        let record = ConversationRecord {
            session_id: session_id.clone(),
            status: ConversationStatus::Idle,
            created_at: now,
            last_active_at: now,
            task_kind: task_kind.to_string(),
            commands: vec![command.to_string()],
            topic_keywords: extract_keywords(command),
            working_directory: working_directory.to_path_buf(),
            turn_count: 1,
            active_since: None,
        };
        records.insert(session_id.clone(), record.clone());
        info!(
            session_id = %session_id,
            task_kind,
            keywords = record.topic_keywords.len(),
            "Conversation registered"
        );

        evict(&mut records, now, &self.config);
        Ok(record)
    }

    /// Fold a successful turn into an existing conversation.
    ///
    /// Unknown ids are ignored: the record may have been evicted while the
    /// turn was running.
    pub fn update_after_turn(&self, session_id: &SessionId, command: &str) {
        let Some(mut records) = self.lock_or_warn("update_after_turn") else {
            return;
        };
        let now = self.clock.now();
        let Some(record) = records.get_mut(session_id) else {
            debug!(session_id = %session_id, "Turn completed for unknown conversation; ignoring");
            return;
        };

        record.commands.push(command.to_string());
        record.topic_keywords.extend(extract_keywords(command));
        record.last_active_at = now.max(record.last_active_at);
        record.turn_count += 1;
        record.status = ConversationStatus::Idle;
        record.active_since = None;
        debug!(
            session_id = %session_id,
            turn_count = record.turn_count,
            keywords = record.topic_keywords.len(),
            "Conversation updated"
        );
    }

    /// Claim a conversation for a turn in flight.
    ///
    /// Returns true only for the idle to active transition. A conversation that
    /// is already active, errored or unknown is left as it is.
    pub fn mark_active(&self, session_id: &SessionId) -> bool {
        let Some(mut records) = self.lock_or_warn("mark_active") else {
            return false;
        };
        let now = self.clock.now();
        let Some(record) = records.get_mut(session_id) else {
            debug!(session_id = %session_id, "mark_active on unknown conversation; ignoring");
            return false;
        };
        claim(record, now)
    }

    /// Route against the routable snapshot and claim the chosen target, under
    /// one lock acquisition.
    ///
    /// `choose` sees exactly what [`routable_conversations`](Self::routable_conversations)
    /// would return. A `Resume` target is flipped to `Active` before the lock is
    /// released, so two concurrent callers can never both resume it. A target
    /// that cannot be claimed turns the decision into a new conversation.
    pub fn route_and_claim<F>(&self, choose: F) -> RoutingDecision
    where
        F: FnOnce(&[ConversationRecord], DateTime<Utc>) -> RoutingDecision,
    {
        let now = self.clock.now();
        let Some(mut records) = self.lock_or_warn("route_and_claim") else {
            return choose(&[], now);
        };
        let snapshot = routable_snapshot(&records, now, self.config.expiry_window());
        let decision = choose(&snapshot, now);

        let Some(target) = decision.target.clone().filter(|_| decision.is_resume()) else {
            return decision;
        };
        let claimed = records.get_mut(&target).is_some_and(|record| claim(record, now));
        match claimed {
            true => decision,
            false => {
                warn!(session_id = %target, "Routed target could not be claimed; starting new");
                RoutingDecision::new_conversation(
                    1.0 - decision.confidence,
                    format!("target {} no longer available", target),
                )
            }
        }
    }

    /// Flag a conversation whose turn failed. It will never be routed again.
    pub fn mark_errored(&self, session_id: &SessionId) {
        let Some(mut records) = self.lock_or_warn("mark_errored") else {
            return;
        };
        let Some(record) = records.get_mut(session_id) else {
            debug!(session_id = %session_id, "mark_errored on unknown conversation; ignoring");
            return;
        };
        record.status = ConversationStatus::Errored;
        record.active_since = None;
        warn!(session_id = %session_id, "Conversation errored");
    }

    /// Snapshot of every idle, unexpired conversation.
    ///
    /// Sorted most recently active first, so equal routing scores favor the
    /// latest conversation.
    pub fn routable_conversations(&self) -> Vec<ConversationRecord> {
        let Some(records) = self.lock_or_warn("routable_conversations") else {
            return vec![];
        };
        routable_snapshot(&records, self.clock.now(), self.config.expiry_window())
    }

    /// Look up a conversation by id.
    pub fn get(&self, session_id: &SessionId) -> Option<ConversationRecord> {
        self.lock_or_warn("get")?.get(session_id).cloned()
    }

    /// Number of retained conversations, in any status.
    pub fn len(&self) -> usize {
        self.lock_or_warn("len").map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark conversations whose turn has been in flight longer than
    /// `max_age` as errored, returning their ids.
    ///
    /// Nothing calls this implicitly; a stuck turn otherwise keeps its
    /// conversation `Active` until the caller reports back.
    pub fn reap_stale_active(&self, max_age: Duration) -> Vec<SessionId> {
        let Some(mut records) = self.lock_or_warn("reap_stale_active") else {
            return vec![];
        };
        let now = self.clock.now();

        let mut reaped = Vec::new();
        for record in records.values_mut() {
            if record.status != ConversationStatus::Active {
                continue;
            }
            let since = record.active_since.unwrap_or(record.last_active_at);
            if now - since > max_age {
                record.status = ConversationStatus::Errored;
                record.active_since = None;
                reaped.push(record.session_id.clone());
            }
        }

        if !reaped.is_empty() {
            warn!(count = reaped.len(), "Stale active conversations marked errored");
        }
        reaped.sort();
        reaped
    }

    fn lock_or_warn(
        &self,
        operation: &'static str,
    ) -> Option<MutexGuard<'_, HashMap<SessionId, ConversationRecord>>> {
        match self.lock() {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(operation, error = %e, "Registry unavailable");
                None
            }
        }
    }
}

/// Drop expired conversations, then the oldest ones until the size bound holds.
///
/// Capacity eviction does not spare `Active` conversations; a turn still
/// running on an evicted conversation later reports into a no-op.
fn evict(
    records: &mut HashMap<SessionId, ConversationRecord>,
    now: DateTime<Utc>,
    config: &RegistryConfig,
) {
    // A window reaching past the earliest representable time expires nothing.
    let before = records.len();
    if let Some(cutoff) = now.checked_sub_signed(config.expiry_window()) {
        records.retain(|_, r| r.last_active_at >= cutoff);
    }
    let expired = before - records.len();

    let mut evicted_for_capacity = 0;
    if records.len() > config.max_conversations {
        let mut by_age: Vec<(DateTime<Utc>, SessionId)> = records
            .values()
            .map(|r| (r.last_active_at, r.session_id.clone()))
            .collect();
        by_age.sort();

        let excess = records.len() - config.max_conversations;
        for (_, id) in by_age.into_iter().take(excess) {
            if let Some(removed) = records.remove(&id) {
                if removed.status == ConversationStatus::Active {
                    warn!(session_id = %id, "Evicted conversation with a turn in flight");
                }
                evicted_for_capacity += 1;
            }
        }
    }

    if expired > 0 || evicted_for_capacity > 0 {
        debug!(
            expired,
            evicted_for_capacity,
            remaining = records.len(),
            "Registry eviction"
        );
    }
}

/// Idle, unexpired conversations, most recently active first.
fn routable_snapshot(
    records: &HashMap<SessionId, ConversationRecord>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<ConversationRecord> {
    let mut routable: Vec<ConversationRecord> = records
        .values()
        .filter(|r| r.is_routable() && now - r.last_active_at <= window)
        .cloned()
        .collect();
    routable.sort_by(|a, b| {
        b.last_active_at
            .cmp(&a.last_active_at)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    routable
}

fn claim(record: &mut ConversationRecord, now: DateTime<Utc>) -> bool {
    match record.status {
        ConversationStatus::Idle => {
            record.status = ConversationStatus::Active;
            record.active_since = Some(now);
            debug!(session_id = %record.session_id, "Conversation active");
            true
        }
        ConversationStatus::Active => false,
        ConversationStatus::Errored => {
            warn!(session_id = %record.session_id, "Refusing to reactivate errored conversation");
            false
        }
    }
}
