//! Per-actor execution sequencing: the busy flag, the pending-input
//! buffer, and delayed execution timers.
//!
//! Time is an explicit millisecond clock advanced by the caller; due
//! events pop off a heap ordered by (due time, push order), so runs are
//! deterministic. Timers are addressed by an (actor, keyword) token:
//! re-scheduling the same key bumps the token and strands the old heap
//! entries, which are skipped when they surface.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, VecDeque};

use mudworld::EntityId;

use crate::cmd::Invocation;

/// Pending-input buffer bound per actor. Input past the cap is rejected
/// with a queue-full diagnostic.
pub const PENDING_INPUT_MAX: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Execute,
    Cleanup,
}

#[derive(Debug, Clone)]
struct TimerEvent {
    due_ms: u64,
    seq: u64,
    actor: EntityId,
    keyword: String,
    token: u64,
    phase: Phase,
}

impl PartialEq for TimerEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}
impl Eq for TimerEvent {}
impl PartialOrd for TimerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.due_ms.cmp(&other.due_ms) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            o => o,
        }
    }
}

/// The one in-flight timed action an actor may have.
#[derive(Debug)]
pub struct TimedAction {
    pub keyword: String,
    pub inv: Invocation,
    token: u64,
    pub executed: bool,
    pub cleaned: bool,
}

/// Current action text (empty = idle) plus the FIFO pending buffer.
#[derive(Debug, Default)]
pub struct SessionState {
    pub current_action: String,
    pub pending: VecDeque<String>,
}

impl SessionState {
    pub fn is_busy(&self) -> bool {
        !self.current_action.is_empty()
    }
}

/// A due unit of work for the interpreter to run.
#[derive(Debug)]
pub enum DueAction {
    Execute { actor: EntityId, inv: Invocation },
    Cleanup { actor: EntityId, spec_idx: usize },
}

#[derive(Default)]
pub struct Scheduler {
    now_ms: u64,
    next_seq: u64,
    next_token: u64,
    events: BinaryHeap<Reverse<TimerEvent>>,
    live: HashMap<(EntityId, String), u64>,
    timed: HashMap<EntityId, TimedAction>,
    sessions: HashMap<EntityId, SessionState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    pub fn session(&self, actor: EntityId) -> Option<&SessionState> {
        self.sessions.get(&actor)
    }

    pub fn is_busy(&self, actor: EntityId) -> bool {
        self.sessions.get(&actor).is_some_and(|s| s.is_busy())
    }

    /// Mark the actor busy on this input. If the input was already at the
    /// buffer head (a continuation resubmit), consume the head.
    pub fn begin(&mut self, actor: EntityId, raw: &str) {
        let ss = self.sessions.entry(actor).or_default();
        if ss.pending.front().is_some_and(|h| h == raw) {
            ss.pending.pop_front();
        }
        ss.current_action = raw.to_string();
    }

    pub fn idle(&mut self, actor: EntityId) {
        if let Some(ss) = self.sessions.get_mut(&actor) {
            ss.current_action.clear();
        }
    }

    /// Append to the pending buffer; false once the cap is hit.
    pub fn enqueue(&mut self, actor: EntityId, raw: &str) -> bool {
        let ss = self.sessions.entry(actor).or_default();
        if ss.pending.len() >= PENDING_INPUT_MAX {
            return false;
        }
        ss.pending.push_back(raw.to_string());
        true
    }

    pub fn peek_pending(&self, actor: EntityId) -> Option<String> {
        self.sessions
            .get(&actor)
            .and_then(|s| s.pending.front().cloned())
    }

    pub fn drop_head_if(&mut self, actor: EntityId, raw: &str) {
        if let Some(ss) = self.sessions.get_mut(&actor) {
            if ss.pending.front().is_some_and(|h| h == raw) {
                ss.pending.pop_front();
            }
        }
    }

    pub fn clear_pending(&mut self, actor: EntityId) -> usize {
        self.sessions
            .get_mut(&actor)
            .map(|s| {
                let n = s.pending.len();
                s.pending.clear();
                n
            })
            .unwrap_or(0)
    }

    pub fn drop_session(&mut self, actor: EntityId) {
        self.sessions.remove(&actor);
        if let Some(t) = self.timed.remove(&actor) {
            self.live.remove(&(actor, t.keyword));
        }
    }

    /// Arm the (actor, keyword) timer for an invocation. A repeat request
    /// for the same key replaces the pending timer, never duplicates it.
    pub fn schedule_timed(&mut self, inv: Invocation, startup_ms: u64, cooldown_ms: u64) {
        let actor = inv.actor;
        let keyword = inv.keyword.clone();
        self.next_token += 1;
        let token = self.next_token;
        self.live.insert((actor, keyword.clone()), token);
        self.timed.insert(
            actor,
            TimedAction {
                keyword: keyword.clone(),
                inv,
                token,
                executed: false,
                cleaned: false,
            },
        );

        let total = startup_ms.saturating_add(cooldown_ms);
        self.push_event(startup_ms, actor, &keyword, token, Phase::Execute);
        self.push_event(total, actor, &keyword, token, Phase::Cleanup);
        // Total-duration backstop: cleanup still fires once even if the
        // cooldown-path event is lost to irregular firing. The `cleaned`
        // flag keeps it to exactly one.
        self.push_event(total, actor, &keyword, token, Phase::Cleanup);
    }

    fn push_event(&mut self, delay_ms: u64, actor: EntityId, keyword: &str, token: u64, phase: Phase) {
        self.next_seq += 1;
        self.events.push(Reverse(TimerEvent {
            due_ms: self.now_ms.saturating_add(delay_ms),
            seq: self.next_seq,
            actor,
            keyword: keyword.to_string(),
            token,
            phase,
        }));
    }

    /// Detach and return the actor's in-flight timed action, stranding
    /// its heap events. Used by halt.
    pub fn cancel_timed(&mut self, actor: EntityId) -> Option<TimedAction> {
        let t = self.timed.remove(&actor)?;
        self.live.remove(&(actor, t.keyword.clone()));
        Some(t)
    }

    pub fn has_timed(&self, actor: EntityId) -> bool {
        self.timed.contains_key(&actor)
    }

    /// Non-stale pending execute timers for a key. At most one by
    /// construction; exposed so that invariant is testable.
    pub fn live_timer_count(&self, actor: EntityId, keyword: &str) -> usize {
        let Some(token) = self.live.get(&(actor, keyword.to_string())) else {
            return 0;
        };
        self.events
            .iter()
            .filter(|Reverse(ev)| {
                ev.actor == actor
                    && ev.keyword == keyword
                    && ev.token == *token
                    && ev.phase == Phase::Execute
            })
            .count()
    }

    /// Pop everything due at the current clock, in (due, push) order.
    /// Stale events (replaced or cancelled tokens) are discarded; the
    /// executed/cleaned flags keep each phase to a single emission.
    pub fn collect_due(&mut self) -> Vec<DueAction> {
        let mut out = Vec::new();
        loop {
            let due = match self.events.peek() {
                Some(Reverse(ev)) if ev.due_ms <= self.now_ms => true,
                _ => false,
            };
            if !due {
                break;
            }
            let Reverse(ev) = self.events.pop().expect("peek was Some");

            let key = (ev.actor, ev.keyword.clone());
            if self.live.get(&key) != Some(&ev.token) {
                continue;
            }
            match ev.phase {
                Phase::Execute => {
                    let Some(t) = self.timed.get_mut(&ev.actor) else {
                        continue;
                    };
                    if t.token != ev.token || t.executed {
                        continue;
                    }
                    t.executed = true;
                    out.push(DueAction::Execute {
                        actor: ev.actor,
                        inv: t.inv.clone(),
                    });
                }
                Phase::Cleanup => {
                    let Some(t) = self.timed.get_mut(&ev.actor) else {
                        continue;
                    };
                    if t.token != ev.token || t.cleaned {
                        continue;
                    }
                    t.cleaned = true;
                    let t = self.timed.remove(&ev.actor).expect("just seen");
                    self.live.remove(&key);
                    out.push(DueAction::Cleanup {
                        actor: ev.actor,
                        spec_idx: t.inv.spec_idx,
                    });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(actor: EntityId, keyword: &str) -> Invocation {
        Invocation {
            actor,
            spec_idx: 0,
            keyword: keyword.to_string(),
            raw: keyword.to_string(),
            subject: None,
            target: None,
            supporting: None,
            origin: "holloway.square".to_string(),
            surroundings: Vec::new(),
        }
    }

    #[test]
    fn buffer_is_fifo_and_bounded() {
        let mut s = Scheduler::new();
        assert!(s.enqueue(1, "look"));
        assert!(s.enqueue(1, "say hi"));
        assert_eq!(s.peek_pending(1), Some("look".to_string()));

        for i in 0..PENDING_INPUT_MAX {
            s.enqueue(2, &format!("cmd {i}"));
        }
        assert!(!s.enqueue(2, "one too many"));
        assert_eq!(s.session(2).unwrap().pending.len(), PENDING_INPUT_MAX);
    }

    #[test]
    fn begin_consumes_a_matching_buffer_head_only() {
        let mut s = Scheduler::new();
        s.enqueue(1, "look");
        s.begin(1, "look");
        assert!(s.is_busy(1));
        assert_eq!(s.peek_pending(1), None);

        s.enqueue(1, "say hi");
        s.begin(1, "something else");
        assert_eq!(s.peek_pending(1), Some("say hi".to_string()));
    }

    #[test]
    fn execute_and_cleanup_fire_at_their_delays() {
        let mut s = Scheduler::new();
        s.schedule_timed(inv(1, "forage"), 10_000, 20_000);

        s.advance_to(9_999);
        assert!(s.collect_due().is_empty());

        s.advance_to(10_000);
        let due = s.collect_due();
        assert_eq!(due.len(), 1);
        assert!(matches!(due[0], DueAction::Execute { actor: 1, .. }));

        s.advance_to(29_999);
        assert!(s.collect_due().is_empty());

        s.advance_to(30_000);
        let due = s.collect_due();
        assert_eq!(due.len(), 1, "cleanup must fire exactly once");
        assert!(matches!(due[0], DueAction::Cleanup { actor: 1, .. }));
        assert!(!s.has_timed(1));
    }

    #[test]
    fn cleanup_is_deduplicated_across_both_trigger_paths() {
        let mut s = Scheduler::new();
        s.schedule_timed(inv(1, "forage"), 0, 5_000);
        // Jump straight past the total duration: the execute event, the
        // cooldown-path cleanup and the backstop cleanup all surface in
        // one sweep.
        s.advance_to(60_000);
        let due = s.collect_due();
        let cleanups = due
            .iter()
            .filter(|d| matches!(d, DueAction::Cleanup { .. }))
            .count();
        assert_eq!(cleanups, 1);
    }

    #[test]
    fn rescheduling_a_key_replaces_the_pending_timer() {
        let mut s = Scheduler::new();
        s.schedule_timed(inv(1, "forage"), 10_000, 0);
        s.advance_to(5_000);
        s.schedule_timed(inv(1, "forage"), 10_000, 0);

        assert_eq!(s.live_timer_count(1, "forage"), 1);

        // The stale first timer never fires; the replacement fires once.
        s.advance_to(10_000);
        assert!(s.collect_due().is_empty());
        s.advance_to(15_000);
        let due = s.collect_due();
        assert!(matches!(due[0], DueAction::Execute { actor: 1, .. }));
    }

    #[test]
    fn independent_actors_keep_independent_timers() {
        let mut s = Scheduler::new();
        s.schedule_timed(inv(1, "forage"), 10_000, 0);
        s.schedule_timed(inv(2, "forage"), 20_000, 0);

        s.advance_to(10_000);
        let due = s.collect_due();
        assert_eq!(due.len(), 1);
        assert!(matches!(due[0], DueAction::Execute { actor: 1, .. }));
        assert!(s.has_timed(2));
    }

    #[test]
    fn cancel_strands_all_pending_events() {
        let mut s = Scheduler::new();
        s.schedule_timed(inv(1, "forage"), 10_000, 20_000);
        let t = s.cancel_timed(1).unwrap();
        assert_eq!(t.keyword, "forage");
        assert!(!t.executed);

        s.advance_to(60_000);
        assert!(s.collect_due().is_empty());
    }
}
