//! `mudinterp`: the command interpretation and execution pipeline.
//!
//! Raw input from an actor flows through the resolver (keyword, rank and
//! parameter-shape matching over the registered command table), into the
//! per-actor scheduler (single flight, startup/cooldown delays, pending
//! buffer), and each command body hands its message bundle to the
//! dispatcher for per-recipient delivery.
//!
//! The pipeline is synchronous and deterministic: the caller advances the
//! millisecond clock with [`Interpreter::advance`], and everything due
//! runs inside that call.

pub mod bind;
pub mod cmd;
pub mod commands;
pub mod dispatch;
pub mod resolve;
pub mod sched;

#[cfg(test)]
pub(crate) mod testkit;

use mudworld::{EntityId, WorldIndex};

use cmd::{ExecCtx, Invocation, Outcome, Registry};
use dispatch::OutputSink;
use resolve::{Diag, resolve};
use sched::{DueAction, Scheduler};

pub use cmd::{CmdFlags, CommandSpec, LookupScope, ParamSpec, ParamUsage, RangeClass};
pub use dispatch::{MessageBundle, Paragraph};
pub use resolve::Diag as Diagnostic;
pub use sched::PENDING_INPUT_MAX;

/// The top-level entry point: owns the command table, the per-actor
/// session states and the timer heap. The live-world index and the
/// output channel are borrowed per call, so the world stays shared with
/// whatever else mutates it between ticks.
pub struct Interpreter {
    registry: Registry,
    sched: Scheduler,
    snapshot_radius: u32,
}

impl Interpreter {
    pub fn new(registry: Registry) -> Self {
        let snapshot_radius = registry.snapshot_radius();
        Self {
            registry,
            sched: Scheduler::new(),
            snapshot_radius,
        }
    }

    pub fn with_builtins() -> anyhow::Result<Self> {
        Ok(Self::new(commands::builtin_registry()?))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn now_ms(&self) -> u64 {
        self.sched.now_ms()
    }

    pub fn is_busy(&self, actor: EntityId) -> bool {
        self.sched.is_busy(actor)
    }

    /// Forget an actor's session state and strand its timers.
    pub fn detach(&mut self, actor: EntityId) {
        self.sched.drop_session(actor);
    }

    /// Interpret one line of input. An empty result means the input was
    /// accepted; it may still be queued or delayed rather than executed.
    /// Diagnostics come back as values, never as panics or errors; a
    /// command body that fails at runtime is logged server-side and the
    /// actor sees only a masked message.
    pub fn interpret(
        &mut self,
        world: &mut WorldIndex,
        out: &mut dyn OutputSink,
        actor: EntityId,
        raw: &str,
    ) -> Vec<Diag> {
        let diags = self.interpret_inner(world, out, actor, raw);
        self.pump(world, out);
        diags
    }

    /// Advance the clock and run everything that has come due.
    pub fn advance(&mut self, world: &mut WorldIndex, out: &mut dyn OutputSink, now_ms: u64) {
        self.sched.advance_to(now_ms);
        self.pump(world, out);
    }

    fn interpret_inner(
        &mut self,
        world: &mut WorldIndex,
        out: &mut dyn OutputSink,
        actor: EntityId,
        raw: &str,
    ) -> Vec<Diag> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Vec::new();
        }

        // Scheduler control verbs bypass resolution so they work even
        // while a delayed command holds the busy flag.
        let kw = raw.split_whitespace().next().unwrap_or("");
        if kw.eq_ignore_ascii_case("halt") {
            self.halt(world, out, actor);
            return Vec::new();
        }
        if kw.eq_ignore_ascii_case("flush") {
            self.flush(out, actor);
            return Vec::new();
        }

        let Some((rank, origin)) = world.entity(actor).map(|e| (e.rank, e.room_id.clone())) else {
            tracing::warn!(actor, "input from an actor the index does not know");
            return vec![Diag::UnknownCommand];
        };
        let surroundings = world.surroundings(&origin, self.snapshot_radius);
        match resolve(
            world,
            &self.registry,
            actor,
            rank,
            &origin,
            &surroundings,
            raw,
        ) {
            Ok(inv) => self.submit(world, out, inv),
            Err(diags) => diags,
        }
    }

    fn submit(
        &mut self,
        world: &mut WorldIndex,
        out: &mut dyn OutputSink,
        inv: Invocation,
    ) -> Vec<Diag> {
        let spec = self.registry.get(inv.spec_idx);
        let (skip_queue, startup_ms, cooldown_ms, startup_msg) = (
            spec.flags.skip_queue,
            spec.startup_ms,
            spec.cooldown_ms,
            spec.startup_msg,
        );

        if skip_queue {
            self.run_body(world, out, &inv);
            return Vec::new();
        }

        if self.sched.is_busy(inv.actor) {
            if !self.sched.enqueue(inv.actor, &inv.raw) {
                return vec![Diag::QueueFull];
            }
            let _ = out.deliver(inv.actor, &format!("queued: {}", inv.raw));
            return Vec::new();
        }

        self.sched.begin(inv.actor, &inv.raw);

        if startup_ms == 0 && cooldown_ms == 0 {
            let actor = inv.actor;
            let spec_idx = inv.spec_idx;
            self.run_body(world, out, &inv);
            self.run_cleanup(world, out, actor, spec_idx);
            return Vec::new();
        }

        if startup_ms > 0 {
            if let Some(msg) = startup_msg {
                let _ = out.deliver(inv.actor, msg);
            }
        }
        self.sched.schedule_timed(inv, startup_ms, cooldown_ms);
        Vec::new()
    }

    /// Run a command body, masking runtime errors. A failure outcome is a
    /// result value and never skips the delay contract.
    fn run_body(&self, world: &mut WorldIndex, out: &mut dyn OutputSink, inv: &Invocation) -> Outcome {
        let spec = self.registry.get(inv.spec_idx);
        let body = spec.body;
        let keyword = spec.keyword;

        let result = {
            let mut ctx = ExecCtx {
                world,
                out,
                inv,
                registry: &self.registry,
            };
            body(&mut ctx)
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(actor = inv.actor, keyword, err = %e, "command body failed");
                let _ = out.deliver(inv.actor, &Diag::RuntimeError.to_string());
                Outcome::Failure
            }
        }
    }

    /// The exactly-once cleanup: reset the busy flag, deliver the
    /// cooldown message, feed the next buffered input to the continuation.
    /// A rejected follow-up has its diagnostics delivered and is consumed;
    /// the drain then tries the next head so no input is stranded.
    fn run_cleanup(
        &mut self,
        world: &mut WorldIndex,
        out: &mut dyn OutputSink,
        actor: EntityId,
        spec_idx: usize,
    ) {
        self.sched.idle(actor);

        let (cooldown_ms, cooldown_msg) = {
            let spec = self.registry.get(spec_idx);
            (spec.cooldown_ms, spec.cooldown_msg)
        };
        if cooldown_ms > 0 {
            if let Some(msg) = cooldown_msg {
                let _ = out.deliver(actor, msg);
            }
        }

        for _ in 0..PENDING_INPUT_MAX {
            let Some(next) = self.sched.peek_pending(actor) else {
                break;
            };
            let diags = self.interpret_inner(world, out, actor, &next);
            if diags.is_empty() {
                // Accepted: the begin path consumed the head.
                break;
            }
            for d in &diags {
                let _ = out.deliver(actor, &d.to_string());
            }
            self.sched.drop_head_if(actor, &next);
        }
    }

    fn pump(&mut self, world: &mut WorldIndex, out: &mut dyn OutputSink) {
        loop {
            let due = self.sched.collect_due();
            if due.is_empty() {
                break;
            }
            for d in due {
                match d {
                    DueAction::Execute { inv, .. } => {
                        self.run_body(world, out, &inv);
                    }
                    DueAction::Cleanup { actor, spec_idx } => {
                        self.run_cleanup(world, out, actor, spec_idx);
                    }
                }
            }
        }
    }

    /// `halt`: clear the buffer, then force cleanup of any in-flight
    /// timed action without running its body.
    fn halt(&mut self, world: &mut WorldIndex, out: &mut dyn OutputSink, actor: EntityId) {
        let cleared = self.sched.clear_pending(actor);
        if let Some(t) = self.sched.cancel_timed(actor) {
            let _ = out.deliver(actor, "halted.");
            self.run_cleanup(world, out, actor, t.inv.spec_idx);
        } else if cleared > 0 {
            let _ = out.deliver(actor, "queue cleared.");
        } else {
            let _ = out.deliver(actor, "nothing to halt.");
        }
    }

    /// `flush`: clear the buffer only; anything in flight finishes
    /// normally.
    fn flush(&mut self, out: &mut dyn OutputSink, actor: EntityId) {
        let n = self.sched.clear_pending(actor);
        let _ = out.deliver(
            actor,
            if n > 0 { "queue cleared." } else { "nothing queued." },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CmdFlags, CommandSpec, RangeClass};
    use crate::testkit::{TestSink, attach, setup};
    use mudworld::{EntityKind, Rank};

    #[test]
    fn say_reaches_actor_and_bystander_with_their_own_text() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "holloway.square");
        let b = attach(&mut w, "Bob", "holloway.square");
        let mut sink = TestSink::default();

        assert!(interp.interpret(&mut w, &mut sink, a, "say hello").is_empty());
        assert_eq!(sink.last_for(a).unwrap(), "You say 'hello'");
        assert_eq!(sink.last_for(b).unwrap(), "Alice says 'hello'");
    }

    #[test]
    fn busy_actor_input_is_queued_not_executed() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let mut sink = TestSink::default();

        assert!(interp.interpret(&mut w, &mut sink, a, "forage").is_empty());
        assert!(interp.is_busy(a));

        let before = sink.count_for(a);
        assert!(interp.interpret(&mut w, &mut sink, a, "look").is_empty());
        assert_eq!(sink.texts_for(a)[before], "queued: look");
        // The room description only arrives after the cleanup
        // continuation runs it.
        assert!(!sink.texts_for(a).iter().any(|t| t.contains("open meadow")));

        interp.advance(&mut w, &mut sink, 30_000);
        assert!(sink.texts_for(a).iter().any(|t| t.contains("open meadow")));
        assert!(!interp.is_busy(a));
    }

    #[test]
    fn delayed_command_follows_the_tick_script() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let mut sink = TestSink::default();

        // t=0: startup message only; busy immediately.
        assert!(interp.interpret(&mut w, &mut sink, a, "forage").is_empty());
        assert_eq!(
            sink.texts_for(a),
            vec!["you crouch and start picking through the greenery."]
        );
        assert!(interp.is_busy(a));

        interp.advance(&mut w, &mut sink, 9_999);
        assert_eq!(sink.count_for(a), 1);

        // t=10s: the body runs.
        interp.advance(&mut w, &mut sink, 10_000);
        assert_eq!(sink.last_for(a).unwrap(), "you come up with a herb sprig.");
        assert_eq!(w.entity(a).unwrap().inv.get("herb sprig"), Some(&1));
        assert!(interp.is_busy(a), "busy holds through the cooldown");

        // t=30s: cooldown message, then idle.
        interp.advance(&mut w, &mut sink, 29_999);
        assert!(interp.is_busy(a));
        interp.advance(&mut w, &mut sink, 30_000);
        assert_eq!(
            sink.last_for(a).unwrap(),
            "you brush the dirt from your hands."
        );
        assert!(!interp.is_busy(a));
    }

    #[test]
    fn skip_queue_commands_run_even_while_busy() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "forage");
        assert!(interp.is_busy(a));
        interp.interpret(&mut w, &mut sink, a, "who");
        assert_eq!(sink.last_for(a).unwrap(), "around: Alice");
        // Nothing was queued for it.
        assert!(!sink.texts_for(a).iter().any(|t| t.starts_with("queued:")));
    }

    #[test]
    fn halt_cancels_the_body_but_still_cleans_up() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "forage");
        interp.interpret(&mut w, &mut sink, a, "look");
        interp.advance(&mut w, &mut sink, 5_000);
        assert!(interp.interpret(&mut w, &mut sink, a, "halt").is_empty());

        assert!(!interp.is_busy(a));
        // Cleanup delivered the cooldown message; the body never ran and
        // the buffered look was discarded.
        assert!(sink
            .texts_for(a)
            .contains(&"you brush the dirt from your hands."));
        assert!(w.entity(a).unwrap().inv.get("herb sprig").is_none());

        interp.advance(&mut w, &mut sink, 60_000);
        assert!(w.entity(a).unwrap().inv.get("herb sprig").is_none());
        assert!(!sink.texts_for(a).iter().any(|t| t.contains("open meadow")));
    }

    #[test]
    fn flush_clears_the_queue_but_lets_the_action_finish() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "forage");
        interp.interpret(&mut w, &mut sink, a, "look");
        interp.interpret(&mut w, &mut sink, a, "flush");
        assert!(interp.is_busy(a));

        interp.advance(&mut w, &mut sink, 30_000);
        // The forage completed, but the flushed look never ran.
        assert_eq!(w.entity(a).unwrap().inv.get("herb sprig"), Some(&1));
        assert!(!sink.texts_for(a).iter().any(|t| t.contains("open meadow")));
    }

    #[test]
    fn buffered_input_drains_fifo_across_cleanups() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let b = attach(&mut w, "Bob", "fernway.meadow");
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "forage");
        interp.interpret(&mut w, &mut sink, a, "say first");
        interp.interpret(&mut w, &mut sink, a, "say second");

        interp.advance(&mut w, &mut sink, 30_000);
        let heard: Vec<&str> = sink
            .texts_for(b)
            .into_iter()
            .filter(|t| t.contains("says"))
            .collect();
        assert_eq!(
            heard,
            vec!["Alice says 'first'", "Alice says 'second'"],
            "buffered input replays in order"
        );
    }

    #[test]
    fn queue_overflows_into_a_queue_full_diagnostic() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "forage");
        for _ in 0..PENDING_INPUT_MAX {
            assert!(interp.interpret(&mut w, &mut sink, a, "say hi").is_empty());
        }
        assert_eq!(
            interp.interpret(&mut w, &mut sink, a, "say hi"),
            vec![Diag::QueueFull]
        );
    }

    #[test]
    fn rejected_continuation_is_consumed_and_the_drain_moves_on() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let b = attach(&mut w, "Bob", "fernway.meadow");
        let cup = w.spawn("tin cup", EntityKind::Item, Rank::Player, "fernway.meadow");
        let mut sink = TestSink::default();

        // `get cup` resolves fine when buffered; Bob takes the cup before
        // the continuation re-resolves it.
        interp.interpret(&mut w, &mut sink, a, "forage");
        interp.interpret(&mut w, &mut sink, a, "get cup");
        interp.interpret(&mut w, &mut sink, a, "say anyway");
        interp.interpret(&mut w, &mut sink, b, "get cup");
        assert!(w.entity(cup).is_none());

        interp.advance(&mut w, &mut sink, 30_000);
        // The stale line produced its diagnostic, then the drain moved on
        // and the next buffered line still ran.
        assert!(sink.texts_for(a).contains(&"huh? (try: get <item>)"));
        assert!(sink.texts_for(b).contains(&"Alice says 'anyway'"));
        assert!(!interp.is_busy(a));
        assert_eq!(w.entity(a).unwrap().inv.get("tin cup"), None);
    }

    #[test]
    fn runtime_errors_are_masked_and_cleanup_still_runs() {
        fn exploding_body(_ctx: &mut crate::cmd::ExecCtx<'_>) -> anyhow::Result<crate::cmd::Outcome> {
            anyhow::bail!("wires crossed")
        }

        let (mut w, _) = setup();
        let a = attach(&mut w, "Alice", "holloway.square");
        let mut reg = commands::builtin_registry().unwrap();
        reg.register(CommandSpec {
            keyword: "detonate",
            aliases: &[],
            min_rank: Rank::Player,
            params: Vec::new(),
            range: RangeClass::SelfOnly,
            flags: CmdFlags::default(),
            startup_ms: 0,
            cooldown_ms: 0,
            startup_msg: None,
            cooldown_msg: None,
            help: "detonate",
            body: exploding_body,
        });
        let mut interp = Interpreter::new(reg);
        let mut sink = TestSink::default();

        // Accepted input; the failure surfaces only as the masked line.
        assert!(interp.interpret(&mut w, &mut sink, a, "detonate").is_empty());
        assert_eq!(
            sink.last_for(a).unwrap(),
            "something went sideways. staff have been notified."
        );
        assert!(!interp.is_busy(a), "cleanup ran despite the error");
    }

    #[test]
    fn failed_timed_body_still_gets_its_cooldown() {
        fn failing_body(ctx: &mut crate::cmd::ExecCtx<'_>) -> anyhow::Result<crate::cmd::Outcome> {
            ctx.reject("nothing here to find.")
        }

        let (mut w, _) = setup();
        let a = attach(&mut w, "Alice", "holloway.square");
        let mut reg = commands::builtin_registry().unwrap();
        reg.register(CommandSpec {
            keyword: "divine",
            aliases: &[],
            min_rank: Rank::Player,
            params: Vec::new(),
            range: RangeClass::SelfOnly,
            flags: CmdFlags::default(),
            startup_ms: 1_000,
            cooldown_ms: 2_000,
            startup_msg: Some("you squint at the entrails."),
            cooldown_msg: Some("you put the entrails away."),
            help: "divine",
            body: failing_body,
        });
        let mut interp = Interpreter::new(reg);
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "divine");
        interp.advance(&mut w, &mut sink, 1_000);
        assert_eq!(sink.last_for(a).unwrap(), "nothing here to find.");
        assert!(interp.is_busy(a), "failure does not skip the cooldown");

        interp.advance(&mut w, &mut sink, 3_000);
        assert_eq!(sink.last_for(a).unwrap(), "you put the entrails away.");
        assert!(!interp.is_busy(a));
    }

    #[test]
    fn actors_are_independent_serialization_domains() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "fernway.meadow");
        let b = attach(&mut w, "Bob", "fernway.meadow");
        let mut sink = TestSink::default();

        interp.interpret(&mut w, &mut sink, a, "forage");
        // A's delay never blocks B.
        assert!(interp.interpret(&mut w, &mut sink, b, "say hi").is_empty());
        assert!(sink.texts_for(a).iter().any(|t| t.contains("Bob says 'hi'")));

        interp.interpret(&mut w, &mut sink, b, "forage");
        interp.advance(&mut w, &mut sink, 30_000);
        assert_eq!(w.entity(a).unwrap().inv.get("herb sprig"), Some(&1));
        assert_eq!(w.entity(b).unwrap().inv.get("herb sprig"), Some(&1));
    }

    #[test]
    fn empty_input_is_accepted_silently() {
        let (mut w, mut interp) = setup();
        let a = attach(&mut w, "Alice", "holloway.square");
        let mut sink = TestSink::default();

        assert!(interp.interpret(&mut w, &mut sink, a, "   ").is_empty());
        assert_eq!(sink.count_for(a), 0);
    }
}
