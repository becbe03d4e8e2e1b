//! The command contract: descriptors, the registry, and bound instances.

use mudworld::{EntityId, EntityKind, Rank, WorldIndex};
use regex::Regex;

use crate::dispatch::{self, MessageBundle, OutputSink, Paragraph};

/// Which slot of the bound instance a parameter fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUsage {
    Subject,
    Target,
    Supporting,
}

/// How a parameter's text resolves to a typed reference. One variant per
/// lookup strategy; the binder matches on these directly.
#[derive(Debug, Clone)]
pub enum LookupScope {
    /// Query the live-world index by id or name, optionally kind-filtered.
    World { kind: Option<EntityKind> },
    /// Scan the actor's held items by name.
    Inventory,
    /// Resolve a direction token to the room it leads to, then to an
    /// occupant there of the declared kind.
    Direction { kind: Option<EntityKind> },
    /// Capture all remaining text verbatim.
    Greedy,
    /// The token (or whole remainder) must fully match the pattern.
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub usage: ParamUsage,
    pub scope: LookupScope,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(usage: ParamUsage, scope: LookupScope) -> Self {
        Self {
            usage,
            scope,
            required: true,
        }
    }

    pub fn optional(usage: ParamUsage, scope: LookupScope) -> Self {
        Self {
            usage,
            scope,
            required: false,
        }
    }
}

/// Maximum topological distance a bound reference may lie from the
/// actor's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeClass {
    SelfOnly,
    Touch,
    Local,
    Regional(u32),
    Global,
}

impl RangeClass {
    pub fn radius(self) -> u32 {
        match self {
            RangeClass::SelfOnly | RangeClass::Touch | RangeClass::Local => 0,
            RangeClass::Regional(r) => r,
            RangeClass::Global => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CmdFlags {
    /// Bypass the queue and any delays; the body runs synchronously.
    pub skip_queue: bool,
    /// Keep the command out of `help` listings.
    pub unlisted: bool,
    /// The matched keyword token itself feeds the first parameter when no
    /// argument text follows (directional aliases: bare `north`).
    pub keyword_is_subject: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

pub type CommandBody = fn(&mut ExecCtx<'_>) -> anyhow::Result<Outcome>;

/// Immutable per-command-type metadata, registered once at startup.
pub struct CommandSpec {
    pub keyword: &'static str,
    pub aliases: &'static [&'static str],
    pub min_rank: Rank,
    pub params: Vec<ParamSpec>,
    pub range: RangeClass,
    pub flags: CmdFlags,
    pub startup_ms: u64,
    pub cooldown_ms: u64,
    pub startup_msg: Option<&'static str>,
    pub cooldown_msg: Option<&'static str>,
    pub help: &'static str,
    pub body: CommandBody,
}

impl CommandSpec {
    pub fn matches_keyword(&self, token: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(token)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(token))
    }
}

/// The command table. Resolution scans in registration order and the
/// first candidate that fully binds wins; when several registered
/// commands share a keyword with compatible shapes, the earlier
/// registration is the documented tie-break.
#[derive(Default)]
pub struct Registry {
    specs: Vec<CommandSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec) {
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    pub fn get(&self, idx: usize) -> &CommandSpec {
        &self.specs[idx]
    }

    /// Radius the resolver uses for the origin surroundings snapshot:
    /// wide enough for every registered regional range.
    pub fn snapshot_radius(&self) -> u32 {
        self.specs
            .iter()
            .map(|s| s.range.radius())
            .max()
            .unwrap_or(0)
            .max(2)
    }
}

/// A typed reference produced by the binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Entity(EntityId),
    /// A held item, by canonical inventory name.
    Item(String),
    Text(String),
}

/// One bound invocation. The origin room and reachable surroundings are
/// snapshotted at resolution time and never re-derived afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub actor: EntityId,
    pub spec_idx: usize,
    pub keyword: String,
    pub raw: String,
    pub subject: Option<ParamValue>,
    pub target: Option<ParamValue>,
    pub supporting: Option<ParamValue>,
    pub origin: String,
    pub surroundings: Vec<(String, u32)>,
}

impl Invocation {
    pub fn subject_entity(&self) -> Option<EntityId> {
        match self.subject {
            Some(ParamValue::Entity(id)) => Some(id),
            _ => None,
        }
    }

    pub fn target_entity(&self) -> Option<EntityId> {
        match self.target {
            Some(ParamValue::Entity(id)) => Some(id),
            _ => None,
        }
    }

    pub fn subject_item(&self) -> Option<&str> {
        match &self.subject {
            Some(ParamValue::Item(name)) => Some(name),
            _ => None,
        }
    }

    pub fn supporting_text(&self) -> Option<&str> {
        match &self.supporting {
            Some(ParamValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// What a command body sees while executing.
pub struct ExecCtx<'a> {
    pub world: &'a mut WorldIndex,
    pub out: &'a mut dyn OutputSink,
    pub inv: &'a Invocation,
    pub registry: &'a Registry,
}

impl ExecCtx<'_> {
    pub fn actor_id(&self) -> EntityId {
        self.inv.actor
    }

    /// The actor's room right now, not the resolution-time snapshot.
    pub fn actor_room(&self) -> Option<String> {
        self.world
            .entity(self.inv.actor)
            .map(|e| e.room_id.clone())
    }

    pub fn notify_actor(&mut self, text: &str) {
        let _ = self.out.deliver(self.inv.actor, text);
    }

    pub fn dispatch(&mut self, bundle: &MessageBundle) {
        dispatch::deliver(self.world, self.out, bundle);
    }

    /// The single-target error-render path: tell the actor why, then
    /// report failure as a result value.
    pub fn reject(&mut self, text: &str) -> anyhow::Result<Outcome> {
        let mut b = MessageBundle::for_actor(self.inv.actor);
        b.to_actor.push(Paragraph::literal(text));
        self.dispatch(&b);
        Ok(Outcome::Failure)
    }
}
