//! Input resolution: raw text to exactly one bound invocation, or
//! diagnostics. Never a partial binding.

use mudworld::{EntityId, Rank, WorldIndex};

use crate::bind::{bind_scope, full_match};
use crate::cmd::{Invocation, LookupScope, ParamUsage, ParamValue, RangeClass, Registry};

/// Resolution and runtime diagnostics, rendered to the actor as plain
/// display strings. Permission failures intentionally render the same as
/// an unregistered keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diag {
    UnknownCommand,
    Malformed { help: String },
    OutOfRange,
    QueueFull,
    RuntimeError,
}

impl std::fmt::Display for Diag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diag::UnknownCommand => write!(f, "huh? (try: help)"),
            Diag::Malformed { help } => write!(f, "huh? (try: {help})"),
            Diag::OutOfRange => write!(f, "that is out of reach from here."),
            Diag::QueueFull => write!(f, "queue full. (try: flush)"),
            Diag::RuntimeError => {
                write!(f, "something went sideways. staff have been notified.")
            }
        }
    }
}

struct Partial {
    bound: usize,
    out_of_range: bool,
}

/// Map raw input to a bound invocation.
///
/// Candidates are scanned in registration order; the first that fully
/// binds wins. Candidates above the actor's rank are skipped silently so
/// unauthorized actors cannot detect that they exist. When nothing fully
/// binds, the syntax help of the candidate that bound the most parameters
/// comes back; a range failure on that candidate reports out-of-range
/// instead.
pub fn resolve(
    world: &WorldIndex,
    registry: &Registry,
    actor: EntityId,
    rank: Rank,
    origin: &str,
    surroundings: &[(String, u32)],
    raw: &str,
) -> Result<Invocation, Vec<Diag>> {
    let raw = raw.trim();
    let (kw, remainder) = match raw.find(char::is_whitespace) {
        Some(i) => (&raw[..i], raw[i..].trim_start()),
        None => (raw, ""),
    };
    if kw.is_empty() {
        return Err(vec![Diag::UnknownCommand]);
    }

    let mut any_visible = false;
    // (params bound, spec idx, failed on range) of the best near-miss.
    let mut best: Option<(usize, usize, bool)> = None;

    for (idx, spec) in registry.specs().iter().enumerate() {
        if !spec.matches_keyword(kw) {
            continue;
        }
        if spec.min_rank > rank {
            continue;
        }
        any_visible = true;

        match try_bind(world, actor, origin, surroundings, spec, kw, remainder) {
            Ok((subject, target, supporting)) => {
                return Ok(Invocation {
                    actor,
                    spec_idx: idx,
                    keyword: spec.keyword.to_string(),
                    raw: raw.to_string(),
                    subject,
                    target,
                    supporting,
                    origin: origin.to_string(),
                    surroundings: surroundings.to_vec(),
                });
            }
            Err(p) => {
                if best.is_none_or(|(b, _, _)| p.bound > b) {
                    best = Some((p.bound, idx, p.out_of_range));
                }
            }
        }
    }

    let Some((_, idx, out_of_range)) = best else {
        // No visible candidate at all (or none even shared the keyword).
        debug_assert!(!any_visible);
        return Err(vec![Diag::UnknownCommand]);
    };
    if out_of_range {
        Err(vec![Diag::OutOfRange])
    } else {
        Err(vec![Diag::Malformed {
            help: registry.get(idx).help.to_string(),
        }])
    }
}

type Slots = (
    Option<ParamValue>,
    Option<ParamValue>,
    Option<ParamValue>,
);

fn try_bind(
    world: &WorldIndex,
    actor: EntityId,
    origin: &str,
    surroundings: &[(String, u32)],
    spec: &crate::cmd::CommandSpec,
    kw_token: &str,
    remainder: &str,
) -> Result<Slots, Partial> {
    let mut rest = remainder;
    let mut bound = 0usize;
    let mut subject = None;
    let mut target = None;
    let mut supporting = None;

    for (i, p) in spec.params.iter().enumerate() {
        // Carve off the text this parameter consumes.
        let text: Option<String> = match &p.scope {
            LookupScope::Greedy => {
                let t = rest.trim();
                rest = "";
                if t.is_empty() {
                    keyword_fallback(spec, kw_token, i)
                } else {
                    Some(t.to_string())
                }
            }
            LookupScope::Pattern(re) => {
                let whole = rest.trim();
                if whole.is_empty() {
                    keyword_fallback(spec, kw_token, i)
                } else if full_match(re, whole) {
                    // The whole remainder is the sub-form.
                    rest = "";
                    Some(whole.to_string())
                } else {
                    take_token(&mut rest)
                }
            }
            _ => match take_token(&mut rest) {
                Some(t) => Some(t),
                None => keyword_fallback(spec, kw_token, i),
            },
        };

        let Some(text) = text else {
            if p.required {
                return Err(Partial {
                    bound,
                    out_of_range: false,
                });
            }
            continue;
        };

        let Some(value) = bind_scope(world, actor, origin, &p.scope, &text) else {
            return Err(Partial {
                bound,
                out_of_range: false,
            });
        };
        if !within_range(world, actor, origin, surroundings, spec.range, &value) {
            return Err(Partial {
                bound,
                out_of_range: true,
            });
        }
        bound += 1;
        match p.usage {
            ParamUsage::Subject => subject = Some(value),
            ParamUsage::Target => target = Some(value),
            ParamUsage::Supporting => supporting = Some(value),
        }
    }

    // Leftover text means this candidate did not fully bind.
    if !rest.trim().is_empty() {
        return Err(Partial {
            bound,
            out_of_range: false,
        });
    }
    Ok((subject, target, supporting))
}

fn take_token(rest: &mut &str) -> Option<String> {
    let t = rest.trim_start();
    if t.is_empty() {
        *rest = "";
        return None;
    }
    match t.find(char::is_whitespace) {
        Some(i) => {
            let tok = t[..i].to_string();
            *rest = &t[i..];
            Some(tok)
        }
        None => {
            let tok = t.to_string();
            *rest = "";
            Some(tok)
        }
    }
}

fn keyword_fallback(
    spec: &crate::cmd::CommandSpec,
    kw_token: &str,
    param_idx: usize,
) -> Option<String> {
    if param_idx == 0 && spec.flags.keyword_is_subject {
        Some(kw_token.to_string())
    } else {
        None
    }
}

fn within_range(
    world: &WorldIndex,
    actor: EntityId,
    origin: &str,
    surroundings: &[(String, u32)],
    range: RangeClass,
    value: &ParamValue,
) -> bool {
    // Held items and plain text are always in reach.
    let ParamValue::Entity(id) = value else {
        return true;
    };
    if *id == actor {
        return true;
    }
    let Some(e) = world.entity(*id) else {
        return false;
    };
    match range {
        RangeClass::SelfOnly => false,
        RangeClass::Touch | RangeClass::Local => e.room_id == origin,
        RangeClass::Regional(r) => surroundings
            .iter()
            .find(|(room, _)| *room == e.room_id)
            .is_some_and(|(_, d)| *d <= r),
        RangeClass::Global => true,
    }
}
