//! Parameter binding: one token or phrase to one typed reference.
//!
//! Every scope returns exactly one match or none. Ties are never random:
//! world lookups prefer exact names then prefixes, lowest id first;
//! inventory scans run in the held-name order (alphabetical); direction
//! occupants come back lowest id first.

use mudworld::{EntityId, WorldIndex};
use regex::Regex;

use crate::cmd::{LookupScope, ParamValue};

/// Resolve one piece of text against a lookup scope. `origin` is the
/// actor's snapshotted origin room (direction scopes resolve exits from
/// there, not from wherever the actor has drifted to since).
pub fn bind_scope(
    world: &WorldIndex,
    actor: EntityId,
    origin: &str,
    scope: &LookupScope,
    text: &str,
) -> Option<ParamValue> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }

    match scope {
        LookupScope::World { kind } => world.lookup(t, *kind).map(ParamValue::Entity),
        LookupScope::Inventory => {
            let held = &world.entity(actor)?.inv;
            let t_lc = t.to_ascii_lowercase();
            if let Some((name, _)) = held
                .iter()
                .find(|(name, _)| name.to_ascii_lowercase() == t_lc)
            {
                return Some(ParamValue::Item(name.clone()));
            }
            held.iter()
                .find(|(name, _)| mudworld::token_matches_name(name, t))
                .map(|(name, _)| ParamValue::Item(name.clone()))
        }
        LookupScope::Direction { kind } => {
            let exit = world.rooms().find_exit(origin, t)?;
            world
                .occupant_of_kind(&exit.to, *kind, Some(actor))
                .map(ParamValue::Entity)
        }
        LookupScope::Greedy => Some(ParamValue::Text(t.to_string())),
        LookupScope::Pattern(re) => {
            if full_match(re, t) {
                Some(ParamValue::Text(t.to_string()))
            } else {
                None
            }
        }
    }
}

/// True when the pattern matches the entire input, wherever its anchors
/// happen to be.
pub fn full_match(re: &Regex, text: &str) -> bool {
    re.find(text)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudworld::{EntityKind, Rank};

    fn setup() -> (WorldIndex, EntityId) {
        let mut w = WorldIndex::with_default_world().unwrap();
        let a = w.spawn("Alice", EntityKind::Player, Rank::Player, "holloway.square");
        (w, a)
    }

    #[test]
    fn inventory_matches_exact_before_prefix_in_name_order() {
        let (mut w, a) = setup();
        w.inv_add(a, "herb sprig", 1);
        w.inv_add(a, "herb pouch", 1);
        w.inv_add(a, "herb", 1);

        // Exact match wins over the two prefixes.
        assert_eq!(
            bind_scope(&w, a, "holloway.square", &LookupScope::Inventory, "herb"),
            Some(ParamValue::Item("herb".to_string()))
        );
        // Prefix ties resolve to the first held name alphabetically.
        assert_eq!(
            bind_scope(&w, a, "holloway.square", &LookupScope::Inventory, "herb s"),
            Some(ParamValue::Item("herb sprig".to_string()))
        );
        assert_eq!(
            bind_scope(&w, a, "holloway.square", &LookupScope::Inventory, "rope"),
            None
        );
    }

    #[test]
    fn direction_resolves_exit_then_occupant() {
        let (mut w, a) = setup();
        let rat = w.spawn("rat", EntityKind::Npc, Rank::Player, "holloway.lane");

        let bound = bind_scope(
            &w,
            a,
            "holloway.square",
            &LookupScope::Direction {
                kind: Some(EntityKind::Npc),
            },
            "north",
        );
        assert_eq!(bound, Some(ParamValue::Entity(rat)));

        // No exit that way.
        assert_eq!(
            bind_scope(
                &w,
                a,
                "holloway.square",
                &LookupScope::Direction { kind: None },
                "west"
            ),
            None
        );
        // Exit exists but the room is empty.
        assert_eq!(
            bind_scope(
                &w,
                a,
                "holloway.square",
                &LookupScope::Direction {
                    kind: Some(EntityKind::Player)
                },
                "east"
            ),
            None
        );
    }

    #[test]
    fn world_scope_respects_kind_filter() {
        let (mut w, a) = setup();
        let rat = w.spawn("rat", EntityKind::Npc, Rank::Player, "holloway.tavern");

        let scope = LookupScope::World {
            kind: Some(EntityKind::Npc),
        };
        assert_eq!(
            bind_scope(&w, a, "holloway.square", &scope, "rat"),
            Some(ParamValue::Entity(rat))
        );
        assert_eq!(bind_scope(&w, a, "holloway.square", &scope, "alice"), None);
    }

    #[test]
    fn pattern_requires_a_full_match() {
        let (w, a) = setup();
        let scope = LookupScope::Pattern(Regex::new("buy|sell").unwrap());
        assert_eq!(
            bind_scope(&w, a, "holloway.square", &scope, "buy"),
            Some(ParamValue::Text("buy".to_string()))
        );
        assert_eq!(bind_scope(&w, a, "holloway.square", &scope, "buyer"), None);
    }

    #[test]
    fn greedy_takes_the_trimmed_remainder() {
        let (w, a) = setup();
        assert_eq!(
            bind_scope(
                &w,
                a,
                "holloway.square",
                &LookupScope::Greedy,
                "  hello there  "
            ),
            Some(ParamValue::Text("hello there".to_string()))
        );
        assert_eq!(
            bind_scope(&w, a, "holloway.square", &LookupScope::Greedy, "   "),
            None
        );
    }
}
