//! Shared helpers for the unit tests in this crate.

use mudworld::{EntityId, EntityKind, Rank, WorldIndex};

use crate::Interpreter;
use crate::dispatch::OutputSink;

/// Captures deliveries in order; ids listed in `dead` report failure.
#[derive(Default)]
pub struct TestSink {
    pub sent: Vec<(EntityId, String)>,
    pub dead: Vec<EntityId>,
}

impl OutputSink for TestSink {
    fn deliver(&mut self, to: EntityId, text: &str) -> bool {
        if self.dead.contains(&to) {
            return false;
        }
        self.sent.push((to, text.to_string()));
        true
    }
}

impl TestSink {
    pub fn texts_for(&self, id: EntityId) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, t)| t.as_str())
            .collect()
    }

    pub fn last_for(&self, id: EntityId) -> Option<&str> {
        self.texts_for(id).pop()
    }

    pub fn count_for(&self, id: EntityId) -> usize {
        self.texts_for(id).len()
    }
}

/// Default world plus an interpreter over the built-in command table.
pub fn setup() -> (WorldIndex, Interpreter) {
    let w = WorldIndex::with_default_world().unwrap();
    let interp = Interpreter::with_builtins().unwrap();
    (w, interp)
}

pub fn attach(w: &mut WorldIndex, name: &str, room: &str) -> EntityId {
    w.spawn(name, EntityKind::Player, Rank::Player, room)
}
