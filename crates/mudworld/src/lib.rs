//! `mudworld`: the live-world index.
//!
//! Rooms come from YAML area files; entities live in an arena keyed by
//! integer id. A room's contents is a set of ids, never an owning
//! pointer, so lookups stay cycle-free. Mutations (moves, spawns) are
//! visible to every subsequent lookup.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

mod rooms;

pub use rooms::{AreaSummary, ExitDef, RoomDef, Rooms};

/// Loose name matching: case-insensitive prefix of the whole name or of
/// any word in it, so `cup` finds a `tin cup`. Exact matches are checked
/// separately by callers that rank them higher.
pub fn token_matches_name(name: &str, token: &str) -> bool {
    let t = token.trim().to_ascii_lowercase();
    if t.is_empty() {
        return false;
    }
    let name_lc = name.to_ascii_lowercase();
    name_lc.starts_with(&t) || name_lc.split_whitespace().any(|w| w.starts_with(&t))
}

pub type EntityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Npc,
    Item,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Npc => "npc",
            EntityKind::Item => "item",
        }
    }
}

/// Ordered permission ranks. Higher rank sees and may run more commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Player,
    Builder,
    Staff,
    Admin,
}

impl Rank {
    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Player => "player",
            Rank::Builder => "builder",
            Rank::Staff => "staff",
            Rank::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "player" => Some(Rank::Player),
            "builder" => Some(Rank::Builder),
            "staff" => Some(Rank::Staff),
            "admin" => Some(Rank::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub rank: Rank,
    pub room_id: String,
    // Held items, name -> count. BTreeMap so name scans have a stable order.
    pub inv: BTreeMap<String, u32>,
}

/// The index consulted by the binder and by occupant enumeration.
pub struct WorldIndex {
    rooms: Rooms,
    entities: HashMap<EntityId, Entity>,
    occupants: HashMap<String, BTreeSet<EntityId>>,
    next_id: EntityId,
}

impl WorldIndex {
    pub fn new(rooms: Rooms) -> Self {
        Self {
            rooms,
            entities: HashMap::new(),
            occupants: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn with_default_world() -> anyhow::Result<Self> {
        Ok(Self::new(Rooms::load_default()?))
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    pub fn start_room(&self) -> &str {
        self.rooms.start_room()
    }

    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        kind: EntityKind,
        rank: Rank,
        room_id: impl Into<String>,
    ) -> EntityId {
        let room_id = room_id.into();
        let room_id = if self.rooms.has_room(&room_id) {
            room_id
        } else {
            tracing::warn!(room = %room_id, "spawn into unknown room; using start room");
            self.rooms.start_room().to_string()
        };

        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.entities.insert(
            id,
            Entity {
                id,
                name: name.into(),
                kind,
                rank,
                room_id: room_id.clone(),
                inv: BTreeMap::new(),
            },
        );
        self.occupants.entry(room_id).or_default().insert(id);
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let e = self.entities.remove(&id)?;
        if let Some(s) = self.occupants.get_mut(&e.room_id) {
            s.remove(&id);
            if s.is_empty() {
                self.occupants.remove(&e.room_id);
            }
        }
        Some(e)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn name_of(&self, id: EntityId) -> &str {
        self.entities
            .get(&id)
            .map(|e| e.name.as_str())
            .unwrap_or("someone")
    }

    /// Move an entity; false if the entity or destination is unknown.
    pub fn move_entity(&mut self, id: EntityId, to: &str) -> bool {
        if !self.rooms.has_room(to) {
            return false;
        }
        let Some(e) = self.entities.get_mut(&id) else {
            return false;
        };
        let from = std::mem::replace(&mut e.room_id, to.to_string());
        if let Some(s) = self.occupants.get_mut(&from) {
            s.remove(&id);
            if s.is_empty() {
                self.occupants.remove(&from);
            }
        }
        self.occupants.entry(to.to_string()).or_default().insert(id);
        true
    }

    /// Ids present in a room, ascending. Includes items on the floor.
    pub fn occupants_of(&self, room_id: &str) -> Vec<EntityId> {
        self.occupants
            .get(room_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Lookup by id or name, optionally filtered to a kind. Name matching
    /// is case-insensitive, exact before prefix; ties go to the lowest id.
    pub fn lookup(&self, token: &str, kind: Option<EntityKind>) -> Option<EntityId> {
        let t = token.trim();
        if t.is_empty() {
            return None;
        }

        if let Ok(id) = t.parse::<EntityId>() {
            if let Some(e) = self.entities.get(&id) {
                if kind.is_none_or(|k| e.kind == k) {
                    return Some(id);
                }
            }
        }

        let t_lc = t.to_ascii_lowercase();
        let mut exact: Option<EntityId> = None;
        let mut loose: Option<EntityId> = None;
        for e in self.entities.values() {
            if kind.is_some_and(|k| e.kind != k) {
                continue;
            }
            if e.name.to_ascii_lowercase() == t_lc {
                if exact.is_none_or(|cur| e.id < cur) {
                    exact = Some(e.id);
                }
            } else if token_matches_name(&e.name, t) && loose.is_none_or(|cur| e.id < cur) {
                loose = Some(e.id);
            }
        }
        exact.or(loose)
    }

    /// First occupant of a room matching the kind filter, lowest id first.
    pub fn occupant_of_kind(
        &self,
        room_id: &str,
        kind: Option<EntityKind>,
        exclude: Option<EntityId>,
    ) -> Option<EntityId> {
        self.occupants_of(room_id).into_iter().find(|id| {
            if exclude == Some(*id) {
                return false;
            }
            self.entities
                .get(id)
                .is_some_and(|e| kind.is_none_or(|k| e.kind == k))
        })
    }

    /// Rooms reachable from `from` within `radius` steps, with their BFS
    /// distance. Includes `from` itself at distance 0.
    pub fn surroundings(&self, from: &str, radius: u32) -> Vec<(String, u32)> {
        if !self.rooms.has_room(from) {
            return Vec::new();
        }

        let mut dist: HashMap<String, u32> = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(from.to_string(), 0);
        queue.push_back(from.to_string());

        while let Some(cur) = queue.pop_front() {
            let d = dist[&cur];
            if d >= radius {
                continue;
            }
            let Some(room) = self.rooms.room(&cur) else {
                continue;
            };
            for ex in &room.exits {
                if !dist.contains_key(&ex.to) && self.rooms.has_room(&ex.to) {
                    dist.insert(ex.to.clone(), d + 1);
                    queue.push_back(ex.to.clone());
                }
            }
        }

        let mut out: Vec<(String, u32)> = dist.into_iter().collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn inv_add(&mut self, id: EntityId, item: &str, n: u32) {
        if let Some(e) = self.entities.get_mut(&id) {
            *e.inv.entry(item.to_string()).or_insert(0) += n;
        }
    }

    /// Remove up to `n` of an item; false if the entity holds none.
    pub fn inv_remove(&mut self, id: EntityId, item: &str, n: u32) -> bool {
        let Some(e) = self.entities.get_mut(&id) else {
            return false;
        };
        let Some(count) = e.inv.get_mut(item) else {
            return false;
        };
        if *count <= n {
            e.inv.remove(item);
        } else {
            *count -= n;
        }
        true
    }

    /// Room text plus a viewer-relative "here:" line and floor contents.
    pub fn render_room_for(&self, room_id: &str, viewer: EntityId) -> String {
        let mut s = self.rooms.render_room(room_id);

        let mut others = Vec::new();
        let mut floor = Vec::new();
        for id in self.occupants_of(room_id) {
            if id == viewer {
                continue;
            }
            let Some(e) = self.entities.get(&id) else {
                continue;
            };
            match e.kind {
                EntityKind::Item => floor.push(e.name.clone()),
                EntityKind::Npc => others.push(format!("{} (npc)", e.name)),
                EntityKind::Player => others.push(e.name.clone()),
            }
        }

        if others.is_empty() {
            s.push_str("here: nobody\n");
        } else {
            others.sort();
            s.push_str(&format!("here: {}\n", others.join(", ")));
        }
        if !floor.is_empty() {
            floor.sort();
            s.push_str(&format!("on the ground: {}\n", floor.join(", ")));
        }
        s
    }
}
