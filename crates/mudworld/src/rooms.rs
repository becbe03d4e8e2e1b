use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

// Default world zones, embedded so the server runs with no data directory.
const EMBEDDED_AREAS: &[(&str, &str)] = &[
    ("holloway.yaml", include_str!("../worlds/holloway.yaml")),
    ("fernway.yaml", include_str!("../worlds/fernway.yaml")),
    ("undercroft.yaml", include_str!("../worlds/undercroft.yaml")),
];

#[derive(Clone, Debug)]
pub struct ExitDef {
    pub dir: String,
    pub to: String,
}

#[derive(Clone, Debug)]
pub struct RoomDef {
    pub name: String,
    pub description: String,
    pub area_name: String,
    pub exits: Vec<ExitDef>,
}

#[derive(Clone, Debug)]
pub struct AreaSummary {
    pub zone_id: String,
    pub zone_name: String,
    pub start_room: Option<String>,
    pub room_count: usize,
}

/// The room graph: string room ids, exits by direction name.
#[derive(Clone)]
pub struct Rooms {
    rooms: HashMap<String, RoomDef>,
    start_room: String,
    areas: Vec<AreaSummary>,
}

impl Rooms {
    /// Load the embedded default world.
    pub fn load_default() -> anyhow::Result<Self> {
        let mut b = Builder::default();
        for (fname, s) in EMBEDDED_AREAS {
            b.add_area_yaml(s)
                .with_context(|| format!("parse embedded area yaml: {fname}"))?;
        }
        b.finish()
    }

    /// Load every `*.yaml` area file under `dir` (sorted by file name so
    /// the start-room pick is deterministic).
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("read world dir {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut b = Builder::default();
        for path in &paths {
            let s = std::fs::read_to_string(path)
                .with_context(|| format!("read area file {}", path.display()))?;
            b.add_area_yaml(&s)
                .with_context(|| format!("parse area file {}", path.display()))?;
        }
        b.finish()
    }

    pub fn start_room(&self) -> &str {
        &self.start_room
    }

    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room(&self, room_id: &str) -> Option<&RoomDef> {
        self.rooms.get(room_id)
    }

    pub fn areas(&self) -> &[AreaSummary] {
        &self.areas
    }

    pub fn find_exit(&self, room_id: &str, token: &str) -> Option<&ExitDef> {
        let room = self.rooms.get(room_id)?;
        let t = token.trim();
        if t.is_empty() {
            return None;
        }

        // Exact match on the exit name.
        if let Some(ex) = room.exits.iter().find(|e| e.dir.eq_ignore_ascii_case(t)) {
            return Some(ex);
        }

        // Direction aliases (n/s/e/w/u/d) also match directional exits.
        let canon = normalize_dir_token(t)?;
        room.exits
            .iter()
            .find(|e| e.dir.eq_ignore_ascii_case(canon))
    }

    pub fn render_exits(&self, room_id: &str) -> String {
        let Some(room) = self.rooms.get(room_id) else {
            return "exits: (room not found)\n".to_string();
        };
        if room.exits.is_empty() {
            return "exits: none\n".to_string();
        }

        let mut xs = room
            .exits
            .iter()
            .map(|e| format_exit_label(e.dir.as_str()))
            .collect::<Vec<_>>();
        xs.sort_unstable();
        format!("exits: {}\n", xs.join(", "))
    }

    pub fn render_room(&self, room_id: &str) -> String {
        let Some(room) = self.rooms.get(room_id) else {
            return "room not found\n".to_string();
        };

        let mut s = String::new();
        s.push_str(&format!("== {} ({}) ==\n", room.name, room.area_name));
        if !room.description.is_empty() {
            s.push_str(room.description.trim_end());
            s.push('\n');
        }
        s.push_str(&self.render_exits(room_id));
        s
    }
}

#[derive(Default)]
struct Builder {
    rooms: HashMap<String, RoomDef>,
    areas: Vec<AreaSummary>,
    start_room: Option<String>,
}

impl Builder {
    fn add_area_yaml(&mut self, s: &str) -> anyhow::Result<()> {
        let a = serde_yaml::from_str::<AreaFile>(s)?;
        let area_name = a.zone_name.clone().unwrap_or_else(|| a.zone_id.clone());
        self.areas.push(AreaSummary {
            zone_id: a.zone_id.clone(),
            zone_name: area_name.clone(),
            start_room: a.start_room.clone(),
            room_count: a.rooms.len(),
        });

        // The first zone's declared start room wins.
        if self.start_room.is_none() {
            if let Some(sr) = a.start_room.as_deref() {
                self.start_room = Some(sr.to_string());
            }
        }

        for r in a.rooms {
            let mut exits = Vec::new();
            if let Some(xs) = r.exits {
                for e in xs {
                    let dir = e.dir.trim().to_string();
                    let to = e.to.trim().to_string();
                    if !dir.is_empty() && !to.is_empty() {
                        exits.push(ExitDef { dir, to });
                    }
                }
            }
            self.rooms.insert(
                r.id,
                RoomDef {
                    name: r.name,
                    description: r.desc.unwrap_or_default().trim().to_string(),
                    area_name: area_name.clone(),
                    exits,
                },
            );
        }
        Ok(())
    }

    fn finish(mut self) -> anyhow::Result<Rooms> {
        let start_room = self
            .start_room
            .take()
            .filter(|sr| self.rooms.contains_key(sr))
            .or_else(|| {
                // Fall back to the lexically-first room id.
                let mut ids = self.rooms.keys().cloned().collect::<Vec<_>>();
                ids.sort();
                ids.into_iter().next()
            })
            .context("no rooms loaded")?;

        self.areas.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
        Ok(Rooms {
            rooms: self.rooms,
            start_room,
            areas: self.areas,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AreaFile {
    #[allow(dead_code)]
    version: u32,
    zone_id: String,
    zone_name: Option<String>,
    start_room: Option<String>,
    rooms: Vec<AreaRoom>,
}

#[derive(Debug, Deserialize)]
struct AreaRoom {
    id: String,
    name: String,
    desc: Option<String>,
    exits: Option<Vec<AreaExit>>,
}

#[derive(Debug, Deserialize)]
struct AreaExit {
    dir: String,
    to: String,
}

fn normalize_dir_token(line: &str) -> Option<&'static str> {
    match line.to_ascii_lowercase().as_str() {
        "north" | "n" => Some("north"),
        "south" | "s" => Some("south"),
        "east" | "e" => Some("east"),
        "west" | "w" => Some("west"),
        "up" | "u" => Some("up"),
        "down" | "d" => Some("down"),
        _ => None,
    }
}

fn format_exit_label(dir: &str) -> String {
    match dir.to_ascii_lowercase().as_str() {
        "north" => "north (n)".to_string(),
        "south" => "south (s)".to_string(),
        "east" => "east (e)".to_string(),
        "west" => "west (w)".to_string(),
        "up" => "up (u)".to_string(),
        "down" => "down (d)".to_string(),
        _ => dir.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_world_loads_with_consistent_exits() {
        let rooms = Rooms::load_default().unwrap();
        assert_eq!(rooms.start_room(), "holloway.square");

        // Every exit must point at a loaded room.
        for id in ["holloway.square", "fernway.gate", "undercroft.stair"] {
            let room = rooms.room(id).unwrap();
            for ex in &room.exits {
                assert!(rooms.has_room(&ex.to), "{id} exit {} dangles", ex.dir);
            }
        }
    }

    #[test]
    fn find_exit_matches_names_and_aliases() {
        let rooms = Rooms::load_default().unwrap();
        assert_eq!(
            rooms.find_exit("holloway.square", "north").unwrap().to,
            "holloway.lane"
        );
        assert_eq!(
            rooms.find_exit("holloway.square", "N").unwrap().to,
            "holloway.lane"
        );
        assert_eq!(
            rooms.find_exit("holloway.square", "d").unwrap().to,
            "undercroft.stair"
        );
        assert!(rooms.find_exit("holloway.square", "west").is_none());
        assert!(rooms.find_exit("holloway.square", "").is_none());
    }

    #[test]
    fn render_exits_lists_sorted_labels() {
        let rooms = Rooms::load_default().unwrap();
        assert_eq!(
            rooms.render_exits("holloway.tavern"),
            "exits: west (w)\n"
        );
        let s = rooms.render_exits("holloway.square");
        assert!(s.starts_with("exits: "));
        assert!(s.contains("north (n)"));
        assert!(s.contains("down (d)"));
    }
}
