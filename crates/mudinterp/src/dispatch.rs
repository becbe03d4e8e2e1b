//! Multi-target message delivery.
//!
//! A command body produces one [`MessageBundle`]; `deliver` fans it out to
//! the five audience classes in a fixed order (actor, subject, target,
//! origin occupants, destination occupants), rendering each paragraph from
//! the recipient's own perspective.

use mudworld::{EntityId, EntityKind, WorldIndex};

/// The per-actor output channel. Returns whether delivery succeeded; a
/// failed recipient never blocks the rest of a dispatch.
pub trait OutputSink {
    fn deliver(&mut self, to: EntityId, text: &str) -> bool;
}

/// One renderable paragraph: a literal override, a structured description
/// with substitution placeholders, or both (the override wins).
#[derive(Debug, Clone, Default)]
pub struct Paragraph {
    pub literal: Option<String>,
    pub desc: Option<String>,
}

impl Paragraph {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            literal: Some(text.into()),
            desc: None,
        }
    }

    /// A template with `$actor` / `$subject` / `$target` placeholders,
    /// substituted per recipient at delivery time.
    pub fn desc(template: impl Into<String>) -> Self {
        Self {
            literal: None,
            desc: Some(template.into()),
        }
    }

    fn render(&self, world: &WorldIndex, b: &MessageBundle, recipient: EntityId) -> String {
        if let Some(text) = &self.literal {
            return text.clone();
        }
        let Some(template) = &self.desc else {
            return String::new();
        };

        let mut s = template.clone();
        for (placeholder, anchor) in [
            ("$actor", b.actor),
            ("$subject", b.subject),
            ("$target", b.target),
        ] {
            if !s.contains(placeholder) {
                continue;
            }
            let name = match anchor {
                Some(id) if id == recipient => "you".to_string(),
                Some(id) => world.name_of(id).to_string(),
                None => "someone".to_string(),
            };
            s = s.replace(placeholder, &name);
        }
        s
    }
}

/// Up to five ordered paragraph sequences keyed by audience class. An
/// empty sequence means no dispatch to that class.
#[derive(Debug, Clone, Default)]
pub struct MessageBundle {
    pub actor: Option<EntityId>,
    pub subject: Option<EntityId>,
    pub target: Option<EntityId>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub to_actor: Vec<Paragraph>,
    pub to_subject: Vec<Paragraph>,
    pub to_target: Vec<Paragraph>,
    pub to_origin: Vec<Paragraph>,
    pub to_destination: Vec<Paragraph>,
}

impl MessageBundle {
    pub fn for_actor(actor: EntityId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::default()
        }
    }
}

fn send(
    world: &WorldIndex,
    out: &mut dyn OutputSink,
    b: &MessageBundle,
    recipient: EntityId,
    paras: &[Paragraph],
) {
    let text = paras
        .iter()
        .map(|p| p.render(world, b, recipient))
        .collect::<Vec<_>>()
        .join("\n");
    if !out.deliver(recipient, &text) {
        tracing::debug!(recipient, "message delivery failed");
    }
}

/// Deliver a bundle. Processing order within one call is fixed: actor,
/// subject, target, origin, destination. Occupant broadcasts skip anyone
/// already served individually; floor items are contents, not occupants.
pub fn deliver(world: &WorldIndex, out: &mut dyn OutputSink, b: &MessageBundle) {
    if let Some(id) = b.actor {
        if !b.to_actor.is_empty() {
            send(world, out, b, id, &b.to_actor);
        }
    }
    if let Some(id) = b.subject {
        if !b.to_subject.is_empty() {
            send(world, out, b, id, &b.to_subject);
        }
    }
    if let Some(id) = b.target {
        if !b.to_target.is_empty() {
            send(world, out, b, id, &b.to_target);
        }
    }

    for (room, paras) in [
        (b.origin.as_deref(), &b.to_origin),
        (b.destination.as_deref(), &b.to_destination),
    ] {
        let Some(room) = room else {
            continue;
        };
        if paras.is_empty() {
            continue;
        }
        for occ in world.occupants_of(room) {
            if Some(occ) == b.actor || Some(occ) == b.subject || Some(occ) == b.target {
                continue;
            }
            // NPCs stay in: they may hold passive triggers behind a sink.
            let Some(e) = world.entity(occ) else {
                continue;
            };
            if e.kind == EntityKind::Item {
                continue;
            }
            send(world, out, b, occ, paras);
        }
    }
}
