//! The built-in command table and its execution bodies.
//!
//! Every command registers immutable metadata beside its body in
//! [`builtin_registry`]; registration order is the documented tie-break
//! when keywords overlap.

use anyhow::Context;
use mudworld::{EntityKind, Rank};
use regex::Regex;

use crate::cmd::{
    CmdFlags, CommandSpec, ExecCtx, LookupScope, Outcome, ParamSpec, ParamUsage, RangeClass,
    Registry,
};
use crate::dispatch::{MessageBundle, Paragraph};

const COIN: &str = "coin";

// What the market square trades in, and for how much.
const PRICES: &[(&str, u32)] = &[
    ("herb sprig", 1),
    ("tin cup", 2),
    ("waxed rope", 4),
    ("river pearl", 12),
];

fn price_of(name: &str) -> Option<u32> {
    PRICES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, p)| *p)
}

pub fn builtin_registry() -> anyhow::Result<Registry> {
    let dir_pattern = || {
        Regex::new("(?i)north|south|east|west|up|down|[nsewud]").context("direction pattern")
    };
    let mut reg = Registry::new();

    reg.register(CommandSpec {
        keyword: "say",
        aliases: &["'"],
        min_rank: Rank::Player,
        params: vec![ParamSpec::required(ParamUsage::Supporting, LookupScope::Greedy)],
        range: RangeClass::Local,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "say <text>",
        body: say_body,
    });

    reg.register(CommandSpec {
        keyword: "tell",
        aliases: &["whisper"],
        min_rank: Rank::Player,
        params: vec![
            ParamSpec::required(
                ParamUsage::Target,
                LookupScope::World {
                    kind: Some(EntityKind::Player),
                },
            ),
            ParamSpec::required(ParamUsage::Supporting, LookupScope::Greedy),
        ],
        range: RangeClass::Global,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "tell <who> <text>",
        body: tell_body,
    });

    reg.register(CommandSpec {
        keyword: "shout",
        aliases: &["yell"],
        min_rank: Rank::Player,
        params: vec![ParamSpec::required(ParamUsage::Supporting, LookupScope::Greedy)],
        range: RangeClass::Regional(2),
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "shout <text>",
        body: shout_body,
    });

    reg.register(CommandSpec {
        keyword: "emote",
        aliases: &["em", "me", "pose"],
        min_rank: Rank::Player,
        params: vec![ParamSpec::required(ParamUsage::Supporting, LookupScope::Greedy)],
        range: RangeClass::Local,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "emote <motion>",
        body: emote_body,
    });

    reg.register(CommandSpec {
        keyword: "look",
        aliases: &["l"],
        min_rank: Rank::Player,
        params: vec![ParamSpec::optional(
            ParamUsage::Subject,
            LookupScope::World { kind: None },
        )],
        range: RangeClass::Local,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "look [what]",
        body: look_body,
    });

    reg.register(CommandSpec {
        keyword: "go",
        aliases: &[
            "north", "south", "east", "west", "up", "down", "n", "s", "e", "w", "u", "d",
        ],
        min_rank: Rank::Player,
        params: vec![ParamSpec::required(
            ParamUsage::Supporting,
            LookupScope::Pattern(dir_pattern()?),
        )],
        range: RangeClass::SelfOnly,
        flags: CmdFlags {
            keyword_is_subject: true,
            ..CmdFlags::default()
        },
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "go <exit>",
        body: go_body,
    });

    reg.register(CommandSpec {
        keyword: "get",
        aliases: &["take"],
        min_rank: Rank::Player,
        params: vec![ParamSpec::required(
            ParamUsage::Subject,
            LookupScope::World {
                kind: Some(EntityKind::Item),
            },
        )],
        range: RangeClass::Touch,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "get <item>",
        body: get_body,
    });

    reg.register(CommandSpec {
        keyword: "drop",
        aliases: &[],
        min_rank: Rank::Player,
        params: vec![ParamSpec::required(ParamUsage::Subject, LookupScope::Inventory)],
        range: RangeClass::Touch,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "drop <item>",
        body: drop_body,
    });

    reg.register(CommandSpec {
        keyword: "throw",
        aliases: &[],
        min_rank: Rank::Player,
        params: vec![
            ParamSpec::required(ParamUsage::Subject, LookupScope::Inventory),
            ParamSpec::required(ParamUsage::Target, LookupScope::Direction { kind: None }),
        ],
        range: RangeClass::Regional(1),
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "throw <item> <direction>",
        body: throw_body,
    });

    // Two descriptors share the `barter` keyword; the regex sub-form
    // params keep their shapes disjoint, and registration order is the
    // tie-break if that ever changes.
    reg.register(CommandSpec {
        keyword: "barter",
        aliases: &["trade"],
        min_rank: Rank::Player,
        params: vec![
            ParamSpec::required(
                ParamUsage::Supporting,
                LookupScope::Pattern(Regex::new("(?i)buy").context("buy pattern")?),
            ),
            ParamSpec::required(
                ParamUsage::Subject,
                LookupScope::World {
                    kind: Some(EntityKind::Item),
                },
            ),
        ],
        range: RangeClass::Touch,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "barter buy <item>",
        body: barter_buy_body,
    });

    reg.register(CommandSpec {
        keyword: "barter",
        aliases: &["trade"],
        min_rank: Rank::Player,
        params: vec![
            ParamSpec::required(
                ParamUsage::Supporting,
                LookupScope::Pattern(Regex::new("(?i)sell").context("sell pattern")?),
            ),
            ParamSpec::required(ParamUsage::Subject, LookupScope::Inventory),
        ],
        range: RangeClass::Touch,
        flags: CmdFlags::default(),
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "barter sell <item>",
        body: barter_sell_body,
    });

    reg.register(CommandSpec {
        keyword: "forage",
        aliases: &[],
        min_rank: Rank::Player,
        params: Vec::new(),
        range: RangeClass::SelfOnly,
        flags: CmdFlags::default(),
        startup_ms: 10_000,
        cooldown_ms: 20_000,
        startup_msg: Some("you crouch and start picking through the greenery."),
        cooldown_msg: Some("you brush the dirt from your hands."),
        help: "forage",
        body: forage_body,
    });

    reg.register(CommandSpec {
        keyword: "warp",
        aliases: &[],
        min_rank: Rank::Staff,
        params: vec![ParamSpec::required(
            ParamUsage::Supporting,
            LookupScope::Pattern(Regex::new("[A-Za-z0-9_.]+").context("room id pattern")?),
        )],
        range: RangeClass::Global,
        flags: CmdFlags {
            unlisted: true,
            ..CmdFlags::default()
        },
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "warp <room_id>",
        body: warp_body,
    });

    reg.register(CommandSpec {
        keyword: "who",
        aliases: &[],
        min_rank: Rank::Player,
        params: Vec::new(),
        range: RangeClass::Global,
        flags: CmdFlags {
            skip_queue: true,
            ..CmdFlags::default()
        },
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "who",
        body: who_body,
    });

    reg.register(CommandSpec {
        keyword: "help",
        aliases: &["?", "commands"],
        min_rank: Rank::Player,
        params: Vec::new(),
        range: RangeClass::Global,
        flags: CmdFlags {
            skip_queue: true,
            ..CmdFlags::default()
        },
        startup_ms: 0,
        cooldown_ms: 0,
        startup_msg: None,
        cooldown_msg: None,
        help: "help",
        body: help_body,
    });

    Ok(reg)
}

fn say_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let text = ctx.inv.supporting_text().unwrap_or_default().to_string();
    let mut b = MessageBundle::for_actor(ctx.actor_id());
    b.origin = Some(ctx.inv.origin.clone());
    b.to_actor.push(Paragraph::literal(format!("You say '{text}'")));
    b.to_origin
        .push(Paragraph::desc(format!("$actor says '{text}'")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn tell_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let Some(target) = ctx.inv.target_entity() else {
        return ctx.reject("tell who?");
    };
    if target == ctx.actor_id() {
        return ctx.reject("you mutter to yourself.");
    }
    if ctx.world.entity(target).is_none() {
        return ctx.reject("they are gone.");
    }
    let text = ctx.inv.supporting_text().unwrap_or_default().to_string();

    let mut b = MessageBundle::for_actor(ctx.actor_id());
    b.target = Some(target);
    b.to_actor
        .push(Paragraph::desc(format!("you tell $target '{text}'")));
    b.to_target
        .push(Paragraph::desc(format!("$actor tells you '{text}'")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn shout_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let text = ctx.inv.supporting_text().unwrap_or_default().to_string();
    let actor = ctx.actor_id();

    let mut near = MessageBundle::for_actor(actor);
    near.origin = Some(ctx.inv.origin.clone());
    near.to_actor
        .push(Paragraph::literal(format!("You shout '{text}'")));
    near.to_origin
        .push(Paragraph::desc(format!("$actor shouts '{text}'")));
    ctx.dispatch(&near);

    // Carries two rooms out, per the snapshot taken at resolution.
    let rooms: Vec<String> = ctx
        .inv
        .surroundings
        .iter()
        .filter(|(room, d)| *d > 0 && *d <= 2 && *room != ctx.inv.origin)
        .map(|(room, _)| room.clone())
        .collect();
    for room in rooms {
        let mut far = MessageBundle::for_actor(actor);
        far.origin = Some(room);
        far.to_origin.push(Paragraph::desc(format!(
            "from somewhere nearby, $actor shouts '{text}'"
        )));
        ctx.dispatch(&far);
    }
    Ok(Outcome::Success)
}

fn emote_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let text = ctx.inv.supporting_text().unwrap_or_default().to_string();
    let name = ctx.world.name_of(ctx.actor_id()).to_string();

    let mut b = MessageBundle::for_actor(ctx.actor_id());
    b.origin = Some(ctx.inv.origin.clone());
    b.to_actor.push(Paragraph::literal(format!("* {name} {text}")));
    b.to_origin.push(Paragraph::desc(format!("* $actor {text}")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn look_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let text = match ctx.inv.subject_entity() {
        None => {
            let Some(room) = ctx.actor_room() else {
                return Ok(Outcome::Failure);
            };
            ctx.world.render_room_for(&room, actor)
        }
        Some(id) => {
            let Some(e) = ctx.world.entity(id) else {
                return ctx.reject("you don't see that here anymore.");
            };
            match e.kind {
                EntityKind::Item => format!("{}. nothing special about it.", e.name),
                EntityKind::Npc => format!("{} eyes you back.", e.name),
                EntityKind::Player => format!("{} looks like they know what they're doing.", e.name),
            }
        }
    };

    let mut b = MessageBundle::for_actor(actor);
    b.to_actor.push(Paragraph::literal(text.trim_end()));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn go_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let token = ctx.inv.supporting_text().unwrap_or_default().to_string();
    let actor = ctx.actor_id();
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };
    let Some(exit) = ctx.world.rooms().find_exit(&cur, &token) else {
        let exits = ctx.world.rooms().render_exits(&cur);
        return ctx.reject(&format!("huh? (no such exit)\n{}", exits.trim_end()));
    };
    let dir = exit.dir.clone();
    let to = exit.to.clone();

    let mut leave = MessageBundle::for_actor(actor);
    leave.origin = Some(cur);
    leave
        .to_origin
        .push(Paragraph::desc(format!("$actor leaves {dir}.")));
    ctx.dispatch(&leave);

    ctx.world.move_entity(actor, &to);

    let mut arrive = MessageBundle::for_actor(actor);
    arrive.destination = Some(to.clone());
    arrive
        .to_destination
        .push(Paragraph::desc("$actor arrives."));
    ctx.dispatch(&arrive);

    let view = ctx.world.render_room_for(&to, actor);
    let mut here = MessageBundle::for_actor(actor);
    here.to_actor.push(Paragraph::literal(view.trim_end()));
    ctx.dispatch(&here);
    Ok(Outcome::Success)
}

fn get_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let Some(item) = ctx.inv.subject_entity() else {
        return ctx.reject("get what?");
    };
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };
    // Re-check: the floor may have changed since resolution.
    let name = match ctx.world.entity(item) {
        Some(e) if e.kind == EntityKind::Item && e.room_id == cur => e.name.clone(),
        _ => return ctx.reject("it isn't here anymore."),
    };

    ctx.world.despawn(item);
    ctx.world.inv_add(actor, &name, 1);

    let mut b = MessageBundle::for_actor(actor);
    b.subject = Some(item);
    b.origin = Some(cur);
    b.to_actor
        .push(Paragraph::literal(format!("you pick up the {name}.")));
    b.to_origin
        .push(Paragraph::desc(format!("$actor picks up the {name}.")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn drop_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let Some(name) = ctx.inv.subject_item() else {
        return ctx.reject("drop what?");
    };
    let name = name.to_string();
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };
    if !ctx.world.inv_remove(actor, &name, 1) {
        return ctx.reject("you aren't holding that.");
    }
    ctx.world
        .spawn(name.clone(), EntityKind::Item, Rank::Player, cur.clone());

    let mut b = MessageBundle::for_actor(actor);
    b.origin = Some(cur);
    b.to_actor
        .push(Paragraph::literal(format!("you drop the {name}.")));
    b.to_origin
        .push(Paragraph::desc(format!("$actor drops the {name}.")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn throw_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let Some(item) = ctx.inv.subject_item() else {
        return ctx.reject("throw what?");
    };
    let item = item.to_string();
    let Some(target) = ctx.inv.target_entity() else {
        return ctx.reject("throw it at whom?");
    };
    // Re-check: the target may have wandered off since resolution.
    let Some(dest) = ctx.world.entity(target).map(|e| e.room_id.clone()) else {
        return ctx.reject("they are gone.");
    };
    if !ctx.world.inv_remove(actor, &item, 1) {
        return ctx.reject("you aren't holding that.");
    }
    ctx.world
        .spawn(item.clone(), EntityKind::Item, Rank::Player, dest.clone());

    let mut b = MessageBundle::for_actor(actor);
    b.target = Some(target);
    b.origin = Some(ctx.inv.origin.clone());
    b.destination = Some(dest);
    b.to_actor
        .push(Paragraph::desc(format!("you throw the {item} at $target.")));
    b.to_target
        .push(Paragraph::desc(format!("$actor throws a {item} at you!")));
    b.to_origin
        .push(Paragraph::desc(format!("$actor throws a {item} at $target.")));
    b.to_destination.push(Paragraph::desc(format!(
        "a {item} sails in and lands near $target."
    )));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn barter_buy_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let Some(item) = ctx.inv.subject_entity() else {
        return ctx.reject("buy what?");
    };
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };
    let name = match ctx.world.entity(item) {
        Some(e) if e.kind == EntityKind::Item && e.room_id == cur => e.name.clone(),
        _ => return ctx.reject("that isn't for sale here."),
    };
    let Some(price) = price_of(&name) else {
        return ctx.reject("no one here trades in that.");
    };
    let have = ctx
        .world
        .entity(actor)
        .and_then(|e| e.inv.get(COIN).copied())
        .unwrap_or(0);
    if have < price {
        return ctx.reject(&format!("you need {price} coin for that."));
    }

    ctx.world.inv_remove(actor, COIN, price);
    ctx.world.despawn(item);
    ctx.world.inv_add(actor, &name, 1);

    let mut b = MessageBundle::for_actor(actor);
    b.origin = Some(cur);
    b.to_actor.push(Paragraph::literal(format!(
        "you buy the {name} for {price} coin."
    )));
    b.to_origin
        .push(Paragraph::desc(format!("$actor buys the {name}.")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn barter_sell_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let Some(name) = ctx.inv.subject_item() else {
        return ctx.reject("sell what?");
    };
    let name = name.to_string();
    let Some(price) = price_of(&name) else {
        return ctx.reject("no one here wants that.");
    };
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };
    if !ctx.world.inv_remove(actor, &name, 1) {
        return ctx.reject("you aren't holding that.");
    }
    ctx.world
        .spawn(name.clone(), EntityKind::Item, Rank::Player, cur.clone());
    ctx.world.inv_add(actor, COIN, price);

    let mut b = MessageBundle::for_actor(actor);
    b.origin = Some(cur);
    b.to_actor.push(Paragraph::literal(format!(
        "you sell the {name} for {price} coin."
    )));
    b.to_origin
        .push(Paragraph::desc(format!("$actor sells a {name}.")));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn forage_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    // The startup delay may have outlived the actor.
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };
    ctx.world.inv_add(actor, "herb sprig", 1);

    let mut b = MessageBundle::for_actor(actor);
    b.origin = Some(cur);
    b.to_actor
        .push(Paragraph::literal("you come up with a herb sprig."));
    b.to_origin
        .push(Paragraph::desc("$actor pulls something out of the ground."));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn warp_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let actor = ctx.actor_id();
    let room = ctx.inv.supporting_text().unwrap_or_default().to_string();
    if !ctx.world.rooms().has_room(&room) {
        return ctx.reject("no such room.");
    }
    let Some(cur) = ctx.actor_room() else {
        return Ok(Outcome::Failure);
    };

    let mut vanish = MessageBundle::for_actor(actor);
    vanish.origin = Some(cur);
    vanish
        .to_origin
        .push(Paragraph::desc("$actor vanishes with a soft pop."));
    ctx.dispatch(&vanish);

    ctx.world.move_entity(actor, &room);

    let mut appear = MessageBundle::for_actor(actor);
    appear.destination = Some(room.clone());
    appear
        .to_destination
        .push(Paragraph::desc("$actor appears with a soft pop."));
    ctx.dispatch(&appear);

    let view = ctx.world.render_room_for(&room, actor);
    let mut here = MessageBundle::for_actor(actor);
    here.to_actor.push(Paragraph::literal(view.trim_end()));
    ctx.dispatch(&here);
    Ok(Outcome::Success)
}

fn who_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let mut names = ctx
        .world
        .entities()
        .filter(|e| e.kind == EntityKind::Player)
        .map(|e| e.name.clone())
        .collect::<Vec<_>>();
    names.sort();

    let text = if names.is_empty() {
        "nobody is around.".to_string()
    } else {
        format!("around: {}", names.join(", "))
    };
    let mut b = MessageBundle::for_actor(ctx.actor_id());
    b.to_actor.push(Paragraph::literal(text));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}

fn help_body(ctx: &mut ExecCtx<'_>) -> anyhow::Result<Outcome> {
    let rank = ctx
        .world
        .entity(ctx.actor_id())
        .map(|e| e.rank)
        .unwrap_or(Rank::Player);

    let mut s = String::from("commands:\n");
    for spec in ctx.registry.specs() {
        if spec.flags.unlisted || spec.min_rank > rank {
            continue;
        }
        s.push_str("  ");
        s.push_str(spec.help);
        s.push('\n');
    }
    s.push_str("  halt (cancel the current action and the queue)\n");
    s.push_str("  flush (clear the queue only)");

    let mut b = MessageBundle::for_actor(ctx.actor_id());
    b.to_actor.push(Paragraph::literal(s));
    ctx.dispatch(&b);
    Ok(Outcome::Success)
}
