//! bramblemud shard server: a TCP line loop in front of the world task.
//!
//! One task owns the world index and the interpreter; connections talk to
//! it over a channel and get their output back on a per-session channel.
//! A tick interval advances the interpreter clock so delayed commands
//! fire with nobody typing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use mudinterp::dispatch::{self, OutputSink};
use mudinterp::{Interpreter, MessageBundle, Paragraph};
use mudworld::{EntityId, EntityKind, Rank, Rooms, WorldIndex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, info, warn};

const MAX_NAME_LEN: usize = 24;
const STARTING_COIN: u32 = 10;

fn usage_and_exit() -> ! {
    eprintln!(
        "bramblemud (shard server)\n\n\
USAGE:\n  bramblemud [--bind HOST:PORT] [--world-dir DIR] [--tick-ms N]\n\n\
ENV:\n  BRAMBLEMUD_BIND       default 0.0.0.0:4000\n  BRAMBLEMUD_WORLD_DIR  optional; default embedded world\n  BRAMBLEMUD_TICK_MS    optional; default 250\n  NODE_ID               optional (for logs only)\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    world_dir: Option<PathBuf>,
    tick_ms: u64,
    node_id: Option<String>,
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("BRAMBLEMUD_BIND")
        .unwrap_or_else(|_| "0.0.0.0:4000".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut world_dir: Option<PathBuf> = std::env::var("BRAMBLEMUD_WORLD_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);

    let mut tick_ms: u64 = std::env::var("BRAMBLEMUD_TICK_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(250);

    let node_id = std::env::var("NODE_ID").ok();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--world-dir" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                world_dir = Some(PathBuf::from(v));
            }
            "--tick-ms" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                tick_ms = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        world_dir,
        tick_ms: tick_ms.max(10),
        node_id,
    }
}

enum WorldMsg {
    Attach {
        name: String,
        tx: mpsc::UnboundedSender<String>,
        reply: oneshot::Sender<EntityId>,
    },
    Detach {
        actor: EntityId,
    },
    Input {
        actor: EntityId,
        line: String,
    },
}

/// Routes deliveries to connected sessions. Entities with no session
/// (NPCs and the departed) report failure; this is where passive NPC
/// triggers would hook in.
#[derive(Default)]
struct SessionSink {
    txs: HashMap<EntityId, mpsc::UnboundedSender<String>>,
}

impl OutputSink for SessionSink {
    fn deliver(&mut self, to: EntityId, text: &str) -> bool {
        match self.txs.get(&to) {
            Some(tx) => tx.send(text.to_string()).is_ok(),
            None => false,
        }
    }
}

/// Starter fixtures: a market, something to buy, something to annoy.
fn seed_world(world: &mut WorldIndex) {
    world.spawn("trader Miggs", EntityKind::Npc, Rank::Player, "holloway.square");
    world.spawn("tin cup", EntityKind::Item, Rank::Player, "holloway.square");
    world.spawn("waxed rope", EntityKind::Item, Rank::Player, "holloway.square");
    world.spawn("bartender", EntityKind::Npc, Rank::Player, "holloway.tavern");
    world.spawn("cistern rat", EntityKind::Npc, Rank::Player, "undercroft.cistern");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bramblemud=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();

    let rooms = match &cfg.world_dir {
        Some(dir) => Rooms::load_dir(dir)
            .with_context(|| format!("load world from {}", dir.display()))?,
        None => Rooms::load_default().context("load embedded world")?,
    };
    let mut world = WorldIndex::new(rooms);
    seed_world(&mut world);
    info!(
        zones = world.rooms().areas().len(),
        start_room = world.start_room(),
        "world loaded"
    );
    let interp = Interpreter::with_builtins().context("build command registry")?;

    let (world_tx, world_rx) = mpsc::channel::<WorldMsg>(1024);
    tokio::spawn(world_task(world, interp, world_rx, cfg.tick_ms));

    let listener = TcpListener::bind(cfg.bind).await?;
    info!(
        bind = %cfg.bind,
        node_id = %cfg.node_id.as_deref().unwrap_or("-"),
        tick_ms = cfg.tick_ms,
        "shard listening"
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let world_tx = world_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(stream, peer, world_tx).await {
                warn!(peer = %peer, err = %e, "connection ended with error");
            }
        });
    }
}

async fn world_task(
    mut world: WorldIndex,
    mut interp: Interpreter,
    mut rx: mpsc::Receiver<WorldMsg>,
    tick_ms: u64,
) {
    let start = std::time::Instant::now();
    let mut sink = SessionSink::default();
    let mut tick = tokio::time::interval(Duration::from_millis(tick_ms));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                let now = start.elapsed().as_millis() as u64;
                interp.advance(&mut world, &mut sink, now);
                match msg {
                    WorldMsg::Attach { name, tx, reply } => {
                        let room = world.start_room().to_string();
                        let actor = world.spawn(name.clone(), EntityKind::Player, Rank::Player, room.clone());
                        world.inv_add(actor, "coin", STARTING_COIN);
                        sink.txs.insert(actor, tx);

                        let mut hello = MessageBundle::for_actor(actor);
                        hello.origin = Some(room.clone());
                        hello.to_actor.push(Paragraph::literal(format!(
                            "welcome to bramblemud, {name}. (try: help)"
                        )));
                        hello.to_actor.push(Paragraph::literal(
                            world.render_room_for(&room, actor).trim_end().to_string(),
                        ));
                        hello.to_origin.push(Paragraph::desc("$actor wanders in."));
                        dispatch::deliver(&world, &mut sink, &hello);

                        info!(actor, name, "attached");
                        let _ = reply.send(actor);
                    }
                    WorldMsg::Detach { actor } => {
                        sink.txs.remove(&actor);
                        interp.detach(actor);
                        if let Some(e) = world.despawn(actor) {
                            let mut bye = MessageBundle::for_actor(actor);
                            bye.origin = Some(e.room_id);
                            bye.to_origin.push(Paragraph::literal(format!(
                                "{} wanders off.",
                                e.name
                            )));
                            dispatch::deliver(&world, &mut sink, &bye);
                            info!(actor, name = %e.name, "detached");
                        }
                    }
                    WorldMsg::Input { actor, line } => {
                        for d in interp.interpret(&mut world, &mut sink, actor, &line) {
                            let _ = sink.deliver(actor, &d.to_string());
                        }
                    }
                }
            }
            _ = tick.tick() => {
                let now = start.elapsed().as_millis() as u64;
                interp.advance(&mut world, &mut sink, now);
            }
        }
    }
}

fn sanitize_name(raw: &str) -> Option<String> {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_NAME_LEN)
        .collect();
    if name.is_empty() { None } else { Some(name) }
}

async fn handle_conn(
    stream: TcpStream,
    peer: SocketAddr,
    world_tx: mpsc::Sender<WorldMsg>,
) -> anyhow::Result<()> {
    let (r, mut w) = stream.into_split();
    let mut reader = BufReader::new(r);

    w.write_all(b"what is your name?\r\n").await?;
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }
    let Some(name) = sanitize_name(&line) else {
        w.write_all(b"huh? (a name needs letters)\r\n").await?;
        return Ok(());
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (reply_tx, reply_rx) = oneshot::channel();
    world_tx
        .send(WorldMsg::Attach {
            name: name.clone(),
            tx: out_tx.clone(),
            reply: reply_tx,
        })
        .await
        .context("world task gone")?;
    let actor = reply_rx.await.context("attach dropped")?;
    info!(peer = %peer, name, actor, "session open");

    // Core renderings use '\n'; the wire speaks CRLF.
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            for part in text.split('\n') {
                if w.write_all(part.as_bytes()).await.is_err() {
                    return;
                }
                if w.write_all(b"\r\n").await.is_err() {
                    return;
                }
            }
        }
        let _ = w.shutdown().await;
    });

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let input = line.trim();
        if input.eq_ignore_ascii_case("quit") {
            let _ = out_tx.send("fare well.".to_string());
            break;
        }
        world_tx
            .send(WorldMsg::Input {
                actor,
                line: input.to_string(),
            })
            .await
            .context("world task gone")?;
    }

    let _ = world_tx.send(WorldMsg::Detach { actor }).await;
    drop(out_tx);
    let _ = writer.await;
    info!(peer = %peer, actor, "session closed");
    Ok(())
}
