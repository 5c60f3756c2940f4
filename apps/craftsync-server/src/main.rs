mod transport;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use craftsync_common::{ChunkPos, EntityUid, WorldId, WorldPos};
use craftsync_input::{PlayerAction, RotateData};
use craftsync_persist::{
    CreateWorldOptions, FileWorldStore, InMemoryStore, PersistenceStore, WorldConfig,
};
use craftsync_server::message::GetChunk;
use craftsync_server::{
    ConnectionId, Message, ProjectileHook, ServerConfig, WorldManager, WorldServer, WorldState,
};
use craftsync_stream::FlatTerrainLoader;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "craftsync-server", about = "Authoritative world server for craftsync")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding stored worlds. Worlds live in memory when omitted.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept client connections over TCP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
        /// Tick rate for worlds created by clients that send no config
        #[arg(long, default_value = "40")]
        tick_rate: u32,
    },
    /// List stored worlds
    Worlds,
    /// Create and store an empty world
    Create {
        #[arg(short, long)]
        name: String,
        /// Chunk radius preloaded around the origin
        #[arg(long, default_value = "3")]
        load_distance: i32,
    },
    /// Delete a stored world
    Delete {
        /// Id of the world to delete
        id: String,
    },
    /// Run a scripted two-player session in-process and print what each side receives
    Simulate {
        /// Number of ticks to run
        #[arg(short, long, default_value = "5")]
        ticks: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Serve { bind, tick_rate } => {
            let config = ServerConfig {
                bind,
                data_dir: cli.data_dir,
                world: WorldConfig {
                    tick_rate_hz: tick_rate,
                    ..WorldConfig::default()
                },
            };
            serve(config).await?;
        }
        Commands::Worlds => {
            let store = open_store(cli.data_dir.as_deref())?;
            let worlds = store.list_worlds()?;
            if worlds.is_empty() {
                println!("no stored worlds");
            }
            for meta in worlds {
                println!("{}  {}", meta.world_id, meta.name);
            }
        }
        Commands::Create {
            name,
            load_distance,
        } => {
            let store = open_store(cli.data_dir.as_deref())?;
            let record = store.create_world(CreateWorldOptions {
                name,
                config: WorldConfig {
                    load_distance,
                    ..WorldConfig::default()
                },
            })?;
            println!("created world {} ({})", record.world_id, record.name);
        }
        Commands::Delete { id } => {
            let store = open_store(cli.data_dir.as_deref())?;
            let id = WorldId(id);
            if store.delete_world(&id)? {
                println!("deleted world {id}");
            } else {
                anyhow::bail!("world {id} not found");
            }
        }
        Commands::Simulate { ticks } => simulate(ticks).await?,
    }

    Ok(())
}

fn open_store(data_dir: Option<&Path>) -> anyhow::Result<Arc<dyn PersistenceStore>> {
    Ok(match data_dir {
        Some(dir) => Arc::new(FileWorldStore::open(dir)?),
        None => {
            tracing::warn!("no --data-dir given, worlds will not outlive this process");
            Arc::new(InMemoryStore::new())
        }
    })
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let store = open_store(config.data_dir.as_deref())?;
    let manager = Arc::new(WorldManager::new(store).with_world_defaults(config.world.clone()));
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, tick_rate = config.world.tick_rate_hz, "listening");

    tokio::select! {
        result = transport::serve(listener, Arc::clone(&manager)) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down");
        }
    }
    manager.shutdown_all().await?;
    Ok(())
}

async fn simulate(ticks: u64) -> anyhow::Result<()> {
    let config = WorldConfig {
        load_distance: 1,
        ..WorldConfig::default()
    };
    let terrain = Arc::new(FlatTerrainLoader::new(config.flat_world_height));
    let world = WorldState::new(WorldId::generate(), "simulation", config, terrain);
    world.preload().await;
    let surface = world.config.flat_world_height;
    let mut server = WorldServer::new(world).with_hook(ProjectileHook);

    let players = [
        (ConnectionId(1), EntityUid::from("alice")),
        (ConnectionId(2), EntityUid::from("bob")),
    ];
    let mut inboxes = Vec::new();
    for (conn, uid) in &players {
        let (tx, rx) = mpsc::unbounded_channel();
        server.join(*conn, uid.clone(), tx)?;
        inboxes.push(rx);
    }
    print_inboxes(0, &players, &mut inboxes);

    let (alice, bob) = (&players[0], &players[1]);
    for tick in 1..=ticks {
        match tick {
            1 => {
                let target = WorldPos::new(2, surface, 2);
                server.enqueue(
                    alice.0,
                    Message::Actions(PlayerAction::place_block(alice.1.clone(), target)),
                );
                server.enqueue(
                    bob.0,
                    Message::Actions(PlayerAction::Rotate(RotateData {
                        player_uid: bob.1.clone(),
                        player_rot: glam::Vec3::new(0.0, 1.5, 0.0),
                    })),
                );
            }
            2 => server.enqueue(
                bob.0,
                Message::GetChunk(GetChunk {
                    pos: ChunkPos::new(4, 4),
                }),
            ),
            3 => {
                server.enqueue(
                    alice.0,
                    Message::Actions(PlayerAction::set_belt_index(alice.1.clone(), 7)),
                );
                server.enqueue(
                    alice.0,
                    Message::Actions(PlayerAction::place_block(
                        alice.1.clone(),
                        WorldPos::new(0, 0, 0),
                    )),
                );
            }
            _ => {}
        }
        let report = server.tick().await;
        println!(
            "tick {}: applied={} dropped={} diffs={} chunks={}",
            report.tick,
            report.intents_applied,
            report.intents_dropped,
            report.diffs_sent,
            report.chunks_sent
        );
        print_inboxes(tick, &players, &mut inboxes);
    }
    Ok(())
}

fn print_inboxes(
    tick: u64,
    players: &[(ConnectionId, EntityUid)],
    inboxes: &mut [mpsc::UnboundedReceiver<Message>],
) {
    for ((conn, uid), inbox) in players.iter().zip(inboxes.iter_mut()) {
        while let Ok(message) = inbox.try_recv() {
            println!("  [{tick}] {conn} ({uid}) <- {}", describe(&message));
        }
    }
}

fn describe(message: &Message) -> String {
    match message {
        Message::GameDiff(diff) => {
            let e = &diff.entities;
            format!(
                "gameDiff add={} update={} remove={} chunks={}",
                e.add.as_ref().map_or(0, Vec::len),
                e.update.as_ref().map_or(0, Vec::len),
                e.remove.as_ref().map_or(0, Vec::len),
                diff.chunks.update.as_ref().map_or(0, Vec::len),
            )
        }
        Message::SetChunk(chunk) => format!("setChunk {}", chunk.pos),
        Message::Welcome(welcome) => format!(
            "welcome entities={} players={}",
            welcome.game.entities.len(),
            welcome.game.active_players.len()
        ),
        other => other.tag().to_string(),
    }
}
