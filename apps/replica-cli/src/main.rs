use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use glam::Vec3;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use replica_common::{EntityId, Guid};
use replica_kernel::{NetworkPeer, ReplicationEvents};
use replica_stream::{EngineConfig, EngineStats, ServerEngine};

#[derive(Parser)]
#[command(name = "replica-cli", about = "CLI tool for the replication scheduler")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info and the effective configuration
    Info {
        /// YAML engine configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a deterministic random-walk simulation and report replication counters
    Simulate {
        /// Number of connected players
        #[arg(short, long, default_value = "4")]
        streamers: usize,
        /// Number of replicated objects
        #[arg(short, long, default_value = "200")]
        entities: usize,
        /// Number of server ticks to simulate
        #[arg(short, long, default_value = "600")]
        ticks: u64,
        /// RNG seed for deterministic runs
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Side length of the square world
        #[arg(long, default_value = "400.0")]
        extent: f32,
        /// YAML engine configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Server peer whose GUID owns everything no player has claimed.
struct ServerPeer;

impl NetworkPeer for ServerPeer {
    fn local_guid(&self) -> Guid {
        Guid(0)
    }
}

/// Splitmix64 stream; identical seeds give identical simulations.
struct SimRng(u64);

impl SimRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }
}

#[derive(Debug, Default)]
struct Messages {
    spawn: AtomicUsize,
    update: AtomicUsize,
    despawn: AtomicUsize,
}

impl Messages {
    fn events(self: &Arc<Self>) -> ReplicationEvents {
        let (spawn, update, owner_update, despawn) =
            (self.clone(), self.clone(), self.clone(), self.clone());
        ReplicationEvents::new()
            .on_spawn(move |_, _, _| {
                spawn.spawn.fetch_add(1, Ordering::Relaxed);
                true
            })
            .on_update(move |_, _, _| {
                update.update.fetch_add(1, Ordering::Relaxed);
            })
            .on_owner_update(move |_, _, _| {
                owner_update.update.fetch_add(1, Ordering::Relaxed);
            })
            .on_despawn(move |_, _, _| {
                despawn.despawn.fetch_add(1, Ordering::Relaxed);
            })
    }

    fn total(&self) -> usize {
        self.spawn.load(Ordering::Relaxed)
            + self.update.load(Ordering::Relaxed)
            + self.despawn.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    seed: u64,
    ticks: u64,
    streamers: usize,
    entities: usize,
    simulated_time_ms: u128,
    messages: usize,
    owned_by_players: usize,
    stats: EngineStats,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    Ok(match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    })
}

fn simulate(
    config: EngineConfig,
    streamers: usize,
    entities: usize,
    ticks: u64,
    seed: u64,
    extent: f32,
) -> anyhow::Result<SimulationReport> {
    let tick = config.server_tick();
    let mut engine = ServerEngine::new(config, Arc::new(ServerPeer))?;
    let mut rng = SimRng(seed);
    let messages = Arc::new(Messages::default());
    let half = extent / 2.0;

    let mut players = Vec::with_capacity(streamers);
    for i in 0..streamers {
        let player = engine.spawn_player(Guid(i as u64 + 1), format!("player-{i}"), i as u16)?;
        let position = Vec3::new(rng.range(-half, half), 0.0, rng.range(-half, half));
        engine.set_position(player, position)?;
        players.push(player);
    }

    let mut objects: Vec<EntityId> = Vec::with_capacity(entities);
    for _ in 0..entities {
        let object = engine.spawn_object()?;
        engine.set_events(object, messages.events())?;
        let position = Vec3::new(rng.range(-half, half), 0.0, rng.range(-half, half));
        engine.set_position(object, position)?;
        objects.push(object);
    }

    for _ in 0..ticks {
        for &id in players.iter().chain(&objects) {
            // Most objects rest on any given tick.
            if rng.next_f32() > 0.1 {
                continue;
            }
            let Some(current) = engine
                .world()
                .get::<replica_common::Transform>(id)
                .map(|t| t.position)
            else {
                continue;
            };
            let step = Vec3::new(rng.range(-1.0, 1.0), 0.0, rng.range(-1.0, 1.0));
            let next = (current + step).clamp(Vec3::splat(-half), Vec3::splat(half));
            engine.set_position(id, next)?;
        }
        engine.update(tick);
    }

    let owned_by_players = objects
        .iter()
        .filter(|&&id| engine.owner_of(id).is_some())
        .count();

    Ok(SimulationReport {
        seed,
        ticks,
        streamers,
        entities,
        simulated_time_ms: engine.now().as_millis(),
        messages: messages.total(),
        owned_by_players,
        stats: *engine.stats(),
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info { config } => {
            let config = load_config(config.as_ref())?;
            println!("replica-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("stream: {}", replica_stream::crate_info());
            println!(
                "tick rate: {} Hz (server tick {:?})",
                config.tick_rate_hz,
                config.server_tick()
            );
            println!("streaming tick: {:?}", config.streaming_tick());
            println!("default update interval: {:?}", config.default_update_interval());
            println!("default range: {}", config.default_range);
            println!(
                "regulator: every {:?}, step {:?}, epsilon {}",
                config.regulator.interval(),
                config.regulator.step(),
                config.regulator.epsilon
            );
        }
        Commands::Simulate {
            streamers,
            entities,
            ticks,
            seed,
            extent,
            config,
            json,
        } => {
            let config = load_config(config.as_ref())?;
            tracing::info!(streamers, entities, ticks, seed, "starting simulation");
            let report = simulate(config, streamers, entities, ticks, seed, extent)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let stats = &report.stats;
                println!(
                    "Simulated {} ticks ({} ms): seed={}, streamers={}, entities={}",
                    report.ticks,
                    report.simulated_time_ms,
                    report.seed,
                    report.streamers,
                    report.entities
                );
                println!(
                    "Replication: spawned={}, updated={}, owner_updated={}, despawned={}",
                    stats.replication.spawned,
                    stats.replication.updated,
                    stats.replication.owner_updated,
                    stats.replication.despawned
                );
                println!(
                    "Regulator: active={}, resting={}",
                    stats.regulator_active, stats.regulator_resting
                );
                println!(
                    "Ownership: changes={}, owned_by_players={}",
                    stats.owner_changes, report.owned_by_players
                );
                println!("Messages sent: {}", report.messages);
            }
        }
    }

    Ok(())
}
