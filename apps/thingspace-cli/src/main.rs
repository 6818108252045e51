use clap::{Parser, Subcommand};
use glam::Vec3;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thingspace_core::{
    CommandKind, CoreConfig, FlatGridSampler, GenerateOptions, Nexus, Reply, Status,
};
use thingspace_render::NullRenderFactory;
use tracing_subscriber::EnvFilter;

const COMMAND_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "thingspace-cli", about = "CLI tool for thingspace operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Persist the thing store under this directory
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Generate a flora environment and report what was spawned
    Generate {
        /// Sampled area width, in world units
        #[arg(long, default_value = "32")]
        width: u32,
        /// Sampled area height, in world units
        #[arg(long, default_value = "32")]
        height: u32,
        /// Spacing between sample rays, in world units
        #[arg(short, long, default_value = "1.0")]
        density: f32,
        /// Name of the surface to cast against
        #[arg(short, long, default_value = "terrain")]
        surface: String,
    },
    /// Run a visibility pass over a freshly generated world
    Visibility {
        /// Number of things to spawn before querying
        #[arg(short, long, default_value = "20")]
        things: u64,
        /// Near rendering radius around the eye
        #[arg(short, long, default_value = "50.0")]
        render_distance: f32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("thingspace-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("core: {}", thingspace_core::crate_info());
            println!("persist: {}", thingspace_persist::crate_info());
            println!("render: {}", thingspace_render::crate_info());
        }
        Commands::Generate {
            width,
            height,
            density,
            surface,
        } => {
            let mut nexus = make_nexus(cli.db);
            nexus.initialize()?;

            let ticket = nexus.submit(CommandKind::GenerateEnvironment {
                options: GenerateOptions {
                    width,
                    height,
                    density,
                    surface,
                },
            });
            wait_ok(&ticket, "generation")?;
            settle(&nexus);

            let snapshot = nexus.store().snapshot();
            let trees = snapshot
                .values()
                .filter(|t| t.class_id() == thingspace_core::TREE_CLASS)
                .count();
            println!(
                "Generated {} things ({} grass, {} trees)",
                snapshot.len(),
                snapshot.len() - trees,
                trees
            );
            nexus.shutdown()?;
        }
        Commands::Visibility {
            things,
            render_distance,
        } => {
            let mut nexus = make_nexus(cli.db);
            nexus.initialize()?;

            for i in 1..=things {
                let mut thing = thingspace_kernel::Thing::new(
                    thingspace_common::ThingId(i),
                    thingspace_core::GRASS_CLASS,
                    1,
                );
                thing.initialize();
                thing.set_location(Vec3::new(i as f32 * 10.0, 0.0, 0.0));
                let ticket = nexus.submit(CommandKind::AddThing {
                    object: thingspace_core::WorldObject::Thing(Box::new(thing)),
                });
                wait_ok(&ticket, "add")?;
            }

            let ticket = nexus.submit(CommandKind::ListToRender {
                eye: Vec3::ZERO,
                render_distance,
                far_distance: render_distance * 4.0,
                previous_spatials: HashSet::new(),
                previous_sprites: HashSet::new(),
            });
            let outcome = ticket
                .wait_timeout(COMMAND_WAIT)
                .ok_or_else(|| anyhow::anyhow!("visibility query timed out"))?;
            let Reply::RenderSets(diff) = outcome.reply else {
                anyhow::bail!("visibility query failed: {}", outcome.message);
            };
            println!(
                "Eye at origin, render distance {render_distance}: attach {} spatials, {} sprites",
                diff.attach_spatials.len(),
                diff.attach_sprites.len()
            );
            for spatial in &diff.attach_spatials {
                println!("  attach {}", spatial.name());
            }
            nexus.shutdown()?;
        }
    }

    Ok(())
}

fn make_nexus(db: Option<PathBuf>) -> Nexus {
    let nexus = Nexus::new(
        CoreConfig::default(),
        Arc::new(NullRenderFactory::new()),
        Arc::new(FlatGridSampler { ground_y: 0.0 }),
    );
    match db {
        Some(path) => nexus.with_db(path),
        None => nexus,
    }
}

fn wait_ok(ticket: &thingspace_core::Ticket, what: &str) -> anyhow::Result<()> {
    let outcome = ticket
        .wait_timeout(COMMAND_WAIT)
        .ok_or_else(|| anyhow::anyhow!("{what} timed out"))?;
    if outcome.status != Status::Completed {
        anyhow::bail!("{what} failed: {}", outcome.message);
    }
    Ok(())
}

/// Generation resubmits adds through the pipeline; give them a moment to
/// drain before reading the store.
fn settle(nexus: &Nexus) {
    let mut last = nexus.store().len();
    loop {
        std::thread::sleep(Duration::from_millis(100));
        let now = nexus.store().len();
        if now == last {
            return;
        }
        last = now;
    }
}
