mod loopback;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, unbounded};
use glam::Vec3;
use physlink_kernel::{BodyDesc, ObjectEvent, ObjectEventKind, SyncError, SyncWorld};
use physlink_protocol::{Inbound, Shape, SimConfig};
use physlink_tools::SyncInspector;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use loopback::LoopbackTransport;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "physlink-cli", about = "CLI tool for physlink sync operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Drop spheres onto a plane against a loopback simulation thread
    Demo {
        /// Number of simulation steps
        #[arg(short, long, default_value = "120")]
        steps: u32,
        /// Number of spheres to drop
        #[arg(short, long, default_value = "3")]
        bodies: usize,
        /// YAML or JSON simulation config
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show a simulation config
    Config {
        /// Print the default config as YAML
        #[arg(long)]
        dump: bool,
        /// Validate and print this config file
        path: Option<PathBuf>,
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
            println!("physlink-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", physlink_common::crate_info());
            println!("protocol: {}", physlink_protocol::crate_info());
            println!("tools: {}", physlink_tools::crate_info());
        }
        Commands::Demo { steps, bodies, config } => {
            let config = match config {
                Some(path) => SimConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SimConfig::default(),
            };
            run_demo(config, steps, bodies)?;
        }
        Commands::Config { dump, path } => {
            let config = match path {
                Some(path) => SimConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None if dump => SimConfig::default(),
                None => bail!("nothing to show: pass --dump or a config path"),
            };
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

fn pump_until(
    world: &mut SyncWorld<LoopbackTransport>,
    inbound: &Receiver<Inbound>,
    mut done: impl FnMut(&SyncWorld<LoopbackTransport>) -> bool,
) -> anyhow::Result<()> {
    while !done(world) {
        if let Err(SyncError::InitFailed(reason)) = world.readiness() {
            bail!("simulation failed to start: {reason}");
        }
        let message = inbound
            .recv_timeout(REPLY_TIMEOUT)
            .context("simulation thread stopped answering")?;
        world.handle_message(message);
    }
    Ok(())
}

fn run_demo(config: SimConfig, steps: u32, bodies: usize) -> anyhow::Result<()> {
    let (to_sim, from_core) = unbounded();
    let (to_core, inbound) = unbounded();
    let sim = loopback::spawn(from_core, to_core);

    let mut world = SyncWorld::new(config, LoopbackTransport::new(to_sim));
    world.load_engine_from_disk();

    // Registered before readiness; the commands are replayed once the
    // simulation reports ready.
    world.attach(BodyDesc::new(Shape::Plane { normal: Vec3::Y }, 0.0))?;
    let hits: Rc<RefCell<Vec<String>>> = Rc::default();
    let mut ids = Vec::with_capacity(bodies);
    for i in 0..bodies {
        let id = world.attach(
            BodyDesc::new(Shape::Sphere { radius: 0.5 }, 1.0)
                .with_position(Vec3::new(i as f32 * 0.8, 2.0 + i as f32 * 1.5, 0.0)),
        )?;
        let sink = hits.clone();
        if let Some(record) = world.object_mut(id) {
            record.on(ObjectEventKind::Collision, move |event| {
                if let ObjectEvent::Collision(c) = event {
                    sink.borrow_mut().push(format!(
                        "{id} hit {} normal=({:.2}, {:.2}, {:.2}) rel_vel={:.2}",
                        c.other,
                        c.normal.x,
                        c.normal.y,
                        c.normal.z,
                        c.relative_linear_velocity.length()
                    ));
                }
            });
        }
        ids.push(id);
    }

    pump_until(&mut world, &inbound, |w| w.is_ready())?;
    tracing::info!(transfer = world.transfer_supported(), "simulation ready");

    for step in 0..steps {
        if !world.step(None, None) {
            bail!("step {step} rejected");
        }
        pump_until(&mut world, &inbound, |w| !w.step_in_flight())?;
        for line in hits.borrow_mut().drain(..) {
            println!("step {step:>4}: {line}");
        }
    }

    println!("{}", SyncInspector::summary(&world));
    for id in ids {
        if let Some(info) = SyncInspector::inspect_object(&world, id) {
            println!("  {info}");
        }
    }

    drop(world);
    sim.join()
        .map_err(|_| anyhow::anyhow!("simulation thread panicked"))?;
    Ok(())
}
