//! devstack CLI.
//!
//! # Usage
//!
//! ```bash
//! devstack plan [config.json]   # print the creation order
//! devstack up [config.json]     # provision the stack and configure topics
//! ```
//!
//! Settings come from the optional JSON file, then `DEVSTACK_*` environment
//! variables (a `.env` file is read first). `DEVSTACK_LOG` and
//! `DEVSTACK_LOG_FORMAT` control logging.
//!
//! `up` provisions on the runtime named by `runtime` / `DEVSTACK_RUNTIME`:
//! the in-process simulation (default) or, in builds with the `docker`
//! feature, the local Docker daemon. `plan` never contacts a runtime. Topics
//! are configured on an in-process broker cluster.

#![expect(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "command-line output"
)]

use std::path::PathBuf;
use std::sync::Arc;

use devstack_backend::{Backends, SimulatedBackend};
use devstack_bootstrap::InMemoryCluster;
use devstack_core::{StackConfig, TracingSetup};
use devstack_engine::hooks::ProvisionEvent;
use devstack_graph::ResourceId;
use devstack_stack::{Stack, StackError};

const USAGE: &str = "Usage: devstack <plan|up> [config.json]";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    TracingSetup::from_env().init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let config_path = args.get(2).map(PathBuf::from);

    let config = StackConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let result = match command.as_str() {
        "plan" => plan(config),
        "up" => up(config).await,
        other => {
            eprintln!("Unknown command '{other}'");
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn build(config: StackConfig, backends: Backends) -> Result<Stack, StackError> {
    Stack::new(config, backends, Arc::new(InMemoryCluster::new()))
}

fn plan(config: StackConfig) -> Result<(), StackError> {
    let stack = build(config, Backends::shared(Arc::new(SimulatedBackend::new())))?;
    for (step, resource) in stack.plan()?.into_iter().enumerate() {
        let dependencies: Vec<&str> = resource
            .dependencies
            .iter()
            .map(ResourceId::as_str)
            .collect();
        if dependencies.is_empty() {
            println!("{:>3}. {} ({})", step + 1, resource.id, resource.kind());
        } else {
            println!(
                "{:>3}. {} ({}) <- {}",
                step + 1,
                resource.id,
                resource.kind(),
                dependencies.join(", ")
            );
        }
    }
    Ok(())
}

async fn up(config: StackConfig) -> Result<(), StackError> {
    let backends = devstack_stack::connect(config.runtime).await?;
    let stack = build(config, backends)?;
    stack
        .hooks()
        .register_observer("progress", |event| match event {
            ProvisionEvent::ResourceReady {
                resource, action, ..
            } => println!("  ready    {resource} ({action})"),
            ProvisionEvent::ResourceFailed {
                resource, error, ..
            } => println!("  failed   {resource}: {error}"),
            ProvisionEvent::ResourceSkipped {
                resource, cause, ..
            } => println!("  skipped  {resource} (after {cause})"),
            _ => {}
        })
        .ok();

    let outcome = stack.up().await?;
    for topic in &outcome.topics.created {
        println!("  topic    {topic} (created)");
    }
    for topic in &outcome.topics.unchanged {
        println!("  topic    {topic} (unchanged)");
    }
    print!("{}", outcome.exports);
    Ok(())
}
