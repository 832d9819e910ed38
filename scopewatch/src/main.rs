//! # scopewatch - Main Entry Point
//!
//! Runs the demo workload on a simulated scheduler thread, instrumented by
//! the inspector, and serves the query surface until Ctrl+C or `--duration`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use scopewatch::cli::Args;
use scopewatch::domain::ServerError;
use scopewatch::inspector::Inspector;
use scopewatch::query::QueryService;
use scopewatch::server;
use scopewatch::sim::{SimRuntime, Workload};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ServerError>() {
        Some(ServerError::InvalidAddress(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let inspector = Arc::new(Inspector::new());
    let runtime = SimRuntime::new().with_instrument(Arc::new(inspector.hooks()));
    let query = Arc::new(QueryService::new(Arc::clone(&inspector), Arc::new(runtime.statistics())));

    let config = args.server_config();
    let listener = server::bind(&config).await.context("Failed to start the query surface")?;

    if !quiet {
        println!("scopewatch v{}", env!("CARGO_PKG_VERSION"));
        if let Ok(addr) = listener.local_addr() {
            println!("Task tree:  http://{addr}/tasks.json");
            println!("Stats:      http://{addr}/stats.json");
        }
        println!("Press Ctrl+C to stop");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let scheduler = spawn_scheduler(runtime, args.tick(), Arc::clone(&stop))
        .context("Failed to start the scheduler thread")?;

    let served = server::serve(listener, query, shutdown_signal(args.run_for())).await;

    stop.store(true, Ordering::Relaxed);
    if scheduler.join().is_err() {
        warn!("Scheduler thread panicked");
    }
    if inspector.rejected_events() > 0 {
        warn!("{} scheduler events were rejected by the task tree", inspector.rejected_events());
    }

    served.context("Query surface failed")?;
    Ok(())
}

/// Drive the demo workload in real time until `stop` is set
fn spawn_scheduler(
    runtime: SimRuntime,
    tick: Duration,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name("sim-scheduler".to_string()).spawn(move || {
        let mut workload = Workload::demo(runtime);
        while !stop.load(Ordering::Relaxed) {
            workload.tick(tick);
            thread::sleep(tick);
        }
        workload.finish();
    })
}

async fn shutdown_signal(run_for: Option<Duration>) {
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Interrupted, shutting down");
    };

    match run_for {
        Some(limit) => {
            tokio::select! {
                () = interrupted => {}
                () = tokio::time::sleep(limit) => info!("Ran for {limit:?}, shutting down"),
            }
        }
        None => interrupted.await,
    }
}
