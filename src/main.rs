use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{Value, json};
use taskmesh::center::service::Center;
use taskmesh::worker::registry::FunctionRegistry;
use taskmesh::worker::service::Worker;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 5 {
        eprintln!(
            "Usage: {} --role <center|worker> --bind <addr:port> [--center <addr:port>] [--ncores <n>]",
            args[0]
        );
        eprintln!("Example: {} --role center --bind 127.0.0.1:8787", args[0]);
        eprintln!(
            "Example: {} --role worker --bind 127.0.0.1:8788 --center 127.0.0.1:8787 --ncores 4",
            args[0]
        );

        std::process::exit(1);
    }

    let mut role: Option<String> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut center_addr: Option<SocketAddr> = None;
    let mut ncores: usize = 1;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--role" => {
                role = Some(args[i + 1].clone());
                i += 2;
            }
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--center" => {
                center_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--ncores" => {
                ncores = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let role = role.expect("--role is required");
    let bind_addr = bind_addr.expect("--bind is required");

    match role.as_str() {
        "center" => run_center(bind_addr).await,
        "worker" => {
            let center = center_addr.expect("--center is required for workers");
            run_worker(bind_addr, center, ncores).await
        }
        other => {
            eprintln!("Unknown role: {} (expected center or worker)", other);
            std::process::exit(1);
        }
    }
}

async fn run_center(bind_addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("Starting center on {}", bind_addr);

    // 1. Directory service:
    let center = Center::new(bind_addr).await?;
    let address = center.address();
    center.clone().start().await?;
    tracing::info!("Center listening on {}", address);

    // 2. Spawn stats reporter:
    let stats_center = center.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let (keys, workers) = stats_center.stats().await;
            tracing::info!(
                "Directory stats: {} worker(s), {} tracked key(s)",
                workers,
                keys
            );
        }
    });

    // 3. Run until Ctrl+C or a terminate request:
    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal(center.shutdown_token()).await;
    tracing::info!("Center on {} shut down", address);

    Ok(())
}

async fn run_worker(
    bind_addr: SocketAddr,
    center: SocketAddr,
    ncores: usize,
) -> anyhow::Result<()> {
    tracing::info!("Starting worker on {} (center {})", bind_addr, center);

    // 1. Compute functions:
    let registry = FunctionRegistry::new();
    register_builtins(&registry);

    // 2. Worker service:
    let worker = Worker::new(bind_addr, center, ncores, registry).await?;
    let address = worker.address();
    worker.clone().start().await?;

    // 3. Spawn stats reporter:
    let stats_worker = worker.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            tracing::info!("Store stats: {} value(s) held", stats_worker.store.len());
        }
    });

    // 4. Run until Ctrl+C:
    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal(worker.shutdown_token()).await;
    tracing::info!("Worker on {} shut down", address);

    Ok(())
}

/// Stock compute functions every node ships with. Deployments register
/// their own through [`FunctionRegistry::register`].
fn register_builtins(registry: &FunctionRegistry) {
    registry.register("add", |args, _kwargs| {
        let mut total = 0.0;
        for value in args {
            total += value
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("Not a number: {}", value))?;
        }
        Ok(json!(total))
    });

    registry.register("concat", |args, _kwargs| {
        let mut joined = String::new();
        for value in args {
            match value {
                Value::String(s) => joined.push_str(s),
                other => joined.push_str(&other.to_string()),
            }
        }
        Ok(json!(joined))
    });

    registry.register("echo", |args, _kwargs| Ok(Value::Array(args.to_vec())));

    registry.register("sleep-ms", |args, _kwargs| {
        let millis = args.first().and_then(Value::as_u64).unwrap_or(0);
        std::thread::sleep(Duration::from_millis(millis));
        Ok(json!(millis))
    });
}

async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}
