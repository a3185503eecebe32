use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use volley::cli::{Cli, CollectArgs, Commands, LogArgs, RunArgs};
use volley::config::load_plan;
use volley::distributed::{CollectorOptions, Sender};
use volley::engine::{Listener, execute};
use volley::output::print_summary;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = match cli.command {
        Commands::Run(args) => run_plan(&args, cancel).await,
        Commands::Collect(args) => run_collector(&args, cancel).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log: LogArgs) {
    let level = if log.debug {
        tracing::Level::DEBUG
    } else if log.silent {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::warn!("shutdown requested");
    cancel.cancel();
}

async fn run_plan(
    args: &RunArgs,
    cancel: CancellationToken,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let plan = load_plan(&args.plan)?;

    let sender = match &args.collector {
        Some(address) => Some(Arc::new(Sender::connect(address, args.group.clone()).await?)),
        None => None,
    };

    // Stopped only after every scenario finished, so the last batch is flushed.
    let sender_stop = CancellationToken::new();
    let sender_task = sender.clone().map(|sender| {
        let stop = sender_stop.clone();
        tokio::spawn(async move { sender.run(stop).await })
    });

    let extra: Vec<Arc<dyn Listener>> = sender
        .iter()
        .map(|s| s.clone() as Arc<dyn Listener>)
        .collect();

    let stats = execute(&plan, &extra, &cancel).await;

    sender_stop.cancel();
    if let Some(task) = sender_task {
        if let Err(e) = task.await {
            tracing::error!("sender task failed: {}", e);
        }
    }

    if !args.skip_results {
        print_summary(&plan, &stats)?;
    }

    if stats.all_passed() || args.skip_exit_code {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_collector(
    args: &CollectArgs,
    cancel: CancellationToken,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let options = CollectorOptions {
        grpc_addr: SocketAddr::new(args.bind, args.port),
        metrics_addr: SocketAddr::new(args.bind, args.metrics_port),
        prefix: args.prefix.clone(),
    };

    volley::distributed::serve(options, cancel).await?;
    Ok(ExitCode::SUCCESS)
}
