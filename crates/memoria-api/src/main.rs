//! Memoria CLI and REST API entry point.
//!
//! Binary name: `memoria`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    memoria_observe::tracing_setup::init_tracing_with_level(cli.otel, cli.log_level())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;

    let result = run(cli, state).await;
    memoria_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, host } => serve(state, &host, port).await?,

        Commands::Extract {
            user,
            from,
            to,
            force_all,
            wait,
        } => {
            cli::extract::extract(
                &state,
                &user,
                from.as_deref(),
                to.as_deref(),
                force_all,
                wait,
                cli.json,
            )
            .await?;
        }

        Commands::Task { id } => cli::extract::show_task(&state, &id, cli.json).await?,
    }

    Ok(())
}

async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    state.resume_interrupted().await?;

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Memoria API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {}",
        console::style(format!("Data: {}", state.data_dir.display())).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let runtime = state.runtime.clone();
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight dispatches are suspended, not failed; the next start resumes them.
    runtime.shutdown();
    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
