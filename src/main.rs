use std::{process, sync::Arc};

use patchwork::{
    application::{classify::Classifier, error::AppError, render::RenderEngine},
    config,
    infra::{
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
    presentation::layouts::AppLayout,
};
use tokio::net::TcpListener;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Routes => {
            print_routes(&settings);
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    telemetry::init(&settings.logging)?;

    let engine = RenderEngine::spawn(settings.render.queue_capacity)?;
    let classifier = Classifier::new(Arc::new(AppLayout::new("patchwork")));
    let state = AppState::new(classifier, engine.handle(), settings.protocol.clone());
    let router = http::build_router(state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "patchwork::serve",
        addr = %settings.server.addr,
        error_route = %settings.protocol.error_route,
        antiforgery = settings.protocol.antiforgery,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InfraError::from)?;

    // Joining the worker blocks until queued jobs drain.
    tokio::task::spawn_blocking(move || engine.shutdown())
        .await
        .map_err(|err| AppError::unexpected(format!("render worker join failed: {err}")))??;

    info!(target = "patchwork::serve", "shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "patchwork::serve",
            error = %err,
            "failed to install ctrl-c handler"
        );
        std::future::pending::<()>().await;
    }
}

fn print_routes(settings: &config::Settings) {
    for entry in http::route_table(&settings.protocol) {
        println!(
            "{:<24} {:<9} layout={:<8} antiforgery={}",
            entry.path,
            entry.kind,
            entry.layout.unwrap_or("-"),
            entry.antiforgery
        );
    }
}
