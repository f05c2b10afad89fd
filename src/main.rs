use std::sync::Arc;

use tetsuoni_bot::api::{self, AppState};
use tetsuoni_bot::config::Config;
use tetsuoni_bot::delivery::imgbb::ImgbbHost;
use tetsuoni_bot::delivery::line::LineClient;
use tetsuoni_bot::delivery::retry::Backoff;
use tetsuoni_bot::delivery::{ConsoleMessenger, Messenger, ProfileDirectory};
use tetsuoni_bot::map::render::{MapRenderer, MarkerStyle};
use tetsuoni_bot::map::stations::StationRegistry;
use tetsuoni_bot::map::teams::TeamAssignments;
use tetsuoni_bot::metrics;
use tetsuoni_bot::policy::CompletionPolicy;
use tetsuoni_bot::tracker::ParticipantTracker;
use tetsuoni_bot::workflow::Workflow;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tetsuoni_bot=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    metrics::register_metrics();

    let registry = Arc::new(StationRegistry::load(&config.stations_file)?);
    tracing::info!(
        "Loaded {} station(s) from {}",
        registry.len(),
        config.stations_file.display()
    );

    let teams = match &config.teams_file {
        Some(path) => TeamAssignments::load(path)?,
        None => TeamAssignments::default(),
    };

    let style = MarkerStyle {
        radius: config.marker_radius,
        outline_width: config.marker_outline_width,
        ..MarkerStyle::default()
    };
    let renderer = MapRenderer::load(
        &config.map_image,
        Arc::clone(&registry),
        style,
        config.output_size,
    );

    let policy = CompletionPolicy::new(config.required_participants)?;
    let tracker = ParticipantTracker::new(registry, policy, config.allow_report_updates);

    let host = ImgbbHost::new(
        config.imgbb_api_key.clone(),
        Backoff::new(config.upload_max_attempts),
    )?;
    if config.imgbb_api_key.is_none() {
        tracing::warn!("IMGBB_API_KEY is not set; completed batches will be reported as text only");
    }

    let (messenger, directory): (Arc<dyn Messenger>, Arc<dyn ProfileDirectory>) =
        match (&config.channel_access_token, config.local_mode) {
            (Some(token), false) => {
                let client = Arc::new(LineClient::new(token.clone())?);
                (client.clone(), client)
            }
            _ => {
                tracing::info!("Local mode: signatures unchecked, replies logged");
                let console = Arc::new(ConsoleMessenger);
                (console.clone(), console)
            }
        };

    let workflow = Workflow::new(
        tracker,
        Arc::new(renderer),
        Arc::new(teams),
        Arc::new(host),
        directory,
    );

    let state = AppState {
        workflow: Arc::new(workflow),
        messenger,
        channel_secret: if config.local_mode {
            None
        } else {
            config.channel_secret.clone()
        },
    };

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(
        "Tetsuoni bot listening on port {} (quorum {})",
        config.port,
        config.required_participants
    );
    axum::serve(listener, app).await?;
    Ok(())
}
