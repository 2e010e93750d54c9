use std::env;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tello_pilot::{http, NullDetector, PipeSource, Session, TelloConfig};

// cargo run --bin pilot -- [config.json]
// RUST_LOG=tello_pilot=debug for per-activity detail

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => TelloConfig::load(&path)?,
        None => TelloConfig::default(),
    };

    let source = PipeSource::spawn(&config.video, config.read_timeout())?;
    // subject detection is plugged in by the embedding application
    let session = match Session::launch(config, Box::new(source), Arc::new(NullDetector)).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Drone is not connected: {e}");
            return Err(e.into());
        }
    };

    let bind = session.config().http_bind;
    info!("control surface on http://{bind}");
    let served = http::serve(session.clone(), bind).await;

    session.shutdown().await;
    served?;
    Ok(())
}
