//! Doorwarden - Unattended Door Access Controller
//!
//! Main entry point.

use doorwarden::{
    access_log::AccessLogService,
    actuator::{ActuatorController, ActuatorSettings, LatchHardware, SimulatedLatch, SysfsLatch},
    alert::AlertThrottle,
    authorization::AuthorizationPolicy,
    credential_store::CredentialStore,
    frame_source,
    matcher::CredentialMatcher,
    notifier::{LogTransport, OperatorNotifier},
    pipeline::FramePipeline,
    recognition::{FaceEngine, FaceGallery, NullFaceEngine},
    state::{AppConfig, AppState},
    stream_hub::FrameHub,
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doorwarden=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Doorwarden v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        video_source = %config.video_source,
        gallery_path = %config.gallery_path.display(),
        hardware_backend = %config.hardware_backend,
        face_match_threshold = config.face_match_threshold,
        "Configuration loaded"
    );

    // Load the face gallery (missing file is the documented cold start)
    let gallery = FaceGallery::load(&config.gallery_path)?;
    let gallery_size = gallery.len();

    // Operator channel dispatch
    let notifier = OperatorNotifier::start(Arc::new(LogTransport));
    tracing::info!("OperatorNotifier started");

    // Stores
    let credentials = Arc::new(CredentialStore::new());
    let access_log = Arc::new(AccessLogService::default());

    // Latch hardware
    let hardware: Arc<dyn LatchHardware> = match config.hardware_backend.as_str() {
        "sysfs" => Arc::new(SysfsLatch::new(
            config.relay_gpio,
            config.pwm_chip,
            config.pwm_channel,
        )?),
        other => {
            if other != "simulated" {
                tracing::warn!(backend = %other, "Unknown hardware backend, using simulated");
            }
            Arc::new(SimulatedLatch)
        }
    };

    // Door cycle worker
    let actuator = ActuatorController::start(
        hardware,
        ActuatorSettings::from_config(&config),
        access_log.clone(),
        notifier.clone(),
    );
    tracing::info!("ActuatorController started");

    // Recognition capability: the engine implementation is injected; the
    // QR and remote paths carry the system without one
    let engine: Arc<dyn FaceEngine> = Arc::new(NullFaceEngine);

    let matcher = CredentialMatcher::new(engine, gallery, config.face_match_threshold);
    let policy = AuthorizationPolicy::new(credentials.clone(), actuator.door());
    let throttle = AlertThrottle::new(config.alert_interval);
    let frames = Arc::new(FrameHub::new());

    // Camera
    let source = frame_source::open_source(&config.video_source, config.frame_rate)?;

    // Frame loop
    let pipeline = FramePipeline::new(
        matcher,
        policy,
        throttle,
        actuator.clone(),
        notifier.clone(),
        frames.clone(),
    );
    pipeline.start(source);
    tracing::info!("Frame pipeline started");

    // Create application state
    let state = AppState {
        config,
        credentials,
        access_log,
        actuator,
        frames,
        gallery_size,
    };

    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
