use anyhow::{Context, Result};
use glint_core::{FaceMesh, MeshOptions};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod remote;
mod session;

const BUS_NAME: &str = "org.glint.TryOn1";
const OBJECT_PATH: &str = "/org/glint/TryOn1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "glintd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        camera = %config.camera_device,
        model = %config.mesh_model_path(),
        assets = %config.asset_dir.display(),
        api = config.api_base_url.as_deref().unwrap_or("none"),
        "configuration loaded"
    );

    let source = remote::OverlaySource::new(config.api_base_url.clone())
        .context("failed to build HTTP client")?;
    let catalog = remote::load_catalog(&config.asset_dir, &source)
        .await
        .context("failed to load jewelry catalog")?;

    let mesh = FaceMesh::load(
        &config.mesh_model_path(),
        MeshOptions {
            min_detection_confidence: config.min_detection_confidence,
            min_tracking_confidence: config.min_tracking_confidence,
        },
    )
    .context("failed to load face mesh model")?;

    let engine = engine::spawn_engine(
        &config.camera_device,
        config.capture_width,
        config.capture_height,
        config.warmup_frames,
        Box::new(mesh),
        config.adjustments,
    )
    .await
    .context("failed to start camera engine")?;

    let session = session::Session::new(catalog, config.adjustments);
    tracing::info!(summary = %session.catalog_summary(), "catalog ready");

    let service = dbus_interface::TryOnService::new(
        session,
        engine,
        source,
        config.asset_dir.clone(),
        config.screenshot_dir.clone(),
    );
    service
        .apply_current()
        .await
        .context("failed to apply initial overlays")?;

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register D-Bus service")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "glintd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("glintd shutting down");

    Ok(())
}
