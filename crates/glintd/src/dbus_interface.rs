use crate::engine::{EngineError, EngineHandle};
use crate::remote::{self, OverlaySource, RemoteError};
use crate::session::Session;
use glint_core::adjust::AdjustError;
use glint_core::{Adjustments, CatalogError, JewelryItem, JewelryKind};
use std::path::PathBuf;
use tokio::sync::Mutex;
use zbus::interface;

/// D-Bus interface for the Glint try-on daemon.
///
/// Bus name: org.glint.TryOn1
/// Object path: /org/glint/TryOn1
pub struct TryOnService {
    session: Mutex<Session>,
    engine: EngineHandle,
    source: OverlaySource,
    asset_dir: PathBuf,
    screenshot_dir: PathBuf,
    started_at: chrono::DateTime<chrono::Utc>,
    /// Held from selection change until the engine has the new overlay, so
    /// the engine always ends up drawing the session's current item.
    overlay_lock: Mutex<()>,
}

#[interface(name = "org.glint.TryOn1")]
impl TryOnService {
    /// Return daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let stats = self.engine.stats().await.map_err(engine_err)?;
        let session = self.session.lock().await;
        Ok(session.status_json(&stats, self.started_at).to_string())
    }

    /// List catalog items of `kind` ("chain" or "earring") as JSON.
    async fn list_items(&self, kind: &str) -> zbus::fdo::Result<String> {
        let kind = parse_kind(kind)?;
        let session = self.session.lock().await;
        Ok(session.items_json(kind).to_string())
    }

    /// Select item `index` of `kind`; returns its name.
    async fn select(&self, kind: &str, index: u32) -> zbus::fdo::Result<String> {
        let kind = parse_kind(kind)?;
        tracing::info!(%kind, index, "select requested");
        let _overlay = self.overlay_lock.lock().await;
        let item = {
            let mut session = self.session.lock().await;
            session
                .catalog
                .select(kind, index as usize)
                .cloned()
                .map_err(catalog_err)?
        };
        self.apply_item(kind, item).await
    }

    /// Advance to the next item of `kind`, wrapping; returns its name.
    async fn next(&self, kind: &str) -> zbus::fdo::Result<String> {
        let kind = parse_kind(kind)?;
        let _overlay = self.overlay_lock.lock().await;
        let item = {
            let mut session = self.session.lock().await;
            session.catalog.next(kind).cloned().map_err(catalog_err)?
        };
        self.apply_item(kind, item).await
    }

    /// Step back to the previous item of `kind`, wrapping; returns its name.
    async fn previous(&self, kind: &str) -> zbus::fdo::Result<String> {
        let kind = parse_kind(kind)?;
        let _overlay = self.overlay_lock.lock().await;
        let item = {
            let mut session = self.session.lock().await;
            session.catalog.previous(kind).cloned().map_err(catalog_err)?
        };
        self.apply_item(kind, item).await
    }

    /// Set the chain scale; returns the clamped value in effect.
    async fn set_chain_scale(&self, value: f64) -> zbus::fdo::Result<f64> {
        self.adjust(|a| a.set_chain_scale(value as f32)).await
    }

    /// Set the chain vertical offset; returns the clamped value in effect.
    async fn set_vertical_offset(&self, value: f64) -> zbus::fdo::Result<f64> {
        self.adjust(|a| a.set_vertical_offset(value as f32)).await
    }

    /// Set the earring scale; returns the clamped value in effect.
    async fn set_earring_scale(&self, value: f64) -> zbus::fdo::Result<f64> {
        self.adjust(|a| a.set_earring_scale(value as f32)).await
    }

    /// Set earring horizontal, vertical and depth offsets.
    async fn set_earring_offsets(
        &self,
        horizontal: f64,
        vertical: f64,
        depth: f64,
    ) -> zbus::fdo::Result<()> {
        self.adjust(|a| {
            a.set_earring_offsets(horizontal as f32, vertical as f32, depth as f32)
                .map(|()| 0.0)
        })
        .await
        .map(|_| ())
    }

    /// Toggle earring rendering.
    async fn show_earrings(&self, show: bool) -> zbus::fdo::Result<()> {
        tracing::info!(show, "show_earrings requested");
        self.adjust(|a| {
            a.show_earrings = show;
            Ok(0.0)
        })
        .await
        .map(|_| ())
    }

    /// Save the current composited frame as a PNG; returns its path.
    async fn screenshot(&self) -> zbus::fdo::Result<String> {
        let path = self
            .engine
            .screenshot(self.screenshot_dir.clone())
            .await
            .map_err(engine_err)?;
        tracing::info!(path = %path.display(), "screenshot saved");
        Ok(path.to_string_lossy().into_owned())
    }

    /// Rescan the asset directory and refetch the remote chain list.
    async fn reload_catalog(&self) -> zbus::fdo::Result<String> {
        tracing::info!(dir = %self.asset_dir.display(), "reload_catalog requested");
        let _overlay = self.overlay_lock.lock().await;
        self.session.lock().await.loading = true;

        let result = remote::load_catalog(&self.asset_dir, &self.source).await;

        let summary = {
            let mut session = self.session.lock().await;
            session.loading = false;
            session.catalog = result.map_err(remote_err)?;
            session.catalog_summary()
        };

        self.push_current().await?;
        tracing::info!(%summary, "catalog reloaded");
        Ok(summary)
    }
}

impl TryOnService {
    pub fn new(
        session: Session,
        engine: EngineHandle,
        source: OverlaySource,
        asset_dir: PathBuf,
        screenshot_dir: PathBuf,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            engine,
            source,
            asset_dir,
            screenshot_dir,
            started_at: chrono::Utc::now(),
            overlay_lock: Mutex::new(()),
        }
    }

    /// Push the currently selected overlay of every kind to the engine.
    /// Failed loads are logged and leave that kind's previous overlay.
    pub async fn apply_current(&self) -> zbus::fdo::Result<()> {
        let _overlay = self.overlay_lock.lock().await;
        self.push_current().await
    }

    /// Caller holds `overlay_lock`.
    async fn push_current(&self) -> zbus::fdo::Result<()> {
        let current = {
            let session = self.session.lock().await;
            JewelryKind::ALL
                .iter()
                .map(|&kind| (kind, session.catalog.current(kind).cloned()))
                .collect::<Vec<_>>()
        };

        for (kind, item) in current {
            match item {
                Some(item) => {
                    if let Err(e) = self.apply_item(kind, item).await {
                        tracing::warn!(%kind, error = %e, "overlay not applied");
                    }
                }
                None => self.engine.set_overlay(kind, None).await.map_err(engine_err)?,
            }
        }
        Ok(())
    }

    /// Load `item`'s image and hand it to the engine. On failure the engine
    /// keeps drawing the previous overlay. Caller holds `overlay_lock`.
    async fn apply_item(&self, kind: JewelryKind, item: JewelryItem) -> zbus::fdo::Result<String> {
        let image = self.source.load(&item).await.map_err(|e| {
            tracing::warn!(%kind, name = %item.name, error = %e, "overlay load failed");
            zbus::fdo::Error::Failed(format!("failed to load {}: {e}", item.name))
        })?;
        self.engine
            .set_overlay(kind, Some(image))
            .await
            .map_err(engine_err)?;
        tracing::info!(%kind, name = %item.name, "overlay selected");
        Ok(item.name)
    }

    /// Apply `change` to the session adjustments and push the result to the
    /// engine. The session stays locked until the engine has acknowledged,
    /// so concurrent calls reach the engine in the order they changed the
    /// session.
    async fn adjust(
        &self,
        change: impl FnOnce(&mut Adjustments) -> Result<f32, AdjustError>,
    ) -> zbus::fdo::Result<f64> {
        let mut session = self.session.lock().await;
        let value = change(&mut session.adjustments)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        let adjustments = session.adjustments;
        self.engine
            .set_adjustments(adjustments)
            .await
            .map_err(engine_err)?;
        tracing::debug!(?adjustments, "adjustments updated");
        Ok(value as f64)
    }
}

fn parse_kind(kind: &str) -> zbus::fdo::Result<JewelryKind> {
    kind.parse().map_err(zbus::fdo::Error::InvalidArgs)
}

fn catalog_err(e: CatalogError) -> zbus::fdo::Error {
    match e {
        CatalogError::OutOfRange { .. } | CatalogError::Empty(_) => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        _ => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn remote_err(e: RemoteError) -> zbus::fdo::Error {
    match e {
        RemoteError::Catalog(e) => catalog_err(e),
        e => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn engine_err(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}
