//! HTTP access to the chain list endpoint and remote overlay images.

use glint_core::catalog::{self, CatalogError};
use glint_core::loader::{self, LoadError};
use glint_core::{Catalog, JewelryItem, JewelryKind};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Fetches catalogs and images over HTTP; loads local images off the runtime threads.
#[derive(Clone)]
pub struct OverlaySource {
    client: reqwest::Client,
    api_base_url: Option<String>,
}

impl OverlaySource {
    pub fn new(api_base_url: Option<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base_url,
        })
    }

    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref()
    }

    /// GET `<base>/api/chains`. Returns an empty list when no endpoint is configured.
    pub async fn fetch_chain_list(&self) -> Result<Vec<JewelryItem>, RemoteError> {
        let Some(base) = &self.api_base_url else {
            return Ok(Vec::new());
        };
        let url = chains_endpoint(base);
        tracing::debug!(%url, "fetching chain list");

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let items = catalog::parse_list(&body)?
            .into_iter()
            .map(|item| JewelryItem {
                image: resolve_image(base, &item.image),
                ..item
            })
            .collect::<Vec<_>>();

        tracing::info!(%url, count = items.len(), "fetched chain list");
        Ok(items)
    }

    /// Load the overlay image for `item` from disk, an inline data URI, or HTTP.
    pub async fn load(&self, item: &JewelryItem) -> Result<RgbaImage, RemoteError> {
        if item.is_inline() {
            let uri = item.image.clone();
            let image = tokio::task::spawn_blocking(move || loader::decode_data_uri(&uri)).await??;
            Ok(image)
        } else if item.is_remote() {
            let bytes = self
                .client
                .get(&item.image)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            let name = item.image.clone();
            let image =
                tokio::task::spawn_blocking(move || loader::decode_overlay(&bytes, &name)).await??;
            Ok(image)
        } else {
            let path = PathBuf::from(&item.image);
            let image = tokio::task::spawn_blocking(move || loader::load_overlay(&path)).await??;
            Ok(image)
        }
    }
}

/// Build the catalog from `asset_dir`, then append the remote chain list.
/// A failing remote endpoint only costs the remote entries.
pub async fn load_catalog(asset_dir: &Path, source: &OverlaySource) -> Result<Catalog, RemoteError> {
    let dir = asset_dir.to_path_buf();
    let mut catalog = tokio::task::spawn_blocking(move || Catalog::discover(&dir)).await??;

    match source.fetch_chain_list().await {
        Ok(remote) => catalog.extend(JewelryKind::Chain, remote),
        Err(e) => tracing::warn!(
            url = source.api_base_url().unwrap_or_default(),
            error = %e,
            "failed to fetch remote chain list"
        ),
    }
    Ok(catalog)
}

fn chains_endpoint(base: &str) -> String {
    format!("{}/api/chains", base.trim_end_matches('/'))
}

/// Server-relative image paths (`/chains/a.png`) are resolved against the API base.
fn resolve_image(base: &str, image: &str) -> String {
    if image.starts_with('/') {
        format!("{}{image}", base.trim_end_matches('/'))
    } else {
        image.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_endpoint() {
        assert_eq!(chains_endpoint("https://shop.example"), "https://shop.example/api/chains");
        assert_eq!(chains_endpoint("https://shop.example/"), "https://shop.example/api/chains");
    }

    #[test]
    fn test_resolve_image() {
        assert_eq!(
            resolve_image("https://shop.example", "/chains/rope.png"),
            "https://shop.example/chains/rope.png"
        );
        assert_eq!(
            resolve_image("https://shop.example", "https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
    }

    #[tokio::test]
    async fn test_no_endpoint_means_empty_list() {
        let source = OverlaySource::new(None).unwrap();
        assert!(source.fetch_chain_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_inline_image() {
        let source = OverlaySource::new(None).unwrap();
        // 1x1 gold PNG
        let item = JewelryItem::new(
            "Inline",
            "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR4nGO4st78PwAGzwK6Gi/KKwAAAABJRU5ErkJggg==",
        );
        let img = source.load(&item).await.unwrap();
        assert_eq!(img.dimensions(), (1, 1));
    }

    #[tokio::test]
    async fn test_load_catalog_without_remote() {
        let dir = std::env::temp_dir().join(format!("glint-remote-catalog-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("chains")).unwrap();
        std::fs::write(dir.join("chains/rope.png"), b"").unwrap();

        let source = OverlaySource::new(None).unwrap();
        let catalog = load_catalog(&dir, &source).await.unwrap();
        assert_eq!(catalog.items(JewelryKind::Chain).len(), 1);
        assert!(catalog.items(JewelryKind::Earring).is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_local_file() {
        let source = OverlaySource::new(None).unwrap();
        let item = JewelryItem::new("Ghost", "/nonexistent/glint/ghost.png");
        let err = source.load(&item).await.unwrap_err();
        assert!(matches!(err, RemoteError::Load(LoadError::NotFound(_))));
    }
}
