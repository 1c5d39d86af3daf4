//! Overlay bitmap loading.
//!
//! Jewelry images are normally transparent PNGs; anything the `image`
//! crate can decode is accepted and converted to RGBA.

use base64::Engine;
use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("overlay image not found: {0}")]
    NotFound(String),
    #[error("failed to decode overlay image {source_name}: {source}")]
    Decode {
        source_name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("overlay image {0} has zero size")]
    Empty(String),
    #[error("malformed data URI: {0}")]
    DataUri(String),
}

fn non_empty(image: RgbaImage, source_name: &str) -> Result<RgbaImage, LoadError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(LoadError::Empty(source_name.to_string()));
    }
    Ok(image)
}

/// Load and decode an overlay image from a local file.
pub fn load_overlay(path: &Path) -> Result<RgbaImage, LoadError> {
    let name = path.display().to_string();
    if !path.is_file() {
        return Err(LoadError::NotFound(name));
    }

    let image = image::open(path)
        .map_err(|source| LoadError::Decode {
            source_name: name.clone(),
            source,
        })?
        .into_rgba8();

    tracing::debug!(path = %name, width = image.width(), height = image.height(), "overlay loaded");
    non_empty(image, &name)
}

/// Decode an overlay image from an in-memory buffer (e.g. an HTTP body).
pub fn decode_overlay(bytes: &[u8], source_name: &str) -> Result<RgbaImage, LoadError> {
    let image = image::load_from_memory(bytes)
        .map_err(|source| LoadError::Decode {
            source_name: source_name.to_string(),
            source,
        })?
        .into_rgba8();
    non_empty(image, source_name)
}

/// Decode an inline `data:image/...;base64,<payload>` overlay.
pub fn decode_data_uri(uri: &str) -> Result<RgbaImage, LoadError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| LoadError::DataUri("missing data: scheme".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::DataUri("missing ',' before payload".into()))?;
    if !meta.ends_with(";base64") {
        return Err(LoadError::DataUri(format!("unsupported encoding in {meta:?}")));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| LoadError::DataUri(e.to_string()))?;
    let media_type = meta.trim_end_matches(";base64");
    decode_overlay(&bytes, &format!("data:{media_type}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_load_png_roundtrip() {
        let path = std::env::temp_dir().join(format!("glint-loader-{}.png", std::process::id()));
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 128]));
        img.save(&path).unwrap();

        let loaded = load_overlay(&path).unwrap();
        assert_eq!(loaded.dimensions(), (3, 2));
        assert_eq!(*loaded.get_pixel(1, 1), Rgba([10, 20, 30, 128]));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = load_overlay(Path::new("/nonexistent/glint/chain.png")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn test_decode_data_uri() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(4, 2, Rgba([200, 170, 50, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );

        let img = decode_data_uri(&uri).unwrap();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(*img.get_pixel(3, 1), Rgba([200, 170, 50, 255]));
    }

    #[test]
    fn test_decode_data_uri_malformed() {
        assert!(matches!(decode_data_uri("data:image/png,plain"), Err(LoadError::DataUri(_))));
        assert!(matches!(decode_data_uri("data:image/png;base64"), Err(LoadError::DataUri(_))));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(LoadError::DataUri(_))
        ));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_overlay(b"definitely not an image", "remote").unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }
}
