//! glint-core — Jewelry try-on engine.
//!
//! Tracks face-mesh landmarks via ONNX Runtime, places chain and earring
//! overlays relative to the jaw, chin and ears, and composites them onto
//! camera frames.

pub mod adjust;
pub mod catalog;
pub mod compositor;
pub mod gate;
pub mod loader;
pub mod mesh;
pub mod placement;
pub mod renderer;
pub mod types;

pub use adjust::Adjustments;
pub use catalog::{Catalog, CatalogError, Selection};
pub use gate::{FrameGate, GatePermit};
pub use loader::{decode_data_uri, decode_overlay, load_overlay, LoadError};
pub use mesh::{FaceMesh, LandmarkProvider, MeshError, MeshOptions, StaticLandmarks};
pub use renderer::Renderer;
pub use types::{FaceLandmarks, JewelryItem, JewelryKind, LandmarkError, NormalizedLandmark, Point};

