//! Mutable try-on session: catalog selection and adjustments, plus the
//! JSON views the D-Bus interface returns.

use crate::engine::EngineStats;
use glint_core::{Adjustments, Catalog, JewelryKind};
use serde_json::{json, Value};

pub struct Session {
    pub catalog: Catalog,
    pub adjustments: Adjustments,
    /// Catalog (re)load in progress.
    pub loading: bool,
}

impl Session {
    pub fn new(catalog: Catalog, adjustments: Adjustments) -> Self {
        Self {
            catalog,
            adjustments,
            loading: false,
        }
    }

    /// One-line human status, as shown on the status bar: the current item
    /// once the camera runs and a chain is selected, otherwise the load or
    /// camera state.
    pub fn status_line(&self, stats: &EngineStats) -> String {
        if stats.capture_stopped {
            return "Camera stopped".to_string();
        }
        match self.catalog.current(JewelryKind::Chain) {
            Some(chain) if stats.camera_ready => {
                if self.adjustments.show_earrings {
                    self.catalog
                        .current(JewelryKind::Earring)
                        .map(|item| item.name.clone())
                        .unwrap_or_else(|| "No Earring".to_string())
                } else {
                    chain.name.clone()
                }
            }
            _ if self.loading => "Loading...".to_string(),
            _ => "Initializing camera...".to_string(),
        }
    }

    pub fn catalog_summary(&self) -> String {
        format!(
            "Loaded {} chains and {} earrings",
            self.catalog.items(JewelryKind::Chain).len(),
            self.catalog.items(JewelryKind::Earring).len()
        )
    }

    pub fn items_json(&self, kind: JewelryKind) -> Value {
        let current = self.catalog.selection(kind).index();
        Value::Array(
            self.catalog
                .items(kind)
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    json!({
                        "index": i,
                        "name": item.name,
                        "image": item.image,
                        "current": current == Some(i),
                    })
                })
                .collect(),
        )
    }

    pub fn status_json(&self, stats: &EngineStats, started_at: chrono::DateTime<chrono::Utc>) -> Value {
        let current = |kind| self.catalog.current(kind).map(|item| item.name.clone());
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": started_at.to_rfc3339(),
            "status": self.status_line(stats),
            "camera": {
                "ready": stats.camera_ready,
                "stopped": stats.capture_stopped,
                "width": stats.width,
                "height": stats.height,
            },
            "frames": {
                "rendered": stats.frames_rendered,
                "admitted": stats.frames_admitted,
                "dropped": stats.frames_dropped,
            },
            "face_detected": stats.face_detected,
            "overlays": {
                "chain": stats.chain_overlay,
                "earring": stats.earring_overlay,
            },
            "chain": current(JewelryKind::Chain),
            "earring": current(JewelryKind::Earring),
            "chains": self.catalog.items(JewelryKind::Chain).len(),
            "earrings": self.catalog.items(JewelryKind::Earring).len(),
            "adjustments": self.adjustments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_core::JewelryItem;

    fn session() -> Session {
        Session::new(
            Catalog::new(
                vec![JewelryItem::new("Rope", "rope.png"), JewelryItem::new("Box", "box.png")],
                vec![JewelryItem::new("Hoop", "hoop.png")],
            ),
            Adjustments::default(),
        )
    }

    fn running() -> EngineStats {
        EngineStats {
            camera_ready: true,
            ..EngineStats::default()
        }
    }

    #[test]
    fn test_status_line_states() {
        let mut s = session();
        assert_eq!(s.status_line(&EngineStats::default()), "Initializing camera...");
        assert_eq!(s.status_line(&running()), "Rope");

        s.adjustments.show_earrings = true;
        assert_eq!(s.status_line(&running()), "Hoop");

        s.catalog.replace(JewelryKind::Earring, vec![]);
        assert_eq!(s.status_line(&running()), "No Earring");

        // A running camera and a selected chain win over the loading flag
        s.loading = true;
        assert_eq!(s.status_line(&running()), "No Earring");
        assert_eq!(s.status_line(&EngineStats::default()), "Loading...");
    }

    #[test]
    fn test_status_line_without_chain() {
        let mut s = session();
        s.catalog.replace(JewelryKind::Chain, vec![]);
        assert_eq!(s.status_line(&running()), "Initializing camera...");
        s.loading = true;
        assert_eq!(s.status_line(&running()), "Loading...");
    }

    #[test]
    fn test_status_line_capture_stopped() {
        let s = session();
        let stats = EngineStats {
            capture_stopped: true,
            ..running()
        };
        assert_eq!(s.status_line(&stats), "Camera stopped");
    }

    #[test]
    fn test_items_json_marks_current() {
        let mut s = session();
        s.catalog.next(JewelryKind::Chain).unwrap();
        let items = s.items_json(JewelryKind::Chain);
        assert_eq!(items[0]["current"], false);
        assert_eq!(items[1]["current"], true);
        assert_eq!(items[1]["name"], "Box");
    }

    #[test]
    fn test_status_json() {
        let s = session();
        let stats = EngineStats {
            camera_ready: true,
            frames_rendered: 12,
            frames_admitted: 12,
            frames_dropped: 3,
            face_detected: true,
            width: 1280,
            height: 720,
            chain_overlay: Some((300, 150)),
            ..EngineStats::default()
        };
        let v = s.status_json(&stats, chrono::Utc::now());
        assert_eq!(v["status"], "Rope");
        assert_eq!(v["frames"]["dropped"], 3);
        assert_eq!(v["camera"]["stopped"], false);
        assert_eq!(v["overlays"]["chain"], serde_json::json!([300, 150]));
        assert!(v["overlays"]["earring"].is_null());
        assert_eq!(v["chain"], "Rope");
        assert_eq!(v["earrings"], 1);
        assert_eq!(v["adjustments"]["show_earrings"], false);
        assert_eq!(s.catalog_summary(), "Loaded 2 chains and 1 earrings");
    }
}
