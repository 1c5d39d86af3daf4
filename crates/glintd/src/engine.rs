use glint_core::{Adjustments, FrameGate, GatePermit, JewelryKind, LandmarkProvider, Renderer};
use glint_hw::{Camera, Frame};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Consecutive capture failures tolerated before the capture thread gives up.
const MAX_CAPTURE_FAILURES: u32 = 30;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] glint_hw::CameraError),
    #[error("no frame has been rendered yet")]
    NoFrame,
    #[error("failed to write screenshot {path}: {source}")]
    Screenshot {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to create screenshot directory {path}: {source}")]
    ScreenshotDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Counters reported by the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// A frame has been rendered since startup.
    pub camera_ready: bool,
    pub frames_rendered: u64,
    /// Frames admitted by the reentrancy gate.
    pub frames_admitted: u64,
    /// Frames refused by the reentrancy gate.
    pub frames_dropped: u64,
    /// The capture thread has exited; no further frames will arrive.
    pub capture_stopped: bool,
    /// The most recent frame had a face.
    pub face_detected: bool,
    pub width: u32,
    pub height: u32,
    /// Size of the overlay the renderer is drawing, per kind.
    pub chain_overlay: Option<(u32, u32)>,
    pub earring_overlay: Option<(u32, u32)>,
    /// Adjustments the renderer is drawing with.
    pub adjustments: Adjustments,
}

/// Control requests sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    SetOverlay {
        kind: JewelryKind,
        image: Option<RgbaImage>,
        reply: oneshot::Sender<()>,
    },
    SetAdjustments {
        adjustments: Adjustments,
        reply: oneshot::Sender<()>,
    },
    Screenshot {
        dir: PathBuf,
        reply: oneshot::Sender<Result<PathBuf, EngineError>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Everything the engine thread consumes: control requests and admitted frames.
enum EngineMessage {
    Request(EngineRequest),
    /// A frame plus the gate permit that admitted it.
    Frame(Frame, GatePermit),
    /// Sent once by the capture thread when it gives up.
    CaptureStopped,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMessage>,
    gate: FrameGate,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineMessage::Request(build(reply_tx)))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Replace the overlay image drawn for `kind` (`None` clears it).
    pub async fn set_overlay(
        &self,
        kind: JewelryKind,
        image: Option<RgbaImage>,
    ) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::SetOverlay { kind, image, reply })
            .await
    }

    pub async fn set_adjustments(&self, adjustments: Adjustments) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::SetAdjustments { adjustments, reply })
            .await
    }

    /// Write the most recent composited frame as a PNG into `dir`.
    pub async fn screenshot(&self, dir: PathBuf) -> Result<PathBuf, EngineError> {
        self.request(|reply| EngineRequest::Screenshot { dir, reply })
            .await?
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineError> {
        let mut stats = self.request(|reply| EngineRequest::Stats { reply }).await?;
        stats.frames_admitted = self.gate.accepted();
        stats.frames_dropped = self.gate.dropped();
        Ok(stats)
    }
}

/// Spawn the engine and capture threads.
///
/// Opens the camera and waits until the capture thread has a running
/// stream, so both an unusable device and a failing stream surface here.
/// The capture thread discards warmup frames and offers every following
/// frame to the engine through the reentrancy gate. The engine thread runs
/// landmark detection and rendering, and serves control requests between
/// frames.
pub async fn spawn_engine(
    camera_device: &str,
    capture_width: u32,
    capture_height: u32,
    warmup_frames: usize,
    provider: Box<dyn LandmarkProvider>,
    adjustments: Adjustments,
) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(camera_device, capture_width, capture_height)?;
    tracing::info!(
        device = camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let (tx, rx) = mpsc::channel::<EngineMessage>(8);
    let gate = FrameGate::new();

    std::thread::Builder::new()
        .name("glint-engine".into())
        .spawn(move || run_engine(rx, provider, Renderer::new(adjustments)))
        .map_err(|source| EngineError::Spawn { name: "engine", source })?;

    let (ready_tx, ready_rx) = oneshot::channel();
    let capture_tx = tx.clone();
    let capture_gate = gate.clone();
    std::thread::Builder::new()
        .name("glint-capture".into())
        .spawn(move || run_capture(camera, warmup_frames, capture_gate, capture_tx, ready_tx))
        .map_err(|source| EngineError::Spawn { name: "capture", source })?;

    ready_rx.await.map_err(|_| {
        glint_hw::CameraError::CaptureFailed("capture thread exited before streaming".into())
    })??;

    Ok(EngineHandle { tx, gate })
}

/// Capture thread body: start the stream, report the outcome on `ready`,
/// then feed frames until capture fails for good.
fn run_capture(
    camera: Camera,
    warmup_frames: usize,
    gate: FrameGate,
    tx: mpsc::Sender<EngineMessage>,
    ready: oneshot::Sender<Result<(), glint_hw::CameraError>>,
) {
    let mut stream = match camera.stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "failed to start capture stream");
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    capture_loop(|| stream.next_frame(), warmup_frames, &gate, &tx);
}

/// One frame in flight at most, everything else dropped. Tells the engine
/// when capture stops.
fn capture_loop(
    mut next_frame: impl FnMut() -> Result<Frame, glint_hw::CameraError>,
    warmup_frames: usize,
    gate: &FrameGate,
    tx: &mpsc::Sender<EngineMessage>,
) {
    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        for _ in 0..warmup_frames {
            let _ = next_frame();
        }
    }

    tracing::info!("capture thread started");
    let mut failures = 0u32;
    loop {
        let frame = match next_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "frame capture failed");
                if failures >= MAX_CAPTURE_FAILURES {
                    tracing::error!("too many consecutive capture failures; stopping capture");
                    break;
                }
                continue;
            }
        };

        let Some(permit) = gate.try_acquire() else {
            tracing::trace!(seq = frame.sequence, "engine busy; frame dropped");
            continue;
        };

        if tx.blocking_send(EngineMessage::Frame(frame, permit)).is_err() {
            break;
        }
    }
    let _ = tx.blocking_send(EngineMessage::CaptureStopped);
    tracing::info!("capture thread exiting");
}

/// Engine loop state that outlives a single message.
struct EngineState {
    provider: Box<dyn LandmarkProvider>,
    renderer: Renderer,
    latest: Option<RgbaImage>,
    stats: EngineStats,
}

fn run_engine(
    mut rx: mpsc::Receiver<EngineMessage>,
    provider: Box<dyn LandmarkProvider>,
    renderer: Renderer,
) {
    tracing::info!("engine thread started");
    let mut state = EngineState {
        provider,
        renderer,
        latest: None,
        stats: EngineStats::default(),
    };

    while let Some(msg) = rx.blocking_recv() {
        match msg {
            EngineMessage::Frame(frame, permit) => {
                state.process_frame(frame);
                drop(permit);
            }
            EngineMessage::Request(req) => state.handle_request(req),
            EngineMessage::CaptureStopped => {
                tracing::error!("camera capture stopped");
                state.stats.capture_stopped = true;
            }
        }
    }
    tracing::info!("engine thread exiting");
}

impl EngineState {
    fn process_frame(&mut self, frame: Frame) {
        let sequence = frame.sequence;
        let captured_at = frame.timestamp;
        let image = match frame.into_rgb_image() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(seq = sequence, error = %e, "malformed frame skipped");
                return;
            }
        };

        let landmarks = match self.provider.detect(&image) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                tracing::warn!(seq = sequence, error = %e, "landmark detection failed");
                None
            }
        };

        let rendered = self.renderer.render(&image, landmarks.as_ref());

        if !self.stats.camera_ready {
            tracing::info!(width = image.width(), height = image.height(), "first frame rendered");
        }
        self.stats.camera_ready = true;
        self.stats.frames_rendered += 1;
        self.stats.face_detected = landmarks.is_some();
        self.stats.width = image.width();
        self.stats.height = image.height();
        self.latest = Some(rendered);
        tracing::trace!(
            seq = sequence,
            face = self.stats.face_detected,
            latency_ms = captured_at.elapsed().as_millis() as u64,
            "frame rendered"
        );
    }

    fn handle_request(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::SetOverlay { kind, image, reply } => {
                self.renderer.set_overlay(kind, image);
                tracing::debug!(%kind, size = ?self.renderer.overlay_size(kind), "overlay replaced");
                let _ = reply.send(());
            }
            EngineRequest::SetAdjustments { adjustments, reply } => {
                tracing::debug!(?adjustments, "adjustments updated");
                self.renderer.set_adjustments(adjustments);
                let _ = reply.send(());
            }
            EngineRequest::Screenshot { dir, reply } => {
                // The composited frame, jewelry included, not the raw camera frame.
                let result = match &self.latest {
                    Some(frame) => save_screenshot(frame, &dir),
                    None => Err(EngineError::NoFrame),
                };
                let _ = reply.send(result);
            }
            EngineRequest::Stats { reply } => {
                let stats = EngineStats {
                    chain_overlay: self.renderer.overlay_size(JewelryKind::Chain),
                    earring_overlay: self.renderer.overlay_size(JewelryKind::Earring),
                    adjustments: *self.renderer.adjustments(),
                    ..self.stats
                };
                let _ = reply.send(stats);
            }
        }
    }
}

/// Screenshot file name for a given instant: `chain-fit-<unix millis>.png`.
pub fn screenshot_name(at: chrono::DateTime<chrono::Utc>) -> String {
    format!("chain-fit-{}.png", at.timestamp_millis())
}

fn save_screenshot(frame: &RgbaImage, dir: &Path) -> Result<PathBuf, EngineError> {
    std::fs::create_dir_all(dir).map_err(|source| EngineError::ScreenshotDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(screenshot_name(chrono::Utc::now()));
    frame
        .save_with_format(&path, image::ImageFormat::Png)
        .map_err(|source| EngineError::Screenshot {
            path: path.clone(),
            source,
        })?;
    tracing::info!(path = %path.display(), "screenshot saved");
    Ok(path)
}
