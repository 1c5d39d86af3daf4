use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glint_core::{load_overlay, Adjustments, FaceLandmarks, JewelryKind, Renderer};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "glint", about = "Glint jewelry try-on CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// List catalog items of a kind (chain or earring)
    List { kind: JewelryKind },
    /// Switch to the next item
    Next { kind: JewelryKind },
    /// Switch to the previous item
    Prev { kind: JewelryKind },
    /// Select an item by index
    Select { kind: JewelryKind, index: u32 },
    /// Change overlay size and placement
    Adjust(AdjustArgs),
    /// Show or hide earrings
    Earrings {
        #[arg(action = clap::ArgAction::Set, value_parser = parse_toggle)]
        state: bool,
    },
    /// Set earring offsets (fractions of jaw width)
    EarringOffsets {
        #[arg(allow_negative_numbers = true)]
        horizontal: f64,
        #[arg(allow_negative_numbers = true)]
        vertical: f64,
        #[arg(allow_negative_numbers = true, default_value_t = 0.0)]
        depth: f64,
    },
    /// Save the current try-on frame as a PNG
    Screenshot,
    /// Rescan the asset folders and remote chain list
    Reload,
    /// List V4L2 capture devices
    Devices,
    /// Run camera diagnostics: grab one frame directly, bypassing the daemon
    CameraTest {
        #[arg(long, default_value = "/dev/video0")]
        device: String,
        /// Save the captured frame as a PNG
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Composite overlays onto a still image without the daemon
    Render {
        /// Input photo
        #[arg(long)]
        frame: PathBuf,
        /// Landmark JSON: an array of {x, y, z} in normalized coordinates
        #[arg(long)]
        landmarks: PathBuf,
        /// Chain overlay image
        #[arg(long)]
        chain: Option<PathBuf>,
        /// Earring overlay image
        #[arg(long)]
        earring: Option<PathBuf>,
        /// Draw earrings (gold dots when no earring image is given)
        #[arg(long)]
        show_earrings: bool,
        #[command(flatten)]
        adjust: AdjustArgs,
        /// Output PNG path
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Args, Debug, Default, Clone, Copy)]
struct AdjustArgs {
    /// Chain scale (0.4 to 2.5)
    #[arg(long, allow_negative_numbers = true)]
    chain_scale: Option<f32>,
    /// Chain vertical offset (-0.3 to 0.5)
    #[arg(long, allow_negative_numbers = true)]
    vertical_offset: Option<f32>,
    /// Earring scale
    #[arg(long, allow_negative_numbers = true)]
    earring_scale: Option<f32>,
}

impl AdjustArgs {
    fn is_empty(&self) -> bool {
        self.chain_scale.is_none() && self.vertical_offset.is_none() && self.earring_scale.is_none()
    }

    /// Apply the given values on top of `base`.
    fn apply(&self, mut base: Adjustments) -> Result<Adjustments> {
        if let Some(v) = self.chain_scale {
            base.set_chain_scale(v)?;
        }
        if let Some(v) = self.vertical_offset {
            base.set_vertical_offset(v)?;
        }
        if let Some(v) = self.earring_scale {
            base.set_earring_scale(v)?;
        }
        Ok(base)
    }
}

fn parse_toggle(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "show" | "true" | "1" => Ok(true),
        "off" | "hide" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got {other:?}")),
    }
}

#[zbus::proxy(
    interface = "org.glint.TryOn1",
    default_service = "org.glint.TryOn1",
    default_path = "/org/glint/TryOn1"
)]
trait TryOn {
    async fn status(&self) -> zbus::Result<String>;
    async fn list_items(&self, kind: &str) -> zbus::Result<String>;
    async fn select(&self, kind: &str, index: u32) -> zbus::Result<String>;
    async fn next(&self, kind: &str) -> zbus::Result<String>;
    async fn previous(&self, kind: &str) -> zbus::Result<String>;
    async fn set_chain_scale(&self, value: f64) -> zbus::Result<f64>;
    async fn set_vertical_offset(&self, value: f64) -> zbus::Result<f64>;
    async fn set_earring_scale(&self, value: f64) -> zbus::Result<f64>;
    async fn set_earring_offsets(&self, horizontal: f64, vertical: f64, depth: f64)
        -> zbus::Result<()>;
    async fn show_earrings(&self, show: bool) -> zbus::Result<()>;
    async fn screenshot(&self) -> zbus::Result<String>;
    async fn reload_catalog(&self) -> zbus::Result<String>;
}

async fn proxy() -> Result<TryOnProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    TryOnProxy::new(&conn)
        .await
        .context("glintd is not reachable on the session bus")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let status = proxy().await?.status().await?;
            let value: serde_json::Value = serde_json::from_str(&status)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::List { kind } => {
            let items = proxy().await?.list_items(&kind.to_string()).await?;
            let items: Vec<serde_json::Value> = serde_json::from_str(&items)?;
            if items.is_empty() {
                println!("No {kind} items");
            }
            for item in items {
                let marker = if item["current"].as_bool().unwrap_or(false) { "*" } else { " " };
                println!(
                    "{marker} {:>3}  {}",
                    item["index"].as_u64().unwrap_or_default(),
                    item["name"].as_str().unwrap_or_default()
                );
            }
        }
        Commands::Next { kind } => {
            println!("{}", proxy().await?.next(&kind.to_string()).await?);
        }
        Commands::Prev { kind } => {
            println!("{}", proxy().await?.previous(&kind.to_string()).await?);
        }
        Commands::Select { kind, index } => {
            println!("{}", proxy().await?.select(&kind.to_string(), index).await?);
        }
        Commands::Adjust(args) => {
            if args.is_empty() {
                bail!("nothing to adjust; pass --chain-scale, --vertical-offset or --earring-scale");
            }
            let proxy = proxy().await?;
            if let Some(v) = args.chain_scale {
                println!("chain scale: {:.2}", proxy.set_chain_scale(v as f64).await?);
            }
            if let Some(v) = args.vertical_offset {
                println!("vertical offset: {:.2}", proxy.set_vertical_offset(v as f64).await?);
            }
            if let Some(v) = args.earring_scale {
                println!("earring scale: {:.2}", proxy.set_earring_scale(v as f64).await?);
            }
        }
        Commands::Earrings { state } => {
            proxy().await?.show_earrings(state).await?;
            println!("earrings {}", if state { "shown" } else { "hidden" });
        }
        Commands::EarringOffsets {
            horizontal,
            vertical,
            depth,
        } => {
            proxy()
                .await?
                .set_earring_offsets(horizontal, vertical, depth)
                .await?;
        }
        Commands::Screenshot => {
            println!("{}", proxy().await?.screenshot().await?);
        }
        Commands::Reload => {
            println!("{}", proxy().await?.reload_catalog().await?);
        }
        Commands::Devices => {
            let devices = glint_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::CameraTest { device, out } => {
            println!("Running camera diagnostics on {device}...");
            camera_test(&device, out.as_deref())?;
        }
        Commands::Render {
            frame,
            landmarks,
            chain,
            earring,
            show_earrings,
            adjust,
            out,
        } => {
            let mut adjustments = adjust.apply(Adjustments::default())?;
            adjustments.show_earrings = show_earrings;
            render_still(
                &frame,
                &landmarks,
                chain.as_deref(),
                earring.as_deref(),
                adjustments,
                &out,
            )?;
            println!("{}", out.display());
        }
    }

    Ok(())
}

fn camera_test(device: &str, out: Option<&Path>) -> Result<()> {
    use glint_hw::camera::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

    let camera = glint_hw::Camera::open(device, DEFAULT_WIDTH, DEFAULT_HEIGHT)
        .with_context(|| format!("failed to open {device}"))?;
    println!("format: {}x{} {}", camera.width, camera.height, camera.fourcc);

    let frame = camera.capture_frame().context("failed to capture a frame")?;
    println!("captured frame {} ({} bytes RGB)", frame.sequence, frame.data.len());

    if let Some(out) = out {
        frame
            .into_rgb_image()?
            .save(out)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("{}", out.display());
    }
    Ok(())
}

fn render_still(
    frame: &Path,
    landmarks: &Path,
    chain: Option<&Path>,
    earring: Option<&Path>,
    adjustments: Adjustments,
    out: &Path,
) -> Result<()> {
    let photo = image::open(frame)
        .with_context(|| format!("failed to open {}", frame.display()))?
        .to_rgb8();
    let json = std::fs::read_to_string(landmarks)
        .with_context(|| format!("failed to read {}", landmarks.display()))?;
    let face = FaceLandmarks::from_json(&json)
        .with_context(|| format!("invalid landmarks in {}", landmarks.display()))?;

    let mut renderer = Renderer::new(adjustments);
    if let Some(path) = chain {
        renderer.set_overlay(JewelryKind::Chain, Some(load_overlay(path)?));
    }
    if let Some(path) = earring {
        renderer.set_overlay(JewelryKind::Earring, Some(load_overlay(path)?));
    }

    let composed = renderer.render(&photo, (!face.is_empty()).then_some(&face));
    composed
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    tracing::info!(out = %out.display(), "rendered still");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_kind_and_toggle() {
        let cli = Cli::try_parse_from(["glint", "select", "earrings", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Select { kind: JewelryKind::Earring, index: 2 }
        ));
        let cli = Cli::try_parse_from(["glint", "earrings", "off"]).unwrap();
        assert!(matches!(cli.command, Commands::Earrings { state: false }));
        assert!(Cli::try_parse_from(["glint", "list", "bracelet"]).is_err());
    }

    #[test]
    fn test_negative_offsets_parse() {
        let cli = Cli::try_parse_from(["glint", "adjust", "--vertical-offset", "-0.25"]).unwrap();
        let Commands::Adjust(args) = cli.command else {
            panic!("expected adjust");
        };
        assert_eq!(args.vertical_offset, Some(-0.25));

        let cli = Cli::try_parse_from(["glint", "earring-offsets", "-0.1", "0.2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::EarringOffsets { depth, .. } if depth == 0.0
        ));
    }

    #[test]
    fn test_camera_test_args() {
        let cli = Cli::try_parse_from(["glint", "camera-test"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::CameraTest { ref device, out: None } if device == "/dev/video0"
        ));
        let cli =
            Cli::try_parse_from(["glint", "camera-test", "--device", "/dev/video2", "--out", "f.png"])
                .unwrap();
        let Commands::CameraTest { device, out } = cli.command else {
            panic!("expected camera-test");
        };
        assert_eq!(device, "/dev/video2");
        assert_eq!(out, Some(PathBuf::from("f.png")));
    }

    #[test]
    fn test_camera_test_missing_device() {
        let err = camera_test("/dev/glint-no-such-camera", None).unwrap_err();
        assert!(err.to_string().contains("/dev/glint-no-such-camera"));
    }

    #[test]
    fn test_adjust_args_clamp() {
        let args = AdjustArgs {
            chain_scale: Some(9.0),
            vertical_offset: None,
            earring_scale: None,
        };
        let adj = args.apply(Adjustments::default()).unwrap();
        assert_eq!(adj.chain_scale, 2.5);
        assert!(!args.is_empty());
        assert!(AdjustArgs::default().is_empty());
    }

    #[test]
    fn test_render_still_writes_png() {
        let dir = std::env::temp_dir().join(format!("glint-cli-render-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let frame = dir.join("frame.png");
        RgbImage::from_pixel(200, 200, Rgb([10, 10, 10])).save(&frame).unwrap();
        let chain = dir.join("chain.png");
        RgbaImage::from_pixel(40, 20, Rgba([255, 0, 0, 255])).save(&chain).unwrap();

        let mut points = vec![serde_json::json!({"x": 0.5, "y": 0.5, "z": 0.0}); 468];
        points[234] = serde_json::json!({"x": 0.4, "y": 0.5});
        points[454] = serde_json::json!({"x": 0.6, "y": 0.5});
        points[152] = serde_json::json!({"x": 0.5, "y": 0.7});
        let landmarks = dir.join("face.json");
        std::fs::write(&landmarks, serde_json::to_string(&points).unwrap()).unwrap();

        let out = dir.join("out.png");
        render_still(&frame, &landmarks, Some(&chain), None, Adjustments::default(), &out).unwrap();

        let result = image::open(&out).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (200, 200));
        assert!(result.pixels().any(|p| p[0] > 200 && p[1] < 50));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
