//! GhostScale CLI
//!
//! Command-line interface for inspecting and running the scale filter.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ghostscale::{
    amf::SurfaceFormat,
    config::parse_output_format,
    filter::formats::{self, OUTPUT_FORMATS},
    types::{ColorPrimaries, TransferCharacteristic},
    Frame, HwDevice, HwDeviceType, InputLink, PixelFormat, Resolution, ScaleConfig, ScaleFilter,
    SoftwareFactory,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ghostscale")]
#[command(about = "AMF GPU Video Scaler - Resize and color-convert raw video")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend information and negotiated formats
    Info,

    /// List pixel formats and their accelerator surface formats
    Formats,

    /// Scale a raw video file through the software backend
    Scale {
        /// Input raw video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output raw video file
        #[arg(short, long)]
        output: PathBuf,

        /// Input frame size (e.g., 1920x1080)
        #[arg(short, long)]
        size: String,

        /// Input pixel format
        #[arg(long, default_value = "nv12")]
        pix_fmt: String,

        /// TOML config file; command-line options override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output width expression
        #[arg(short = 'W', long)]
        width: Option<String>,

        /// Output height expression
        #[arg(short = 'H', long)]
        height: Option<String>,

        /// Output pixel format, or "same"
        #[arg(short, long)]
        format: Option<String>,

        /// Scaling algorithm (bilinear, bicubic)
        #[arg(long)]
        scale_type: Option<String>,

        /// Color profile (bt601, bt709, bt2020, jpeg)
        #[arg(long)]
        color_profile: Option<String>,

        /// Output color range (studio, full)
        #[arg(long)]
        color_range: Option<String>,

        /// Output color primaries
        #[arg(long)]
        primaries: Option<String>,

        /// Output transfer characteristic
        #[arg(long)]
        trc: Option<String>,

        /// Keep the input aspect ratio (disable, decrease, increase)
        #[arg(long)]
        force_original_aspect_ratio: Option<String>,

        /// Round the output size to a multiple of this
        #[arg(long)]
        force_divisible_by: Option<u32>,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        frames: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ghostscale=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Formats => cmd_formats(),
        Commands::Scale {
            input,
            output,
            size,
            pix_fmt,
            config,
            width,
            height,
            format,
            scale_type,
            color_profile,
            color_range,
            primaries,
            trc,
            force_original_aspect_ratio,
            force_divisible_by,
            frames,
        } => {
            let mut cfg = match config {
                Some(path) => ScaleConfig::load(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => ScaleConfig::default(),
            };
            if let Some(w) = width {
                cfg.width = w;
            }
            if let Some(h) = height {
                cfg.height = h;
            }
            if let Some(f) = format {
                cfg.format = parse_output_format(&f)?;
            }
            if let Some(s) = scale_type {
                cfg.scale_type = s.parse()?;
            }
            if let Some(p) = color_profile {
                cfg.color_profile = Some(p.parse()?);
            }
            if let Some(r) = color_range {
                cfg.color_range = Some(r.parse()?);
            }
            if let Some(p) = primaries {
                cfg.primaries = Some(p.parse::<ColorPrimaries>()?);
            }
            if let Some(t) = trc {
                cfg.trc = Some(t.parse::<TransferCharacteristic>()?);
            }
            if let Some(p) = force_original_aspect_ratio {
                cfg.force_original_aspect_ratio = p.parse()?;
            }
            if let Some(d) = force_divisible_by {
                cfg.force_divisible_by = d;
            }

            let size: Resolution = size.parse()?;
            let pix_fmt: PixelFormat = pix_fmt.parse()?;
            cmd_scale(input, output, size, pix_fmt, cfg, frames)
        }
    }
}

fn cmd_info() -> anyhow::Result<()> {
    println!("GhostScale System Information");
    println!("=============================\n");

    println!("Version: {}", ghostscale::VERSION);
    println!("Backend: software");
    println!(
        "swscale: {}",
        if ghostscale::has_swscale() { "Yes" } else { "No" }
    );

    println!("\n=== Negotiated formats ===");
    let lists = formats::negotiate(None)?;
    println!("No device:");
    println!("  in:  {}", join(&lists.input));
    println!("  out: {}", join(&lists.output));

    for device_type in [
        HwDeviceType::D3d11va,
        HwDeviceType::Dxva2,
        HwDeviceType::Amf,
        HwDeviceType::Vaapi,
    ] {
        let device = HwDevice::native(device_type, 0);
        match formats::negotiate(Some(&device)) {
            Ok(lists) => println!("{} device: out {}", device_type, join(&lists.output)),
            Err(e) => println!("{} device: {}", device_type, e),
        }
    }

    Ok(())
}

fn join(formats: &[PixelFormat]) -> String {
    formats
        .iter()
        .map(|f| f.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn cmd_formats() -> anyhow::Result<()> {
    println!("Pixel Formats");
    println!("=============\n");

    for format in PixelFormat::ALL {
        let surface = SurfaceFormat::from_pixel_format(format);
        let kind = if format.is_hardware() { "hardware" } else { "host" };
        println!("  {:<12} {:<9} surface {:?}", format.name(), kind, surface);
    }

    Ok(())
}

fn cmd_scale(
    input: PathBuf,
    output: PathBuf,
    size: Resolution,
    pix_fmt: PixelFormat,
    config: ScaleConfig,
    max_frames: Option<u64>,
) -> anyhow::Result<()> {
    if pix_fmt.is_hardware() {
        bail!("Input format must be a pixel layout, got {}", pix_fmt);
    }
    let out_format = config.format.unwrap_or(pix_fmt);
    if !OUTPUT_FORMATS.contains(&out_format) || out_format.is_hardware() {
        bail!("{} is not a host output format", out_format);
    }

    let factory = Arc::new(SoftwareFactory::new());
    let stats = factory.stats();
    let mut filter = ScaleFilter::init(config, factory)?;
    let link = InputLink::host(pix_fmt, size.width, size.height);
    let out_link = filter.config_output(&link, out_format)?;

    println!(
        "Scaling {} {} -> {} {}x{}",
        pix_fmt, size, out_link.format, out_link.width, out_link.height
    );

    let frame_size: usize = pix_fmt
        .plane_geometry(size.width, size.height)
        .iter()
        .map(|(b, r)| b * r)
        .sum();

    let mut reader = BufReader::new(
        File::open(&input).with_context(|| format!("Failed to open {}", input.display()))?,
    );
    let mut writer = BufWriter::new(
        File::create(&output).with_context(|| format!("Failed to create {}", output.display()))?,
    );

    let frames = RawFrames {
        reader: &mut reader,
        format: pix_fmt,
        size,
        frame_size,
        pts: 0,
        remaining: max_frames,
    };

    let start = std::time::Instant::now();
    let count = filter.run(frames, |frame| {
        writer.write_all(&frame.to_packed())?;
        Ok(())
    })?;
    writer.flush()?;
    filter.uninit();
    let elapsed = start.elapsed();

    println!("\nResults:");
    println!("  Frames: {}", count);
    println!("  Total time: {:.2}s", elapsed.as_secs_f64());
    if count > 0 {
        println!(
            "  ms/frame: {:.2}",
            elapsed.as_secs_f64() * 1000.0 / count as f64
        );
    }
    println!("  Surfaces created: {}", stats.created());
    println!("  Surfaces live: {}", stats.live());

    Ok(())
}

/// Frames read back to back from a raw file
struct RawFrames<'a, R: Read> {
    reader: &'a mut R,
    format: PixelFormat,
    size: Resolution,
    frame_size: usize,
    pts: i64,
    remaining: Option<u64>,
}

impl<R: Read> Iterator for RawFrames<'_, R> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.remaining == Some(0) {
            return None;
        }
        let mut buf = vec![0u8; self.frame_size];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return None,
            Err(e) => {
                tracing::error!("Read error: {}", e);
                return None;
            }
        }
        let mut frame = Frame::from_packed(self.format, self.size.width, self.size.height, &buf)?;
        frame.pts = self.pts;
        self.pts += 1;
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        Some(frame)
    }
}
