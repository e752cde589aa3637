use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;
use pollster::block_on;

use shadow_pipeline::{
    build_render_scene, demo_scene, print_frame_summary, print_scene_summary, FrameTimer,
    GpuRenderer, RenderConfig, RenderScene, Scene, SoftwareRenderer,
};

const USAGE: &str = "Usage: shadow-pipeline [scene.xml] [--width W] [--height H] [--frames N] [--output image.png] [--gpu]";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let scene = match &options.scene {
        Some(path) => Scene::from_path(path)?,
        None => demo_scene(),
    };
    print_scene_summary(&scene);

    let mut config = scene.settings;
    if let Some(width) = options.width {
        config.width = width;
    }
    if let Some(height) = options.height {
        config.height = height;
    }
    let render_scene = build_render_scene(&scene, &config).context("failed to prepare scene")?;

    if options.gpu {
        match run_gpu(config, &render_scene, options.output.as_deref()) {
            Ok(()) => return Ok(()),
            Err(err) => {
                eprintln!("{err:#}. Falling back to the software renderer.");
            }
        }
    }
    run_software(config, &render_scene, &options)
}

fn run_software(config: RenderConfig, scene: &RenderScene, options: &CliOptions) -> Result<()> {
    let renderer = SoftwareRenderer::new(config);
    let mut timer = FrameTimer::default();
    let mut last_frame = None;
    timer.start();
    for _ in 0..options.frames {
        last_frame = Some(renderer.render(scene)?);
        timer.tick();
    }
    let frame = last_frame.ok_or_else(|| anyhow!("no frames were rendered"))?;

    print_frame_summary(&frame);
    println!(
        "Rendered {} frame(s) at {}x{}, average {:.2} ms ({:.1} fps)",
        timer.frames(),
        config.width,
        config.height,
        timer.average().as_secs_f64() * 1000.0,
        timer.frame_rate()
    );

    if let Some(path) = &options.output {
        save_png(path, config.width, config.height, frame.color.to_rgba8())?;
    }
    Ok(())
}

fn run_gpu(config: RenderConfig, scene: &RenderScene, output: Option<&Path>) -> Result<()> {
    let renderer = block_on(GpuRenderer::new(config)).context("GPU renderer unavailable")?;
    let frame = renderer.render(scene)?;
    info!("GPU frame finished");
    println!("Rendered 1 frame(s) on the GPU at {}x{}", frame.width, frame.height);
    if let Some(path) = output {
        save_png(path, frame.width, frame.height, frame.rgba)?;
    }
    Ok(())
}

fn save_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<()> {
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("pixel buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[derive(Debug, Default)]
struct CliOptions {
    scene: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    frames: u32,
    output: Option<PathBuf>,
    gpu: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            frames: 1,
            ..Self::default()
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--width" => options.width = Some(parse_positive(&value("--width")?, "--width")?),
                "--height" => {
                    options.height = Some(parse_positive(&value("--height")?, "--height")?)
                }
                "--frames" => options.frames = parse_positive(&value("--frames")?, "--frames")?,
                "--output" => options.output = Some(PathBuf::from(value("--output")?)),
                "--gpu" => options.gpu = true,
                "-h" | "--help" => return Err(anyhow!(USAGE)),
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
                path if options.scene.is_none() => options.scene = Some(PathBuf::from(path)),
                extra => return Err(anyhow!("Unexpected argument: {extra}\n{USAGE}")),
            }
        }
        Ok(options)
    }
}

fn parse_positive(text: &str, flag: &str) -> Result<u32> {
    match text.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(anyhow!("{flag} expects a positive integer, got `{text}`")),
    }
}
