use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use lifeline::CaptureSurface as _;

#[derive(Parser, Debug)]
#[command(name = "lifeline", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the diagram as a single content-cropped JPEG.
    Frame(FrameArgs),
    /// Export the step-through animation as a ZIP of JPEG frames.
    Export(ExportArgs),
    /// Generate a diagram from text or an image via the AI service.
    Generate(GenerateArgs),
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input diagram JSON. Defaults to the built-in sample diagram.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Output JPEG path.
    #[arg(long, default_value = lifeline::SINGLE_IMAGE_FILE_NAME)]
    out: PathBuf,

    /// Playback mode to render.
    #[arg(long, value_enum, default_value_t = ModeChoice::Static)]
    mode: ModeChoice,

    /// Playback step for dynamic mode; -1 shows no messages.
    #[arg(long, allow_hyphen_values = true)]
    step: Option<i32>,

    /// Logical canvas width.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Logical canvas height.
    #[arg(long, default_value_t = 960)]
    height: u32,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input diagram JSON. Defaults to the built-in sample diagram.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Output ZIP path.
    #[arg(long, default_value = lifeline::ANIMATION_ARCHIVE_FILE_NAME)]
    out: PathBuf,

    /// Logical canvas width.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Logical canvas height.
    #[arg(long, default_value_t = 960)]
    height: u32,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Free-text description of the interaction flow.
    #[arg(long, conflicts_with = "image")]
    text: Option<String>,

    /// Path to an image of an existing diagram or sketch.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Generator API key; falls back to the GEMINI_API_KEY environment
    /// variable.
    #[arg(long)]
    api_key: Option<String>,

    /// Write the diagram JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Static,
    Dynamic,
}

impl From<ModeChoice> for lifeline::PlaybackMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::Static => lifeline::PlaybackMode::Static,
            ModeChoice::Dynamic => lifeline::PlaybackMode::Dynamic,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => cmd_export(args),
        Command::Generate(args) => cmd_generate(args),
    }
}

fn read_diagram(path: Option<&Path>) -> anyhow::Result<lifeline::Diagram> {
    let Some(path) = path else {
        return Ok(lifeline::Diagram::sample());
    };
    let f = File::open(path).with_context(|| format!("open diagram '{}'", path.display()))?;
    let r = BufReader::new(f);
    let diagram: lifeline::Diagram =
        serde_json::from_reader(r).with_context(|| "parse diagram JSON")?;
    Ok(diagram)
}

fn make_surface(diagram: lifeline::Diagram, width: u32, height: u32) -> lifeline::SceneRenderer {
    lifeline::SceneRenderer::new(
        diagram,
        lifeline::SceneOptions {
            width,
            height,
            ..lifeline::SceneOptions::default()
        },
    )
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let diagram = read_diagram(args.in_path.as_deref())?;
    diagram.validate()?;

    let mut session = lifeline::Session::new(diagram.clone());
    session.set_mode(args.mode.into());
    if let Some(step) = args.step {
        session.set_step(step);
    }

    let mut surface = make_surface(diagram, args.width, args.height);
    surface.set_view(session.mode, session.current_step);

    lifeline::export_image(&mut session, &mut surface, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let diagram = read_diagram(args.in_path.as_deref())?;
    diagram.validate()?;

    let mut session = lifeline::Session::new(diagram.clone());
    let mut surface = make_surface(diagram, args.width, args.height);
    surface.set_view(session.mode, session.current_step);

    let report = lifeline::export_animation(&mut session, &mut surface, &args.out, |progress| {
        eprintln!("capturing frame {}/{}", progress.current, progress.total);
    })?;

    eprintln!(
        "wrote {} ({} frames captured, {} skipped)",
        args.out.display(),
        report.frames_captured,
        report.frames_skipped
    );
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let cfg = match args.api_key {
        Some(key) => lifeline::GeneratorConfig::new(key),
        None => lifeline::GeneratorConfig::from_env()?,
    };
    let generator = lifeline::DiagramGenerator::new(cfg)?;

    let diagram = match (&args.text, &args.image) {
        (Some(text), None) => generator.generate_from_text(text)?,
        (None, Some(path)) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
            let payload = lifeline::ImagePayload::from_bytes(mime_for_path(path), &bytes);
            generator.generate_from_image(&payload)?
        }
        _ => anyhow::bail!("pass exactly one of --text or --image"),
    };

    let json = serde_json::to_string_pretty(&diagram)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("write diagram '{}'", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}
