use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use atelier_contracts::catalog::{DirectorChoice, MissionChoice};
use atelier_contracts::media::{AspectRatio, EncodedImage, GeneratedImage, VideoAspectRatio};
use atelier_contracts::preferences::Theme;
use atelier_engine::generation::GenerationOutcome;
use atelier_engine::imaging;
use atelier_engine::{build_backend, Mode, Studio, StudioConfig, ToastCenter, VideoFrame};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "atelier", version, about = "Atelier generation studio CLI")]
struct Cli {
    /// Overrides ATELIER_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Scenes(ScenesArgs),
    Effect(EffectArgs),
    Video(VideoArgs),
    #[command(subcommand)]
    History(HistoryCommand),
    Catalog,
    Theme(ThemeArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long)]
    ratio: Option<AspectRatio>,
    #[arg(long = "reference")]
    references: Vec<PathBuf>,
    #[arg(long, default_value = "atelier-out")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct ScenesArgs {
    #[arg(long, default_value = "")]
    subject: String,
    #[arg(long)]
    ratio: Option<AspectRatio>,
    #[arg(long)]
    character: Option<PathBuf>,
    /// Scene keys; leave empty with --random for five picks.
    #[arg(long = "scene")]
    scenes: Vec<String>,
    #[arg(long)]
    random: bool,
    #[arg(long)]
    director: Option<String>,
    #[arg(long)]
    mission: Option<String>,
    #[arg(long)]
    cinematic: bool,
    /// Sent verbatim as one variant instead of the composed prompt.
    #[arg(long = "override")]
    override_prompt: Option<String>,
    #[arg(long, default_value = "atelier-out")]
    out: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectKind {
    RemoveBg,
    Upscale,
    ZoomOut,
}

#[derive(Debug, Parser)]
struct EffectArgs {
    #[arg(value_enum)]
    kind: EffectKind,
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    green_screen: bool,
    #[arg(long, default_value = "atelier-out")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct VideoArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    ratio: Option<VideoAspectRatio>,
    #[arg(long)]
    start_frame: Option<PathBuf>,
    #[arg(long)]
    end_frame: Option<PathBuf>,
    #[arg(long)]
    director: Option<String>,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List,
    Inspect { id: String },
    Delete { id: String },
    Clear,
}

#[derive(Debug, Parser)]
struct ThemeArgs {
    #[arg(long, conflicts_with = "set")]
    toggle: bool,
    #[arg(long)]
    set: Option<Theme>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = StudioConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Command, config: StudioConfig) -> Result<i32> {
    let studio = open_studio(&config)?;
    match command {
        Command::Generate(args) => run_generate(&studio, args).await,
        Command::Scenes(args) => run_scenes(&studio, args).await,
        Command::Effect(args) => run_effect(&studio, args).await,
        Command::Video(args) => run_video(&studio, args).await,
        Command::History(command) => run_history(&studio, command).await,
        Command::Catalog => {
            print_catalog(&studio);
            Ok(0)
        }
        Command::Theme(args) => {
            let theme = match (args.toggle, args.set) {
                (true, _) => studio.toggle_theme(),
                (false, Some(theme)) => {
                    studio.set_theme(theme);
                    theme
                }
                (false, None) => studio.theme(),
            };
            println!("{theme}");
            Ok(0)
        }
    }
}

fn open_studio(config: &StudioConfig) -> Result<Studio> {
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let backend = build_backend(config)?;
    let events = config.event_writer(Uuid::new_v4().to_string());
    Ok(Studio::new(backend, config.open_storage(), events).with_toasts(ToastCenter::echoing()))
}

async fn run_generate(studio: &Studio, args: GenerateArgs) -> Result<i32> {
    studio.switch_mode(Mode::Generate);
    if let Some(ratio) = args.ratio {
        studio.select_aspect_ratio(ratio)?;
    }
    let mut uploads = Vec::with_capacity(args.references.len());
    for path in &args.references {
        uploads.push(imaging::uploaded(read_image(path)?, file_name(path)));
    }
    if !uploads.is_empty() {
        studio.upload_references(uploads).await;
    }
    studio.with_session(|session| session.generate.prompt = args.prompt.clone());
    let outcome = studio.generate().await?;
    write_outcome(&args.out, &outcome)
}

async fn run_scenes(studio: &Studio, args: ScenesArgs) -> Result<i32> {
    studio.switch_mode(Mode::StructuredScene);
    if let Some(ratio) = args.ratio {
        studio.select_aspect_ratio(ratio)?;
    }
    if let Some(path) = &args.character {
        let upload = imaging::uploaded(read_image(path)?, file_name(path));
        studio.set_character_image(Some(upload)).await;
    }
    if let Some(name) = &args.director {
        if studio.catalog().director(name).is_none() {
            bail!("unknown director '{name}'");
        }
    }
    studio.with_session(|session| {
        let scene = &mut session.scene;
        scene.prompt = args.subject.clone();
        scene.cinematic = args.cinematic;
        scene.director = args
            .director
            .clone()
            .map(DirectorChoice::Named)
            .unwrap_or_default();
        scene.mission = args
            .mission
            .clone()
            .map(MissionChoice::Explicit)
            .unwrap_or_default();
    });

    let outcome = match (&args.override_prompt, args.random, args.scenes.is_empty()) {
        (Some(prompt), _, _) => studio.generate_with_override(prompt).await?,
        (None, true, _) => studio.generate_random_scenes().await?,
        (None, false, false) => studio.generate_scenes(args.scenes.clone()).await?,
        (None, false, true) => studio.generate().await?,
    };
    write_outcome(&args.out, &outcome)
}

async fn run_effect(studio: &Studio, args: EffectArgs) -> Result<i32> {
    let data = read_image(&args.input)?;
    let name = file_name(&args.input);
    let output = match args.kind {
        EffectKind::RemoveBg => {
            studio.switch_mode(Mode::BackgroundRemoval);
            studio.with_session(|session| {
                session.removal.image = Some(imaging::uploaded(data, name));
                session.removal.green_screen = args.green_screen;
            });
            studio.remove_background().await?
        }
        EffectKind::Upscale => studio.upscale(&GeneratedImage::new(data, name, "")).await?,
        EffectKind::ZoomOut => studio.zoom_out(&GeneratedImage::new(data, name, "")).await?,
    };
    let path = write_image(&args.out, &output)?;
    println!("{}", json!({ "id": output.id, "alt": output.alt, "path": path }));
    Ok(0)
}

async fn run_video(studio: &Studio, args: VideoArgs) -> Result<i32> {
    studio.switch_mode(Mode::Video);
    for (frame, path) in [
        (VideoFrame::Start, &args.start_frame),
        (VideoFrame::End, &args.end_frame),
    ] {
        if let Some(path) = path {
            let upload = imaging::uploaded(read_image(path)?, file_name(path));
            studio.with_session(|session| match frame {
                VideoFrame::Start => session.video.start_frame = Some(upload),
                VideoFrame::End => session.video.end_frame = Some(upload),
            });
        }
    }
    studio.with_session(|session| {
        session.video.prompt = args.prompt.clone();
        session.video.aspect_ratio = args.ratio;
        session.video.director = args
            .director
            .clone()
            .map(DirectorChoice::Named)
            .unwrap_or_default();
    });
    let item = studio.generate_video().await?;
    println!(
        "{}",
        json!({
            "id": item.id,
            "uri": item.video.uri,
            "mime_type": item.video.mime_type,
            "prompt": item.params.prompt,
        })
    );
    Ok(0)
}

async fn run_history(studio: &Studio, command: HistoryCommand) -> Result<i32> {
    match command {
        HistoryCommand::List => {
            for item in studio.history() {
                println!(
                    "{}",
                    json!({
                        "id": item.id,
                        "alt": item.alt,
                        "aspect_ratio": item.aspect_ratio,
                        "size": item.size,
                        "analyzed": item.analysis.is_some(),
                        "created_at": item.created_at,
                    })
                );
            }
        }
        HistoryCommand::Inspect { id } => {
            let item = studio.inspect_history(&id).await?;
            println!(
                "{}",
                json!({ "id": item.id, "prompt": item.prompt, "analysis": item.analysis })
            );
        }
        HistoryCommand::Delete { id } => studio.delete_history(&id)?,
        HistoryCommand::Clear => studio.clear_history(),
    }
    Ok(0)
}

fn print_catalog(studio: &Studio) {
    let catalog = studio.catalog();
    println!("Directors:");
    for style in catalog.directors() {
        println!("  {}", style.name);
    }
    println!("Scenes:");
    for scene in catalog.scenes() {
        println!("  {} ({:?})", scene.key, scene.district);
    }
    println!("Missions:");
    for category in catalog.missions() {
        println!("  {}: {}", category.name, category.options.len());
    }
    println!("Companions:");
    for name in catalog.companion_names() {
        println!("  {name}");
    }
    println!("Aspect ratios:");
    for ratio in AspectRatio::ALL {
        println!("  {ratio}");
    }
}

fn write_outcome(out: &Path, outcome: &GenerationOutcome) -> Result<i32> {
    for image in &outcome.images {
        let path = write_image(out, image)?;
        println!("{}", json!({ "id": image.id, "alt": image.alt, "path": path }));
    }
    println!("{}", json!({ "status": outcome.status }));
    Ok(if outcome.is_partial() { 2 } else { 0 })
}

fn write_image(out: &Path, image: &GeneratedImage) -> Result<String> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let path = out.join(format!("{}.{}", image.id, extension_for(&image.data.mime_type)));
    fs::write(&path, &image.data.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.display().to_string())
}

fn read_image(path: &Path) -> Result<EncodedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(EncodedImage::new(bytes, mime_for(path)))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.png".to_string())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}
