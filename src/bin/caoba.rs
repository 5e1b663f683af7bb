use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use caoba::photos::{self, SortMode};
use caoba::{AudioTrack, JobManager, PlacementMode, RenderRequest, RenderResult, VideoFormat};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

/// Default output file name, placed in the photo folder
const DEFAULT_OUTPUT: &str = "caoba_slideshow.mp4";

#[derive(Parser, Debug)]
#[command(name = "caoba", version, about = "Turn a folder of photos into an MP4 slideshow")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the photos of a folder in slideshow order.
    List(ListArgs),
    /// Render the slideshow (requires `ffmpeg` and, with music, `ffprobe`).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ListArgs {
    /// Folder holding the photos.
    folder: PathBuf,

    /// Photo order: `name` or `date`.
    #[arg(long, default_value = "name", value_parser = parse_sort)]
    sort: SortMode,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Folder holding the photos.
    folder: PathBuf,

    /// Photo order: `name` or `date`.
    #[arg(long, default_value = "name", value_parser = parse_sort)]
    sort: SortMode,

    /// Seconds each photo stays on screen.
    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    /// Cross-dissolve between photos.
    #[arg(long)]
    transition: bool,

    /// Frame format: 16:9, 9:16, 4:5, 5:4, 2:3 or 3:2.
    #[arg(long, default_value = "16:9", value_parser = parse_format)]
    format: VideoFormat,

    /// Music track, repeatable. `PATH` follows the previous track,
    /// `PATH@N` starts with photo number N (1-based).
    #[arg(long = "music", value_parser = parse_track)]
    music: Vec<AudioTrack>,

    /// Output MP4 path (defaults to caoba_slideshow.mp4 in the photo folder).
    #[arg(long)]
    out: Option<PathBuf>,

    /// ffmpeg executable.
    #[arg(long)]
    ffmpeg: Option<String>,

    /// ffprobe executable.
    #[arg(long)]
    ffprobe: Option<String>,
}

fn parse_sort(s: &str) -> Result<SortMode, String> {
    s.parse().map_err(|e: caoba::Error| e.to_string())
}

fn parse_format(s: &str) -> Result<VideoFormat, String> {
    s.parse().map_err(|e: caoba::Error| e.to_string())
}

fn parse_track(s: &str) -> Result<AudioTrack, String> {
    // `@` only introduces a photo number when digits follow; file names may contain it too
    match s.rsplit_once('@') {
        Some((path, photo))
            if !path.is_empty()
                && !photo.is_empty()
                && photo.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let photo: usize = photo
                .parse()
                .map_err(|_| format!("invalid photo number in '{s}'"))?;
            if photo == 0 {
                return Err("photo numbers start at 1".to_string());
            }
            Ok(AudioTrack::new(path, PlacementMode::ManualIndex(photo - 1)))
        }
        _ => Ok(AudioTrack::new(s, PlacementMode::AutoSequential)),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "caoba=debug" } else { "caoba=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Command::List(args) => list(args),
        Command::Render(args) => render(args),
    }
}

fn list(args: ListArgs) -> ExitCode {
    let files = photos::scan(&args.folder, args.sort);
    let width = files.len().to_string().len();
    for (i, path) in files.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("{:0width$}. {}", i + 1, name, width = width);
    }
    if files.len() < caoba::MIN_PHOTOS {
        eprintln!(
            "found {} valid photos, at least {} are required",
            files.len(),
            caoba::MIN_PHOTOS
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn render(args: RenderArgs) -> ExitCode {
    let files = photos::scan(&args.folder, args.sort);
    let mut music = args.music;
    if let Some(first) = music.first_mut() {
        first.placement = PlacementMode::FirstTrackImplicit;
    }

    let request = RenderRequest {
        photos: files,
        music,
        seconds_per_photo: args.seconds,
        transition: args.transition,
        format: args.format,
        destination: args
            .out
            .unwrap_or_else(|| args.folder.join(DEFAULT_OUTPUT)),
        ffmpeg_path: args.ffmpeg,
        ffprobe_path: args.ffprobe,
    };

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("preparing");

    let manager = JobManager::default();
    let progress_bar = bar.clone();
    let handle = match manager.start(request, move |event| {
        progress_bar.set_position(event.percent.into());
        progress_bar.set_message(event.current_file);
    }) {
        Ok(handle) => handle,
        Err(e) => {
            bar.abandon();
            eprintln!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    // typing `q` + Enter cancels the render
    let canceller = manager.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim() == "q" => {
                    canceller.cancel();
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });

    let outcome = handle.wait();
    let result = RenderResult::from(&outcome);
    if result.success {
        bar.finish_with_message("done");
        if let Some(path) = result.output_path {
            println!("{}", path.display());
        }
        ExitCode::SUCCESS
    } else {
        bar.abandon();
        eprintln!("{}", result.error_message.unwrap_or_default());
        ExitCode::FAILURE
    }
}
