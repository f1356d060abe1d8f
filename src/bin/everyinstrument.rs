use clap::{Parser, Subcommand};
use everyinstrument::{
    presets, server, set_split_progress_callback, Config, FfmpegTranscoder, OutputFormat, Preset,
    Separator, SplitOptions, SplitProgress, StemsMode,
};
use std::{net::SocketAddr, path::PathBuf, process};

#[derive(Parser)]
#[command(name = "everyinstrument")]
#[command(about = "Vocal remover and stem splitter", long_about = None)]
#[command(version)]
struct Cli {
    /// Results cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Python interpreter with demucs installed
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the local web app (default)
    Serve {
        #[arg(short, long)]
        addr: Option<SocketAddr>,
    },

    /// Separate one file
    Split {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[arg(short, long, default_value = "balanced")]
        preset: Preset,

        #[arg(short, long, default_value = "instrumental")]
        stems: StemsMode,

        #[arg(short, long, default_value = "wav")]
        format: OutputFormat,

        #[arg(long)]
        gpu: bool,

        /// Subtract a little of the vocal stem from the instrumental
        #[arg(long)]
        residual: bool,

        #[arg(short, long)]
        quiet: bool,
    },

    /// Print audio metadata
    Probe { input: PathBuf },

    /// List quality presets
    Presets,

    /// Check external tools
    Check,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|cfg| match cli.command {
        None => handle_serve(cfg, None),
        Some(Commands::Serve { addr }) => handle_serve(cfg, addr),
        Some(Commands::Split {
            input,
            output,
            preset,
            stems,
            format,
            gpu,
            residual,
            quiet,
        }) => {
            let opts = SplitOptions {
                preset,
                stems,
                output_format: format,
                use_gpu: gpu,
                residual_suppression: residual,
            };
            handle_split(&cfg, input, output, opts, quiet)
        }
        Some(Commands::Probe { input }) => handle_probe(&cfg, input),
        Some(Commands::Presets) => handle_presets(),
        Some(Commands::Check) => handle_check(&cfg),
    });

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut cfg = Config::from_env()?;
    if let Some(dir) = &cli.cache_dir {
        cfg.cache_dir = dir.clone();
    }
    if let Some(python) = &cli.python {
        cfg.python = python.clone();
    }
    Ok(cfg)
}

fn handle_serve(mut cfg: Config, addr: Option<SocketAddr>) -> CliResult {
    if let Some(addr) = addr {
        cfg.listen_addr = addr;
    }
    if !FfmpegTranscoder::new(&cfg.ffmpeg, &cfg.ffprobe).is_available() {
        log::warn!("ffmpeg is required but not detected; separation requests will fail");
    }

    let separator = Separator::from_config(&cfg);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server::run_server(cfg, separator))?;
    Ok(())
}

fn handle_split(
    cfg: &Config,
    input: PathBuf,
    output: PathBuf,
    opts: SplitOptions,
    quiet: bool,
) -> CliResult {
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }

    if !quiet {
        setup_progress_callbacks();
        eprintln!("EveryInstrument");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("Input:   {}", input.display());
        eprintln!("Output:  {}", output.display());
        eprintln!("Preset:  {}", opts.preset);
        eprintln!("Stems:   {}", opts.stems);
        eprintln!("Format:  {}", opts.output_format);
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let separator = Separator::from_config(cfg);
    let result = separator.split_file(&input, &opts, &output)?;

    if !quiet {
        eprintln!();
        eprintln!(
            "Done with {} ({}){}",
            result.separation.engine,
            result.separation.model,
            if result.cache_hit { ", from cache" } else { "" }
        );
        for f in &result.package.files {
            eprintln!("  {:<14} {}", f.name, f.path.display());
        }
        if let Some(zip) = &result.package.archive {
            eprintln!("  {:<14} {}", "archive", zip.display());
        }
    } else {
        // Quiet mode: just print paths
        for f in &result.package.files {
            println!("{}", f.path.display());
        }
        if let Some(zip) = &result.package.archive {
            println!("{}", zip.display());
        }
    }

    Ok(())
}

fn handle_probe(cfg: &Config, input: PathBuf) -> CliResult {
    let separator = Separator::from_config(cfg);
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("input has no file name")?
        .to_string();
    let asset = separator.ingest(&name, std::fs::read(&input)?)?;
    let info = asset.info().cloned().unwrap_or_default();
    let unknown = || "unknown".to_string();

    println!("Size:        {:.2} MB", asset.size() as f64 / 1e6);
    println!(
        "Duration:    {} s",
        info.duration_secs.map(|d| format!("{d:.2}")).unwrap_or_else(unknown)
    );
    println!(
        "Sample rate: {} Hz",
        info.sample_rate.map(|r| r.to_string()).unwrap_or_else(unknown)
    );
    println!(
        "Channels:    {}",
        info.channels.map(|c| c.to_string()).unwrap_or_else(unknown)
    );
    println!("Format:      {}", info.format.unwrap_or_else(unknown));
    Ok(())
}

fn handle_presets() -> CliResult {
    eprintln!("Quality presets");
    eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in presets() {
        let marker = if entry.preset == Preset::default() {
            " (default)"
        } else {
            ""
        };
        eprintln!(
            "  • {:<9} {:<12} {}{}",
            entry.preset, entry.model, entry.description, marker
        );
    }
    eprintln!();
    eprintln!("Use --preset <name> to pick one");
    Ok(())
}

fn handle_check(cfg: &Config) -> CliResult {
    let ffmpeg = FfmpegTranscoder::new(&cfg.ffmpeg, &cfg.ffprobe).is_available();
    let separator = Separator::from_config(cfg);
    let cuda = separator.cuda_available();
    println!("ffmpeg/ffprobe: {}", if ffmpeg { "ok" } else { "missing" });
    println!("cuda:           {}", if cuda { "available" } else { "unavailable" });
    println!("cache dir:      {}", separator.cache().root().display());
    if !ffmpeg {
        return Err("ffmpeg is required but not detected. Install ffmpeg and ensure it is on PATH".into());
    }
    Ok(())
}

fn setup_progress_callbacks() {
    set_split_progress_callback(|progress| match progress {
        SplitProgress::Stage(stage) => {
            let stage_name = match stage {
                "normalize" => "Preparing audio",
                "cache_lookup" => "Checking cache",
                "separate" => "Running separation",
                "package" => "Packaging stems",
                _ => stage,
            };
            eprintln!("⏳ {}", stage_name);
        }
        SplitProgress::CacheHit { fingerprint } => {
            eprintln!("♻️  Cache hit {}", &fingerprint[..12.min(fingerprint.len())]);
        }
        SplitProgress::Log(line) => eprintln!("   {}", line),
        SplitProgress::Finished => {
            // This is handled in handle_split
        }
    });
}
