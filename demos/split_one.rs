use everyinstrument::{Config, OutputFormat, Preset, Separator, SplitOptions, StemsMode};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args.next().expect("usage: split_one <audio> [out_dir]");
    let out = args.next().unwrap_or_else(|| "./out".into());

    everyinstrument::set_split_progress_callback(|p| eprintln!("{p:?}"));

    let cfg = Config::from_env()?;
    let separator = Separator::from_config(&cfg);
    let opts = SplitOptions {
        preset: Preset::Balanced,
        stems: StemsMode::TwoStems,
        output_format: OutputFormat::Wav,
        use_gpu: false,
        residual_suppression: false,
    };

    let res = separator.split_file(input.as_ref(), &opts, out.as_ref())?;
    for f in &res.package.files {
        eprintln!("{}: {}", f.name, f.path.display());
    }
    if let Some(zip) = &res.package.archive {
        eprintln!("archive: {}", zip.display());
    }
    Ok(())
}
