//! CLI command handler: build settings (defaults, settings file, flags), run, report.

use anyhow::{Context, Result};
use log::{info, warn};

use crate::engine::arg_parser::Cli;
use crate::engine::progress::{ReporterOpts, report_progress};
use crate::process::Process;
use crate::settings::Settings;
use crate::stages::default_stages;
use crate::utils::settings_toml::parse_settings_toml;
use crate::utils::{apply_file_to_settings, load_settings_toml, settings_toml_path};

/// Defaults, then the settings file, then explicit flags.
pub fn build_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::new(&cli.collection, &cli.dir);

    match &cli.config {
        Some(path) => {
            let s = std::fs::read_to_string(path)
                .with_context(|| format!("read settings file {}", path.display()))?;
            let file = parse_settings_toml(&s)
                .with_context(|| format!("settings file {}", path.display()))?;
            apply_file_to_settings(&file, &mut settings);
        }
        None => {
            let path = settings_toml_path(&cli.dir);
            if let Some(file) = load_settings_toml(&path) {
                apply_file_to_settings(&file, &mut settings);
            }
        }
    }

    if let Some(ref p) = cli.publish_dir {
        settings.publish_dir = p.clone();
    }
    if let Some(ref name) = cli.archive_name {
        settings.archive_subfolder_name = name.clone();
    }
    if let Some(w) = cli.workers {
        settings.conversion.workers = w;
    }
    if let Some(ms) = cli.timeout_ms {
        settings.timeout_ms = ms;
    }
    if let Some(w) = cli.width {
        settings.conversion.width = w;
    }
    if let Some(h) = cli.height {
        settings.conversion.height = h;
    }
    if let Some(m) = cli.move_original {
        settings.conversion.move_original = m;
    }
    if let Some(s) = cli.strict_metadata {
        settings.strict_metadata = s;
    }
    if let Some(ref tool) = cli.tool {
        let argv: Vec<String> = tool.split_whitespace().map(str::to_string).collect();
        if !argv.is_empty() {
            settings.tool_command = argv;
        }
    }
    if let Some(v) = cli.verbose {
        settings.verbose = v;
    }
    Ok(settings)
}

/// Convert `cli.dir` into its collection folder. Ctrl+C kills the run.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let settings = build_settings(cli)?;
    crate::utils::setup_logging(settings.verbose, cli.json);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut stage_count = 0;
    let (process, cfs) = Process::start(&cli.id, &settings, tx, |cfs| {
        let stages = default_stages(cfs)?;
        stage_count = stages.len();
        Ok(stages)
    })?;
    info!(
        "Converting {} images from {}",
        cfs.len(),
        cfs.source_dir.display()
    );

    let ctrlc_process = process.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, stopping after the images in flight");
        ctrlc_process.kill();
    })
    .context("set Ctrl+C handler")?;

    let summary = report_progress(
        &rx,
        process.id(),
        cfs.len() * stage_count,
        ReporterOpts::for_settings(&settings, cli.json),
    );
    process.wait()?;
    if let Ok(folder) = cfs.publish_folder() {
        info!("Collection written to {}", folder.display());
    }
    if summary.failed > 0 {
        warn!("{} steps failed, see the messages above", summary.failed);
    }
    Ok(())
}
