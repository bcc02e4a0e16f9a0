mod cli;
mod naming;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use imx_scan::fit::NullFdtFormatter;
use imx_scan::report::{Container, Report};
use walkdir::WalkDir;

use cli::{Cli, OutputFormat};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).init();

    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        if let Err(err) = ctrlc::set_handler(move || cancelled.store(true, Ordering::SeqCst)) {
            log::warn!("failed to install interrupt handler: {err}");
        }
    }

    let files = match collect_files(&cli.path) {
        Ok(files) => files,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut report = Report::new();
    let formatter = NullFdtFormatter;
    let mut had_io_error = false;

    for path in files {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                log::error!("failed to read {}: {err}", path.display());
                had_io_error = true;
                continue;
            }
        };

        log::debug!("scanning {} ({} bytes)", path.display(), data.len());
        let outcome =
            imx_scan::scan(&data, cli.increment, &formatter, &|| cancelled.load(Ordering::SeqCst));
        let mut containers = outcome.containers;

        if cli.extract {
            extract_images(&path, &containers);
        }
        if !cli.include_image_contents {
            strip_image_contents(&mut containers);
        }

        let was_interrupted = outcome.interrupted;
        report.insert(path, containers);

        if was_interrupted {
            cancelled.store(true, Ordering::SeqCst);
            break;
        }
    }

    if let Err(err) = print_report(&report, cli.output_format) {
        log::error!("failed to serialize report: {err}");
        return ExitCode::FAILURE;
    }

    if had_io_error { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

/// Directories are walked recursively; every regular file yields one
/// scan. A non-directory path is treated as a single file (spec.md §6).
fn collect_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files = Vec::new();
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(std::io::Error::other)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    } else {
        Ok(vec![path.to_path_buf()])
    }
}

fn extract_images(source: &Path, containers: &[Container]) {
    for container in containers {
        for image in container.images().iter().chain(container.csf()) {
            let (Some(range), Some(data)) = (image.range(), image.data.as_ref()) else { continue };
            let name = naming::extracted_filename(source, range.start, image.fileext.as_str());
            let out_path = source.parent().map(|dir| dir.join(&name)).unwrap_or_else(|| PathBuf::from(&name));
            if let Err(err) = fs::write(&out_path, data) {
                log::error!("failed to write {}: {err}", out_path.display());
            }
        }
    }
}

fn strip_image_contents(containers: &mut [Container]) {
    for container in containers {
        for image in container.images_mut() {
            image.data = None;
        }
        if let Some(csf) = container.csf_mut() {
            csf.data = None;
        }
    }
}

fn print_report(report: &Report, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Auto | OutputFormat::Yaml => println!("{}", serde_yaml::to_string(report)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}
