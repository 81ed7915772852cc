use chrono::NaiveDate;
use ndarray::ArrayView2;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::archive::{
    ArtifactProvider, CanonicalArchive, DirectoryListing, DirectoryProvider, FileListing,
    StagingArea,
};
use crate::cli::args::{Cli, Commands};
use crate::config::AppConfig;
use crate::dashboard::{Dispatcher, Event, PlaybackSpeed};
use crate::error::{ArchiveError, Result};
use crate::fetch::{enumerate_jobs, fetch_latest, FetchJob, Fetcher, HttpTransport, LatestOutcome};
use crate::models::DispersionDataset;
use crate::processors::{CollisionPolicy, Reconciler, UnionVerifier};
use crate::query::{to_web_mercator, QueryIndex};
use crate::readers::{default_reader, DispersionReader};
use crate::render::{plan_frames, render_raster, scan_timelines, FrameRenderer, LogScale};
use crate::utils::filename::{frame_file_name, generate_default_manifest_filename, yesterday};
use crate::utils::logging::init_logging;
use crate::utils::progress::ProgressReporter;

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::FetchRange {
            start,
            end,
            forecasts,
            max_concurrent,
            overwrite,
        } => {
            let runs = config.select_forecasts(&forecasts)?;
            let jobs = enumerate_jobs(&runs, start, end)?;
            println!(
                "Fetching {} forecast runs from {} to {}",
                jobs.len(),
                start,
                end
            );
            println!("Data root: {}", config.data_root.display());

            let max_concurrent = max_concurrent.unwrap_or(config.fetch.max_concurrent);
            let skip_existing = config.fetch.skip_existing && !overwrite;
            fetch_jobs(&config, jobs, max_concurrent, skip_existing).await?;
        }

        Commands::FetchDaily { date, forecasts } => {
            let date = date.unwrap_or_else(yesterday);
            let runs = config.select_forecasts(&forecasts)?;
            let jobs = enumerate_jobs(&runs, date, date)?;
            println!("Fetching {} forecast runs for {}", jobs.len(), date);

            fetch_jobs(
                &config,
                jobs,
                config.fetch.max_concurrent,
                config.fetch.skip_existing,
            )
            .await?;
        }

        Commands::FetchLatest { archive } => {
            let archive_dir = archive.unwrap_or_else(|| config.archive_dir.clone());
            let archive = CanonicalArchive::open(&archive_dir)?;
            let staging = StagingArea::new_in(&config.staging_dir)?;
            let reader = default_reader()?;
            let fetcher = build_fetcher(&config, config.fetch.max_concurrent, false)?;

            let progress = ProgressReporter::new_spinner("Fetching current snapshot...", false);
            let outcome = fetch_latest(&fetcher, reader, &archive, &staging).await?;
            progress.finish_with_message("Done");

            match outcome {
                LatestOutcome::Saved(key) => {
                    println!("Saved new snapshot {} to {}", key, archive.path_for(&key).display())
                }
                LatestOutcome::AlreadyHave(key) => {
                    println!("Snapshot {} is already archived, nothing to do", key)
                }
                LatestOutcome::Failed(reason) => println!("Fetch failed: {}", reason),
                LatestOutcome::Rejected(reason) => {
                    println!("Downloaded file has no readable timestamp: {}", reason)
                }
            }
        }

        Commands::Canonicalize {
            sources,
            dest,
            policy,
            max_workers,
            dry_run,
        } => {
            let policy = policy.unwrap_or(config.reconcile.policy);
            let dest = dest.unwrap_or_else(|| config.archive_dir.clone());
            canonicalize(&sources, &dest, policy, max_workers, dry_run)?;
        }

        Commands::Verify { sources, dest, json } => {
            let dest = dest.unwrap_or_else(|| config.archive_dir.clone());
            let listings: Vec<DirectoryListing> =
                sources.iter().map(DirectoryListing::new).collect();
            let refs: Vec<&dyn FileListing> =
                listings.iter().map(|l| l as &dyn FileListing).collect();

            let verifier = UnionVerifier::new();
            let audit = verifier.verify(&refs, &DirectoryListing::new(&dest))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&audit)?);
            } else {
                println!("{}", verifier.generate_summary(&audit));
                if audit.is_complete() {
                    println!("✅ Every source file is present in {}", dest.display());
                } else {
                    println!(
                        "⚠️  {} files missing from {}",
                        audit.total_missing(),
                        dest.display()
                    );
                }
            }
        }

        Commands::Manifest { archive, output } => {
            let archive_dir = archive.unwrap_or_else(|| config.archive_dir.clone());
            let output = output.unwrap_or_else(generate_default_manifest_filename);
            let archive = CanonicalArchive::open(&archive_dir)?;

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let rows = archive.write_manifest(&output)?;

            println!("Wrote {} entries to {}", rows, output.display());
            if let Some((first, last)) = archive.time_range()? {
                println!("Archive covers {} to {}", first, last);
            }
        }

        Commands::Query {
            files,
            date,
            hour,
            resolution,
        } => {
            let index = load_index(&files, config.render.max_resolution)?;
            print_index_overview(&index);

            match index.query(date, hour, resolution) {
                Ok(view) => {
                    println!("\nSlice {} {:02}:00 at level {}", date, hour, resolution);
                    println!("{}", describe_slice(view));
                }
                Err(e) if e.is_no_data() => println!("\nNo data: {}", e),
                Err(e) => return Err(e),
            }
        }

        Commands::Frames {
            archive,
            output,
            workers,
            scale_min,
            scale_max,
        } => {
            let archive_dir = archive.unwrap_or_else(|| config.archive_dir.clone());
            let workers = workers.unwrap_or(config.render.workers);
            let archive = CanonicalArchive::open(&archive_dir)?;
            let reader = default_reader()?;

            let progress = ProgressReporter::new_spinner("Reading time axes...", false);
            let (timelines, unreadable) = scan_timelines(&archive, reader.as_ref(), workers)?;
            let plan = plan_frames(&timelines);
            progress.set_message(&format!("Rendering {} frames...", plan.len()));

            let mut renderer = FrameRenderer::new(workers);
            if let (Some(min), Some(max)) = (scale_min, scale_max) {
                renderer = renderer.with_scale(LogScale::new(min, max));
            }
            let report = renderer.render(&plan, reader.as_ref(), &output)?;
            progress.finish_with_message(&format!("Rendered {} frames", report.rendered.len()));

            for (path, reason) in &unreadable {
                println!("Skipped {}: {}", path.display(), reason);
            }
            println!("\n{}", report.summary());
        }

        Commands::Animate {
            files,
            date,
            resolution,
            frames,
            speed,
            output,
        } => {
            let index = Arc::new(load_index(&files, config.render.max_resolution)?);
            let written = animate(
                index,
                &config,
                date,
                resolution,
                speed,
                frames,
                &output,
            )?;
            println!("Wrote {} frames to {}", written, output.display());
        }
    }

    Ok(())
}

fn build_fetcher(
    config: &AppConfig,
    max_concurrent: usize,
    skip_existing: bool,
) -> Result<Fetcher<HttpTransport>> {
    let transport = HttpTransport::new(config.fetch.request_timeout())?;
    Ok(
        Fetcher::new(Arc::new(transport), config.base_url.clone(), config.data_root.clone())
            .with_max_concurrent(max_concurrent)
            .with_skip_existing(skip_existing),
    )
}

async fn fetch_jobs(
    config: &AppConfig,
    jobs: Vec<FetchJob>,
    max_concurrent: usize,
    skip_existing: bool,
) -> Result<()> {
    let fetcher = build_fetcher(config, max_concurrent, skip_existing)?;

    let progress = ProgressReporter::new_spinner("Downloading forecasts...", false);
    let report = fetcher.fetch_all(jobs).await;
    progress.finish_with_message(&format!(
        "Downloaded {}, skipped {}, failed {}",
        report.downloaded(),
        report.skipped(),
        report.failures().len()
    ));

    println!("\n{}", report.summary());
    Ok(())
}

fn canonicalize(
    sources: &[PathBuf],
    dest: &Path,
    policy: CollisionPolicy,
    max_workers: usize,
    dry_run: bool,
) -> Result<()> {
    println!("Reconciling {} sources with policy '{}'", sources.len(), policy);
    for (i, source) in sources.iter().enumerate() {
        println!("  {}. {}", i + 1, source.display());
    }

    let reader = default_reader()?;
    let providers: Vec<DirectoryProvider> = sources
        .iter()
        .map(|dir| {
            DirectoryProvider::new(dir, reader.clone())
                .with_workers(max_workers)
                .with_progress(true)
        })
        .collect();
    let refs: Vec<&dyn ArtifactProvider> = providers
        .iter()
        .map(|p| p as &dyn ArtifactProvider)
        .collect();

    let outcome = Reconciler::new(policy).reconcile(&refs)?;
    println!("\n{}", outcome.summary());

    if dry_run {
        println!("Dry run - nothing copied to {}", dest.display());
        return Ok(());
    }

    let archive = CanonicalArchive::open(dest)?;
    let report = archive.materialize(&outcome)?;
    println!("{}", report.summary());
    Ok(())
}

fn load_index(files: &[PathBuf], max_level: Option<u32>) -> Result<QueryIndex> {
    let reader = default_reader()?;
    let progress = ProgressReporter::new(files.len() as u64, "Reading datasets...", false);

    let datasets = files
        .iter()
        .map(|file| {
            let dataset = reader.read_dataset(file);
            progress.increment(1);
            dataset
        })
        .collect::<Result<Vec<DispersionDataset>>>()?;
    progress.finish_with_message(&format!("Read {} datasets", datasets.len()));

    QueryIndex::build_with_max_level(datasets, max_level)
}

fn print_index_overview(index: &QueryIndex) {
    let geometry = index.geometry();
    let [min_lon, max_lon, min_lat, max_lat] = geometry.extent();
    let (min_x, min_y) = to_web_mercator(min_lat, min_lon);
    let (max_x, max_y) = to_web_mercator(max_lat, max_lon);

    println!("Grid: {} rows x {} cols", geometry.nrows, geometry.ncols);
    println!(
        "Extent: lon {:.3}..{:.3}, lat {:.3}..{:.3}",
        min_lon, max_lon, min_lat, max_lat
    );
    println!(
        "Web Mercator: x {:.0}..{:.0}, y {:.0}..{:.0}",
        min_x, max_x, min_y, max_y
    );
    if let Some((first, last)) = index.time_range() {
        println!("Hours: {} ({} to {})", index.times().len(), first, last);
    }
    println!("Resolution levels: 0..={}", index.max_resolution());
}

fn describe_slice(view: ArrayView2<'_, f32>) -> String {
    let (rows, cols) = view.dim();
    let finite: Vec<f32> = view.iter().copied().filter(|v| v.is_finite()).collect();
    let positive = finite.iter().filter(|v| **v > 0.0).count();

    if finite.is_empty() {
        return format!("{} x {} cells, no finite values", rows, cols);
    }

    let min = finite.iter().copied().fold(f32::INFINITY, f32::min);
    let max = finite.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = finite.iter().map(|v| *v as f64).sum::<f64>() / finite.len() as f64;

    format!(
        "{} x {} cells, {} with smoke\nPM2.5 min {:.3}, mean {:.3}, max {:.3} ug/m3",
        rows, cols, positive, min, mean, max
    )
}

/// Run the dispatcher with playback on and write every frame it displays.
fn animate(
    index: Arc<QueryIndex>,
    config: &AppConfig,
    date: Option<NaiveDate>,
    resolution: u32,
    speed: PlaybackSpeed,
    frames: usize,
    output: &Path,
) -> Result<usize> {
    if frames == 0 {
        info!(output = %output.display(), "No frames requested");
        return Ok(0);
    }

    fs::create_dir_all(output)?;

    let mut dispatcher = Dispatcher::new(index, config.dashboard.playback_interval())?;
    let sender = dispatcher.sender();
    let mut events = vec![Event::SetResolution(resolution), Event::SetSpeed(speed)];
    if let Some(date) = date {
        events.insert(0, Event::SetDate(date));
    }
    events.push(Event::TogglePlayback);
    for event in events {
        sender.send(event).map_err(|_| ArchiveError::Cancelled)?;
    }

    let progress = ProgressReporter::new(frames as u64, "Playing...", false);
    let mut written = 0usize;
    let mut shown = 0usize;
    let mut failure: Option<ArchiveError> = None;

    dispatcher.run(|frame| {
        match &frame.data {
            Ok(data) => {
                let path = output.join(frame_file_name(written));
                let scale = LogScale::from_values(data.view());
                if let Err(e) = render_raster(data.view(), &scale).save(&path) {
                    failure = Some(e.into());
                    return false;
                }
                written += 1;
            }
            Err(e) => warn!(timestamp = %frame.timestamp, error = %e, "Nothing to display"),
        }
        shown += 1;
        progress.update(shown as u64);
        shown < frames
    })?;

    if let Some(e) = failure {
        return Err(e);
    }

    progress.finish_with_message(&format!("Captured {} frames", written));
    info!(written, shown, output = %output.display(), "Animation finished");
    Ok(written)
}
