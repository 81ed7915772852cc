use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::archive::CanonicalArchive;
use crate::error::{ArchiveError, Result};
use crate::models::{DispersionDataset, PackedTimestamp};
use crate::processors::build_pool;
use crate::readers::DispersionReader;
use crate::render::colormap::{render_raster, LogScale};
use crate::utils::filename::frame_file_name;

/// The decoded time axis of one archive file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTimeline {
    pub path: PathBuf,
    pub key: PackedTimestamp,
    pub times: Vec<NaiveDateTime>,
}

/// One output frame: which timestep of which file to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCall {
    pub frame_number: usize,
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub tstep: usize,
}

/// Every timestamp covered by any file, drawn from the newest file (by canonical key)
/// that contains it. Frames are numbered chronologically from 0.
pub fn plan_frames(timelines: &[FileTimeline]) -> Vec<FrameCall> {
    let mut chosen: BTreeMap<NaiveDateTime, (PackedTimestamp, usize, usize)> = BTreeMap::new();

    for (file, timeline) in timelines.iter().enumerate() {
        for (tstep, time) in timeline.times.iter().enumerate() {
            match chosen.get(time) {
                Some((key, _, _)) if *key >= timeline.key => {}
                _ => {
                    chosen.insert(*time, (timeline.key, file, tstep));
                }
            }
        }
    }

    chosen
        .into_iter()
        .enumerate()
        .map(|(frame_number, (timestamp, (_, file, tstep)))| FrameCall {
            frame_number,
            path: timelines[file].path.clone(),
            timestamp,
            tstep,
        })
        .collect()
}

/// Read the time axis of every file in the archive. Files whose `TFLAG` cannot be
/// read are returned separately as `(file, reason)`.
pub fn scan_timelines(
    archive: &CanonicalArchive,
    reader: &dyn DispersionReader,
    workers: usize,
) -> Result<(Vec<FileTimeline>, Vec<(PathBuf, String)>)> {
    let keys: Vec<(PackedTimestamp, PathBuf)> = archive.keys()?.into_iter().collect();
    let pool = build_pool(workers)?;

    let scanned: Vec<std::result::Result<FileTimeline, (PathBuf, String)>> = pool.install(|| {
        keys.par_iter()
            .map(|(key, path)| {
                reader
                    .read_tflags(path)
                    .and_then(|tflags| tflags.iter().map(|t| t.decode()).collect::<Result<Vec<_>>>())
                    .map(|times| FileTimeline {
                        path: path.clone(),
                        key: *key,
                        times,
                    })
                    .map_err(|e| (path.clone(), e.to_string()))
            })
            .collect()
    });

    let mut timelines = Vec::new();
    let mut unreadable = Vec::new();
    for entry in scanned {
        match entry {
            Ok(timeline) => timelines.push(timeline),
            Err((path, reason)) => {
                warn!(file = %path.display(), reason = %reason, "Skipping file without a readable time axis");
                unreadable.push((path, reason));
            }
        }
    }
    Ok((timelines, unreadable))
}

#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub rendered: Vec<PathBuf>,
    /// Frames that could not be drawn, by timestamp.
    pub issues: BTreeMap<NaiveDateTime, String>,
}

impl FrameReport {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Rendered {} frames, {} issues\n",
            self.rendered.len(),
            self.issues.len()
        );
        for (timestamp, issue) in &self.issues {
            summary.push_str(&format!("  {}: {}\n", timestamp, issue));
        }
        summary
    }
}

/// Draws planned frames as PNG images on a worker pool.
///
/// Each file is opened once for all of its frames. A failure affects only the
/// frames it touches and is recorded as an issue.
pub struct FrameRenderer {
    workers: usize,
    scale: Option<LogScale>,
}

impl FrameRenderer {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            scale: None,
        }
    }

    /// A fixed colour range instead of one fitted per frame.
    pub fn with_scale(mut self, scale: LogScale) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn render(
        &self,
        plan: &[FrameCall],
        reader: &dyn DispersionReader,
        output_dir: &Path,
    ) -> Result<FrameReport> {
        fs::create_dir_all(output_dir)?;

        let mut by_file: BTreeMap<&Path, Vec<&FrameCall>> = BTreeMap::new();
        for call in plan {
            by_file.entry(call.path.as_path()).or_default().push(call);
        }
        let groups: Vec<(&Path, Vec<&FrameCall>)> = by_file.into_iter().collect();

        let pool = build_pool(self.workers)?;
        let results: Vec<(NaiveDateTime, std::result::Result<PathBuf, String>)> = pool.install(|| {
            groups
                .par_iter()
                .flat_map_iter(|(path, calls)| self.render_file(path, calls, reader, output_dir))
                .collect()
        });

        let mut report = FrameReport::default();
        for (timestamp, result) in results {
            match result {
                Ok(path) => report.rendered.push(path),
                Err(issue) => {
                    warn!(timestamp = %timestamp, issue = %issue, "Frame not rendered");
                    report.issues.insert(timestamp, issue);
                }
            }
        }
        report.rendered.sort();

        info!(
            rendered = report.rendered.len(),
            issues = report.issues.len(),
            output = %output_dir.display(),
            "Frame rendering finished"
        );
        Ok(report)
    }

    fn render_file(
        &self,
        path: &Path,
        calls: &[&FrameCall],
        reader: &dyn DispersionReader,
        output_dir: &Path,
    ) -> Vec<(NaiveDateTime, std::result::Result<PathBuf, String>)> {
        let dataset = match reader.read_dataset(path) {
            Ok(dataset) => dataset,
            Err(e) => {
                let issue = format!("{}: {}", path.display(), e);
                return calls.iter().map(|c| (c.timestamp, Err(issue.clone()))).collect();
            }
        };

        calls
            .iter()
            .map(|call| {
                let result = self.render_frame(&dataset, call, output_dir);
                (call.timestamp, result.map_err(|e| e.to_string()))
            })
            .collect()
    }

    fn render_frame(
        &self,
        dataset: &DispersionDataset,
        call: &FrameCall,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        if call.tstep >= dataset.timesteps() {
            return Err(ArchiveError::MissingData(format!(
                "timestep {} of {}",
                call.tstep,
                call.path.display()
            )));
        }

        let slice = dataset.slice(call.tstep);
        let scale = self.scale.unwrap_or_else(|| LogScale::from_values(slice));
        let output = output_dir.join(frame_file_name(call.frame_number));
        render_raster(slice, &scale).save(&output)?;
        Ok(output)
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
