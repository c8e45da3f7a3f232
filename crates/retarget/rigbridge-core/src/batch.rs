//! Batch bake and export.
//!
//! Each clip gets a fresh session: open the connection rig, import the clip, rediscover the
//! connections, bake over the playback range and export. One clip failing never stops the
//! others.

use std::path::{Path, PathBuf};

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::bake::BakeReport;
use crate::config::RetargetConfig;
use crate::error::{HostError, RetargetError, Result};
use crate::host::Host;
use crate::retargeter::Retargeter;

/// Scene file I/O on top of the regular host collaborators.
pub trait BatchHost: Host {
    /// Replace the current scene with the one stored at `path`.
    fn open_scene(&mut self, path: &Path) -> std::result::Result<(), HostError>;

    /// Load animation from `path` onto the matching nodes of the open scene.
    fn import_clip(&mut self, path: &Path) -> std::result::Result<(), HostError>;

    /// Write the open scene to `path`. An empty `selection` exports every node.
    fn export_scene(
        &mut self,
        path: &Path,
        format: ExportFormat,
        selection: &[String],
    ) -> std::result::Result<(), HostError>;
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Fbx,
    MayaAscii,
}

impl ExportFormat {
    /// File extension, without the dot.
    pub fn ext(&self) -> &'static str {
        match self {
            Self::Fbx => "fbx",
            Self::MayaAscii => "ma",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchJob {
    /// Scene holding the rig and its connection markers.
    pub rig_path: PathBuf,
    pub clips: Vec<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub format: ExportFormat,
    /// Nodes to export; empty exports the whole scene.
    #[serde(default)]
    pub selection: Vec<String>,
}

impl BatchJob {
    pub fn validate(&self) -> Result<()> {
        if self.rig_path.as_os_str().is_empty() {
            return Err(RetargetError::InvalidBatch {
                reason: "no rig file given".into(),
            });
        }
        if self.clips.is_empty() {
            return Err(RetargetError::InvalidBatch {
                reason: "no clips given".into(),
            });
        }
        Ok(())
    }

    /// `<output_dir>/<clip stem>.<ext>`
    pub fn output_path(&self, clip: &Path) -> Option<PathBuf> {
        let stem = clip.file_stem()?;
        let name = format!("{}.{}", stem.to_string_lossy(), self.format.ext());
        Some(self.output_dir.join(name))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClipOutcome {
    Exported { output: PathBuf, report: BakeReport },
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClipResult {
    pub clip: PathBuf,
    pub outcome: ClipOutcome,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<ClipResult>,
}

impl BatchReport {
    pub fn exported(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ClipOutcome::Exported { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.exported()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Sent before each clip starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchProgress {
    pub clip: PathBuf,
    pub index: usize,
    pub total: usize,
}

pub fn run_batch<H>(host: &mut H, job: &BatchJob, cfg: &RetargetConfig) -> Result<BatchReport>
where
    H: BatchHost + ?Sized,
{
    run_batch_with_progress(host, job, cfg, &mut |_| {})
}

pub fn run_batch_with_progress<H>(
    host: &mut H,
    job: &BatchJob,
    cfg: &RetargetConfig,
    progress: &mut dyn FnMut(&BatchProgress),
) -> Result<BatchReport>
where
    H: BatchHost + ?Sized,
{
    job.validate()?;
    info!(
        "batch: {} clips onto {} -> {}",
        job.clips.len(),
        job.rig_path.display(),
        job.output_dir.display()
    );

    let mut report = BatchReport::default();
    for (index, clip) in job.clips.iter().enumerate() {
        progress(&BatchProgress {
            clip: clip.clone(),
            index,
            total: job.clips.len(),
        });
        let outcome = match bake_clip(host, job, cfg, clip) {
            Ok((output, bake)) => ClipOutcome::Exported {
                output,
                report: bake,
            },
            Err(err) => {
                error!("batch clip {} failed: {err}", clip.display());
                ClipOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        report.results.push(ClipResult {
            clip: clip.clone(),
            outcome,
        });
    }
    info!(
        "batch done: {} exported, {} failed",
        report.exported(),
        report.failed()
    );
    Ok(report)
}

fn bake_clip<H>(
    host: &mut H,
    job: &BatchJob,
    cfg: &RetargetConfig,
    clip: &Path,
) -> Result<(PathBuf, BakeReport)>
where
    H: BatchHost + ?Sized,
{
    let output = job
        .output_path(clip)
        .ok_or_else(|| RetargetError::InvalidBatch {
            reason: format!("clip path {} has no file name", clip.display()),
        })?;

    host.open_scene(&job.rig_path)?;
    host.import_clip(clip)?;

    let mut session = Retargeter::new(cfg.clone());
    let found = session.refresh(&*host)?;
    if let Some(err) = found.skipped.into_iter().next() {
        return Err(err);
    }
    let bake = session.bake(host, None)?;
    if !bake.write_failures.is_empty() {
        return Err(RetargetError::Host {
            reason: format!("{} keys could not be written", bake.write_failures.len()),
        });
    }

    host.export_scene(&output, job.format, &job.selection)?;
    info!("exported {}", output.display());
    Ok((output, bake))
}
