//! Scene file I/O against the in-memory file table.

use std::path::Path;

use log::info;

use rigbridge_core::{BatchHost, ExportFormat, HostError};

use crate::curve::TransformCurve;
use crate::document::{ClipDocument, ExportDocument, SceneDocument};
use crate::scene::SimScene;

fn rejected(err: anyhow::Error) -> HostError {
    HostError::Rejected(format!("{err:#}"))
}

impl SimScene {
    fn read_file(&self, path: &Path) -> Result<&str, HostError> {
        self.file(path)
            .ok_or_else(|| HostError::Rejected(format!("no file at {}", path.display())))
    }
}

impl BatchHost for SimScene {
    fn open_scene(&mut self, path: &Path) -> Result<(), HostError> {
        let doc = SceneDocument::from_json(self.read_file(path)?).map_err(rejected)?;
        self.load_document(&doc)?;
        info!("opened {}", path.display());
        Ok(())
    }

    /// All tracks are resolved before any curve is replaced.
    fn import_clip(&mut self, path: &Path) -> Result<(), HostError> {
        let clip = ClipDocument::from_json(self.read_file(path)?).map_err(rejected)?;
        let mut curves = Vec::with_capacity(clip.tracks.len());
        for track in &clip.tracks {
            let node = self.handle_of(&track.node)?;
            let mut curve = TransformCurve::new();
            for key in &track.keys {
                curve.insert(key.into());
            }
            curves.push((node, curve));
        }
        for (node, curve) in curves {
            self.node_mut(node)?.curve = curve;
        }
        if let Some(range) = clip.range {
            self.playback = range;
        }
        self.evaluate();
        info!("imported {} tracks from {}", clip.tracks.len(), path.display());
        Ok(())
    }

    fn export_scene(
        &mut self,
        path: &Path,
        format: ExportFormat,
        selection: &[String],
    ) -> Result<(), HostError> {
        let doc = ExportDocument {
            format,
            scene: self.export_document(selection)?,
        };
        let text = doc.to_json().map_err(rejected)?;
        self.put_file(path, text);
        Ok(())
    }
}
