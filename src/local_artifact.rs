//! Client-only artifact strategy.
//!
//! Captures become PNG blobs in a per-producer directory. Every blob is
//! tracked by handle and released either when a newer capture replaces
//! it, explicitly, or at close; nothing outlives the producer.

use crate::error::{Error, Result};
use crate::render::DesignImage;
use crate::snapshot::DesignSnapshot;
use crate::tracking::TrackingCode;
use crate::{
    Artifact, ArtifactLink, ArtifactProducer, ArtifactStatus, BlobHandle, CaptureConfig,
};
use chrono::Utc;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process;

const PREVIEW_WIDTH: u32 = 300;

/// Produces session-scoped PNG blobs.
pub struct LocalBlobProducer {
    session_dir: PathBuf,
    next_id: u64,
    live: HashMap<u64, Vec<PathBuf>>,
    current: Option<u64>,
}

impl LocalBlobProducer {
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        let session_dir = config.data_dir.join("artifacts").join(format!(
            "session-{}-{}",
            process::id(),
            Utc::now().timestamp_millis()
        ));
        fs::create_dir_all(&session_dir)
            .map_err(|e| Error::InitializationError(format!("{}: {}", session_dir.display(), e)))?;
        debug!("Local artifacts under {}", session_dir.display());
        Ok(Self {
            session_dir,
            next_id: 1,
            live: HashMap::new(),
            current: None,
        })
    }

    pub fn session_dir(&self) -> &PathBuf {
        &self.session_dir
    }

    /// Blobs currently held.
    pub fn live_blobs(&self) -> usize {
        self.live.len()
    }

    fn release_id(&mut self, id: u64) {
        if let Some(paths) = self.live.remove(&id) {
            for path in paths {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Releasing blob {}: {}", path.display(), e);
                }
            }
            debug!("Released blob handle {}", id);
        }
    }

    fn sweep(&mut self) {
        let ids: Vec<u64> = self.live.keys().copied().collect();
        for id in ids {
            self.release_id(id);
        }
        self.current = None;
        if self.session_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.session_dir) {
                warn!("Removing {}: {}", self.session_dir.display(), e);
            }
        }
    }
}

impl ArtifactProducer for LocalBlobProducer {
    fn name(&self) -> &'static str {
        "local-blob"
    }

    fn produce(
        &mut self,
        snapshot: &DesignSnapshot,
        code: &TrackingCode,
        canvas: Option<&DesignImage>,
    ) -> Result<Artifact> {
        let image = match canvas {
            Some(image) => image.clone(),
            None => DesignImage::placeholder(snapshot),
        };

        let png = image.to_png()?;
        let digest = hex::encode(Sha256::digest(&png));

        let path = self.session_dir.join(format!("{}.png", code.file_stem()));
        fs::write(&path, &png)
            .map_err(|e| Error::StorageError(format!("{}: {}", path.display(), e)))?;

        let preview_path = self
            .session_dir
            .join(format!("{}-preview.png", code.file_stem()));
        let preview = image.preview(PREVIEW_WIDTH).to_png()?;
        fs::write(&preview_path, preview)
            .map_err(|e| Error::StorageError(format!("{}: {}", preview_path.display(), e)))?;

        // A newer capture replaces the one on display; the old blob goes
        // away with it.
        if let Some(previous) = self.current.take() {
            self.release_id(previous);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, vec![path.clone(), preview_path]);
        self.current = Some(id);

        info!(
            "Produced local artifact {} ({} bytes, {} pieces)",
            path.display(),
            png.len(),
            snapshot.total_pieces
        );

        Ok(Artifact {
            tracking_code: code.as_str().to_string(),
            link: ArtifactLink::Local(BlobHandle {
                id,
                url: format!("file://{}", path.display()),
                path,
            }),
            status: ArtifactStatus::Generated,
            design_id: None,
            digest: Some(digest),
        })
    }

    fn release(&mut self, artifact: &Artifact) -> Result<()> {
        if let ArtifactLink::Local(handle) = &artifact.link {
            if self.current == Some(handle.id) {
                self.current = None;
            }
            self.release_id(handle.id);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sweep();
        Ok(())
    }
}

impl Drop for LocalBlobProducer {
    fn drop(&mut self) {
        self.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::DesignConfig;
    use std::collections::BTreeMap;

    fn snapshot() -> DesignSnapshot {
        let mut pieces = BTreeMap::new();
        pieces.insert("Red".to_string(), 12);
        pieces.insert("Blue".to_string(), 8);
        DesignSnapshot::new("vb_test", pieces, DesignConfig::default())
    }

    fn code() -> TrackingCode {
        crate::tracking::IdGenerator::new(None).tracking_code()
    }

    fn producer(dir: &std::path::Path) -> LocalBlobProducer {
        let config = CaptureConfig {
            data_dir: dir.to_path_buf(),
            ..Default::default()
        };
        LocalBlobProducer::new(&config).unwrap()
    }

    #[test]
    fn test_produce_writes_png_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = producer(dir.path());

        let artifact = producer.produce(&snapshot(), &code(), None).unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Generated);
        assert!(artifact.design_id.is_none());
        assert_eq!(artifact.digest.as_ref().map(String::len), Some(64));

        match &artifact.link {
            ArtifactLink::Local(handle) => {
                assert!(handle.path.exists());
                assert!(handle.url.starts_with("file://"));
                let bytes = fs::read(&handle.path).unwrap();
                assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
            }
            other => panic!("expected local link, got {:?}", other),
        }
        assert_eq!(producer.live_blobs(), 1);
    }

    #[test]
    fn test_replacement_releases_previous_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = producer(dir.path());

        let mut ids = crate::tracking::IdGenerator::new(None);
        let first = producer.produce(&snapshot(), &ids.tracking_code(), None).unwrap();
        let second = producer.produce(&snapshot(), &ids.tracking_code(), None).unwrap();

        let first_path = match &first.link {
            ArtifactLink::Local(h) => h.path.clone(),
            _ => unreachable!(),
        };
        let second_path = match &second.link {
            ArtifactLink::Local(h) => h.path.clone(),
            _ => unreachable!(),
        };

        assert!(!first_path.exists());
        assert!(second_path.exists());
        assert_eq!(producer.live_blobs(), 1);
    }

    #[test]
    fn test_release_and_close_leave_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = producer(dir.path());
        let session_dir = producer.session_dir().clone();

        let artifact = producer.produce(&snapshot(), &code(), None).unwrap();
        producer.release(&artifact).unwrap();
        assert_eq!(producer.live_blobs(), 0);

        producer.close().unwrap();
        assert!(!session_dir.exists());
    }

    #[test]
    fn test_canvas_image_is_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = producer(dir.path());

        let canvas = DesignImage::placeholder(&snapshot());
        let with_canvas = producer
            .produce(&snapshot(), &code(), Some(&canvas))
            .unwrap();
        assert_eq!(
            with_canvas.digest,
            Some(hex::encode(Sha256::digest(canvas.to_png().unwrap())))
        );
    }
}
