//! Clipboard publishing with a manual-copy fallback.
//!
//! The share text goes to the system clipboard when a clipboard utility
//! exists on PATH; otherwise it is spooled to a file the user can copy
//! from. Publishing never fails the capture that produced the text.

use crate::error::{Error, Result};
use log::{debug, warn};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const SPOOL_FILE: &str = "clipboard.txt";

/// Clipboard utilities probed in order. First hit wins.
const CLIPBOARD_TOOLS: &[(&str, &[&str])] = &[
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
    ("pbcopy", &[]),
    ("clip", &[]),
];

/// Where a publish attempt landed. Degradation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The system clipboard took the text.
    Copied,
    /// The text was spooled to a file for manual copying.
    CopiedFallback { path: PathBuf },
    /// Neither the clipboard nor the spool file worked.
    Failed,
}

/// A clipboard writer.
pub trait ClipboardBackend {
    fn name(&self) -> &str;
    fn write_text(&mut self, text: &str) -> Result<()>;
}

/// Writes through the first clipboard utility found on PATH.
pub struct SystemClipboard {
    tool: Option<(&'static str, &'static [&'static str])>,
}

impl SystemClipboard {
    pub fn detect() -> Self {
        let tool = CLIPBOARD_TOOLS
            .iter()
            .find(|(bin, _)| find_in_path(bin).is_some())
            .copied();
        match tool {
            Some((bin, _)) => debug!("Clipboard utility: {}", bin),
            None => debug!("No clipboard utility on PATH"),
        }
        Self { tool }
    }
}

impl ClipboardBackend for SystemClipboard {
    fn name(&self) -> &str {
        self.tool.map(|(bin, _)| bin).unwrap_or("none")
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let (bin, args) = self
            .tool
            .ok_or_else(|| Error::Other("no clipboard utility on PATH".to_string()))?;

        let mut child = Command::new(bin)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Other(format!("spawn {}: {}", bin, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| Error::Other(format!("write to {}: {}", bin, e)))?;
        }

        let status = child
            .wait()
            .map_err(|e| Error::Other(format!("wait for {}: {}", bin, e)))?;
        if !status.success() {
            return Err(Error::Other(format!("{} exited with {}", bin, status)));
        }
        Ok(())
    }
}

fn find_in_path(bin: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

/// Publishes share text, degrading from the clipboard to a spool file.
pub struct ClipboardPublisher {
    backend: Box<dyn ClipboardBackend>,
    spool_path: PathBuf,
}

impl ClipboardPublisher {
    pub fn new(data_dir: &Path) -> Self {
        Self::with_backend(Box::new(SystemClipboard::detect()), data_dir)
    }

    pub fn with_backend(backend: Box<dyn ClipboardBackend>, data_dir: &Path) -> Self {
        Self {
            backend,
            spool_path: data_dir.join(SPOOL_FILE),
        }
    }

    /// Publish `text`. Never returns an error; every failure degrades to
    /// the next mechanism and the outcome says where the text ended up.
    pub fn publish(&mut self, text: &str) -> CopyOutcome {
        match self.backend.write_text(text) {
            Ok(()) => {
                debug!("Copied {} bytes via {}", text.len(), self.backend.name());
                CopyOutcome::Copied
            }
            Err(e) => {
                warn!("Clipboard write via {} failed: {}", self.backend.name(), e);
                self.spool(text)
            }
        }
    }

    fn spool(&self, text: &str) -> CopyOutcome {
        if let Some(parent) = self.spool_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Spool dir {}: {}", parent.display(), e);
                return CopyOutcome::Failed;
            }
        }
        match fs::write(&self.spool_path, text) {
            Ok(()) => CopyOutcome::CopiedFallback {
                path: self.spool_path.clone(),
            },
            Err(e) => {
                warn!("Spool write {}: {}", self.spool_path.display(), e);
                CopyOutcome::Failed
            }
        }
    }
}
