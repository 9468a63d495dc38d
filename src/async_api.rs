use crate::flow::{CaptureFlow, CaptureReport};
use crate::store::SavedDesignEntry;
use crate::{CaptureConfig, Error, Result};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Capture {
        url: String,
        save_later: bool,
        resp: oneshot::Sender<Result<CaptureReport>>,
    },
    ListSaved(oneshot::Sender<Result<Vec<SavedDesignEntry>>>),
    Associate {
        order_id: String,
        design_id: Option<String>,
        resp: oneshot::Sender<Result<String>>,
    },
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly capture facade backed by a dedicated worker thread.
///
/// The worker thread owns a synchronous [`CaptureFlow`] and executes
/// commands sent from async tasks, so callers get an async interface
/// without the flow itself needing to be `Send` across threads. Captures
/// are serialized in command order; one storefront session never runs
/// two at once.
#[derive(Clone)]
pub struct Assist {
    cmd_tx: Sender<Command>,
}

impl Assist {
    /// Create a new facade, spawning the worker thread that owns the flow.
    pub async fn new(config: CaptureConfig) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::spawn(move || {
            // Build the flow on the worker thread
            let mut flow = match CaptureFlow::new(config) {
                Ok(f) => f,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok(()));

            // Command loop
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Capture {
                        url,
                        save_later,
                        resp,
                    } => {
                        let res = flow.run(&url, save_later);
                        let _ = resp.send(res);
                    }
                    Command::ListSaved(resp) => {
                        let res = flow.saved_designs();
                        let _ = resp.send(res);
                    }
                    Command::Associate {
                        order_id,
                        design_id,
                        resp,
                    } => {
                        let res = flow.associate_order(&order_id, design_id.as_deref());
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let res = flow.close();
                        let _ = resp.send(res);
                        break;
                    }
                }
            }
        });

        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker thread init canceled: {}", e)))?;
        init_res?;

        Ok(Self { cmd_tx })
    }

    /// Capture the design on `url` and publish it.
    pub async fn capture(&self, url: &str) -> Result<CaptureReport> {
        self.send_capture(url, false).await
    }

    /// Capture the design on `url` straight into the local save queue.
    pub async fn capture_save_later(&self, url: &str) -> Result<CaptureReport> {
        self.send_capture(url, true).await
    }

    /// Designs currently in the save-for-later queue.
    pub async fn saved_designs(&self) -> Result<Vec<SavedDesignEntry>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ListSaved(tx))
            .map_err(|_| Error::Other("Worker thread gone".to_string()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Worker dropped response: {}", e)))?
    }

    /// Bind a saved design to a storefront order. Returns the design id
    /// that was associated.
    pub async fn associate_order(
        &self,
        order_id: &str,
        design_id: Option<&str>,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Associate {
                order_id: order_id.to_string(),
                design_id: design_id.map(str::to_string),
                resp: tx,
            })
            .map_err(|_| Error::Other("Worker thread gone".to_string()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Worker dropped response: {}", e)))?
    }

    /// Shut the worker down, releasing any local artifacts.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Close(tx))
            .map_err(|_| Error::Other("Worker thread gone".to_string()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Worker dropped response: {}", e)))?
    }

    async fn send_capture(&self, url: &str, save_later: bool) -> Result<CaptureReport> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Capture {
                url: url.to_string(),
                save_later,
                resp: tx,
            })
            .map_err(|_| Error::Other("Worker thread gone".to_string()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Worker dropped response: {}", e)))?
    }
}
