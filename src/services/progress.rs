//! Progress reporting for long-running admin operations.

use tokio::sync::mpsc::UnboundedSender;

use crate::models::admin::ProgressUpdate;

pub trait ProgressReporter: Send + Sync {
    fn report(&self, step: &str, percent: u8);
}

/// Discards updates. Used by bulk runs and the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _step: &str, _percent: u8) {}
}

/// Feeds a server-sent event stream. A closed stream means the client went
/// away; the operation carries on regardless.
impl ProgressReporter for UnboundedSender<ProgressUpdate> {
    fn report(&self, step: &str, percent: u8) {
        let _ = self.send(ProgressUpdate::step(step, percent));
    }
}
