//! Operator-facing side of the loop: per-pair display and the cancellation poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::skew::SkewSample;
use crate::{Frame, Result};

/// Shared cancellation flag, typically set from a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Monitor {
    /// Called once per processed pair with its index, skew and the fresh composite.
    fn present(&mut self, index: u64, skew: SkewSample, composite: &Frame) -> Result<()>;

    /// Non-blocking check for an operator stop request.
    fn cancel_requested(&mut self) -> bool;

    /// Tear down any display resources.
    fn close(&mut self) {}
}

/// Prints the per-pair skew line; cancellation comes from a [`CancelToken`].
pub struct ConsoleMonitor {
    cancel: CancelToken,
}

impl ConsoleMonitor {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }
}

impl Monitor for ConsoleMonitor {
    fn present(&mut self, index: u64, skew: SkewSample, composite: &Frame) -> Result<()> {
        println!("Image {index}: Time difference between camera1 and camera2: {skew} ms");
        debug!(
            index,
            width = composite.width,
            height = composite.height,
            "composite updated"
        );
        Ok(())
    }

    fn cancel_requested(&mut self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// HighGUI window preview; `q` in the window or the token stops the session.
#[cfg(feature = "opencv")]
pub struct HighGuiMonitor {
    window: String,
    cancel: CancelToken,
    console: ConsoleMonitor,
}

#[cfg(feature = "opencv")]
impl HighGuiMonitor {
    pub fn new(window: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            window: window.into(),
            console: ConsoleMonitor::new(cancel.clone()),
            cancel,
        }
    }
}

#[cfg(feature = "opencv")]
impl Monitor for HighGuiMonitor {
    fn present(&mut self, index: u64, skew: SkewSample, composite: &Frame) -> Result<()> {
        use opencv::highgui;

        self.console.present(index, skew, composite)?;
        let mat = crate::opencv_backend::frame_to_mat(composite)?;
        highgui::imshow(&self.window, &mat)
            .map_err(|e| crate::Error::Backend(e.to_string()))?;
        Ok(())
    }

    fn cancel_requested(&mut self) -> bool {
        let key = opencv::highgui::wait_key(1).unwrap_or(-1);
        (key >= 0 && (key & 0xFF) as u8 == b'q') || self.cancel.is_cancelled()
    }

    fn close(&mut self) {
        let _ = opencv::highgui::destroy_all_windows();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancelToken::new();
        let mut monitor = ConsoleMonitor::new(token.clone());
        assert!(!monitor.cancel_requested());
        token.cancel();
        assert!(monitor.cancel_requested());
    }
}
