//! vision-sync: lock-step dual camera acquisition
//!
//! Grabs one frame from each of two cameras per iteration, stamps both with a
//! capture time, measures the skew between the stamps, and persists the frames
//! together with a growing per-camera mosaic and a side-by-side composite. The
//! default build enables a `mock` backend; real devices go through the
//! feature-gated OpenCV backend.

mod types;
pub use types::{Frame, PixelFormat};

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::{
    BufferId, CaptureSource, DeviceInfo, GrabResult, GrabStatus, GrabStrategy, SourceFactory,
};

pub mod config;
pub mod source;
pub mod stamp;
pub mod skew;
pub mod mosaic;
pub mod composite;
pub mod io;
pub mod monitor;
pub mod session;

pub use config::{AcquisitionProfile, SessionConfig};
pub use session::{Outcome, Session, SessionReport, SessionState};

#[cfg(feature = "mock")]
pub mod mock;
#[cfg(feature = "mock")]
pub use mock::{MockCamera, MockConfig, MockFactory};

#[cfg(feature = "opencv")]
mod opencv_backend;
#[cfg(feature = "opencv")]
pub use opencv_backend::{OpenCvCamera, OpenCvFactory};
