use crate::config::AcquisitionProfile;
use crate::{Frame, Result};

/// One enumerated physical device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub driver: String,
}

/// Buffer handling policy once streaming starts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GrabStrategy {
    /// Keep only the newest frame; older unconsumed frames are dropped.
    #[default]
    LatestFrameOnly,
    /// Deliver frames in the order they were captured.
    OneByOne,
}

/// Opaque handle for an SDK-owned buffer that must be handed back via `release`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BufferId(pub u64);

#[derive(Debug)]
pub enum GrabStatus {
    Succeeded(Frame),
    /// The device returned a result but the image is unusable (e.g. dropped packets).
    Incomplete(String),
}

#[derive(Debug)]
pub struct GrabResult {
    pub buffer: BufferId,
    pub status: GrabStatus,
}

/// Device discovery, analogous to a transport-layer factory.
pub trait SourceFactory {
    type Source: CaptureSource;

    /// List attached devices in a stable order.
    fn enumerate(&self) -> Result<Vec<DeviceInfo>>;

    /// Bind a source to a previously enumerated device. The source is not opened yet.
    fn create(&self, device: &DeviceInfo) -> Result<Self::Source>;
}

/// A blocking frame source with an explicit stream lifecycle.
pub trait CaptureSource {
    fn info(&self) -> &DeviceInfo;

    fn open(&mut self) -> Result<()>;

    /// Load an acquisition profile. Must be called before streaming starts.
    fn configure(&mut self, profile: &AcquisitionProfile) -> Result<()>;

    fn start_streaming(&mut self, strategy: GrabStrategy) -> Result<()>;

    /// Block up to `timeout_ms` for the next result. Elapsed timeouts surface as
    /// [`crate::Error::Timeout`].
    fn retrieve(&mut self, timeout_ms: u64) -> Result<GrabResult>;

    /// Return a buffer obtained from `retrieve`.
    fn release(&mut self, buffer: BufferId) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}
