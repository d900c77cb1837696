//! Scoped ownership of devices and retrieved buffers.

use tracing::{info, warn};

use crate::config::AcquisitionProfile;
use crate::{
    CaptureSource, DeviceInfo, Error, Frame, GrabResult, GrabStatus, GrabStrategy, Result,
    SourceFactory,
};

/// A retrieved result whose buffer is released when the guard goes out of scope.
pub struct Grab<'a, S: CaptureSource + ?Sized> {
    source: &'a mut S,
    result: Option<GrabResult>,
}

impl<'a, S: CaptureSource + ?Sized> Grab<'a, S> {
    /// Retrieve the next result from `source`, blocking up to `timeout_ms`.
    pub fn retrieve(source: &'a mut S, timeout_ms: u64) -> Result<Self> {
        let result = source.retrieve(timeout_ms)?;
        Ok(Self {
            source,
            result: Some(result),
        })
    }

    pub fn succeeded(&self) -> bool {
        matches!(
            self.result.as_ref().map(|r| &r.status),
            Some(GrabStatus::Succeeded(_))
        )
    }

    /// Move the frame out of a successful grab. The buffer is still released on drop.
    pub fn take_frame(&mut self) -> Option<Frame> {
        let result = self.result.as_mut()?;
        match std::mem::replace(&mut result.status, GrabStatus::Incomplete("taken".into())) {
            GrabStatus::Succeeded(frame) => Some(frame),
            other => {
                result.status = other;
                None
            }
        }
    }

    pub fn incomplete_reason(&self) -> Option<&str> {
        match self.result.as_ref().map(|r| &r.status) {
            Some(GrabStatus::Incomplete(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl<S: CaptureSource + ?Sized> Drop for Grab<'_, S> {
    fn drop(&mut self) {
        if let Some(result) = self.result.take() {
            if let Err(e) = self.source.release(result.buffer) {
                warn!(device = %self.source.info().name, error = %e, "buffer release failed");
            }
        }
    }
}

/// The two opened, streaming sources. Streams are stopped and devices closed on drop,
/// including after a fatal acquisition error.
pub struct Rig<S: CaptureSource> {
    pub first: S,
    pub second: S,
}

impl<S: CaptureSource> Rig<S> {
    /// Discover devices, bind the first two, open and configure them.
    ///
    /// Fails with [`Error::Configuration`] before touching any device when fewer than
    /// two are attached.
    pub fn assemble<F>(factory: &F, profile: &AcquisitionProfile) -> Result<Self>
    where
        F: SourceFactory<Source = S>,
    {
        let devices = factory.enumerate()?;
        info!(count = devices.len(), "enumerated capture devices");
        let (d1, d2) = match devices.as_slice() {
            [d1, d2, ..] => (d1, d2),
            _ => {
                return Err(Error::Configuration(format!(
                    "at least two cameras are required, found {}",
                    devices.len()
                )))
            }
        };
        let first = bind(factory, d1, profile)?;
        let second = bind(factory, d2, profile)?;
        Ok(Self { first, second })
    }

    pub fn start_streaming(&mut self, strategy: GrabStrategy) -> Result<()> {
        self.first.start_streaming(strategy)?;
        self.second.start_streaming(strategy)?;
        Ok(())
    }
}

fn bind<F: SourceFactory>(
    factory: &F,
    device: &DeviceInfo,
    profile: &AcquisitionProfile,
) -> Result<F::Source> {
    let mut source = factory.create(device)?;
    source.open()?;
    source.configure(profile)?;
    info!(device = %device.name, driver = %device.driver, profile = %profile.name, "camera ready");
    Ok(source)
}

impl<S: CaptureSource> Drop for Rig<S> {
    fn drop(&mut self) {
        for source in [&mut self.first, &mut self.second] {
            let name = source.info().name.clone();
            if let Err(e) = source.stop() {
                warn!(device = %name, error = %e, "stop failed");
            }
            if let Err(e) = source.close() {
                warn!(device = %name, error = %e, "close failed");
            }
        }
    }
}
