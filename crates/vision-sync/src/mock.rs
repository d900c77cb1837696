use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;

use crate::config::AcquisitionProfile;
use crate::{
    BufferId, CaptureSource, DeviceInfo, Error, Frame, GrabResult, GrabStatus, GrabStrategy,
    PixelFormat, Result, SourceFactory,
};

/// Behaviour shared by every camera a [`MockFactory`] hands out.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Results per camera before `retrieve` starts timing out.
    pub frame_budget: Option<u64>,
    /// Every n-th result is reported as an incomplete grab.
    pub incomplete_every: Option<u64>,
    /// The n-th retrieve fails with a backend error.
    pub fault_at: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            pixel_format: PixelFormat::Gray8,
            frame_budget: None,
            incomplete_every: None,
            fault_at: None,
        }
    }
}

/// Buffer and lifecycle bookkeeping, summed over all cameras of one factory.
#[derive(Debug, Default)]
pub struct MockCounters {
    pub retrieved: AtomicU64,
    pub released: AtomicU64,
    pub stopped: AtomicU64,
    pub closed: AtomicU64,
}

impl MockCounters {
    pub fn outstanding(&self) -> u64 {
        self.retrieved.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

pub struct MockFactory {
    devices: usize,
    config: MockConfig,
    counters: Arc<MockCounters>,
}

impl MockFactory {
    pub fn new(devices: usize, config: MockConfig) -> Self {
        Self {
            devices,
            config,
            counters: Arc::new(MockCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

impl SourceFactory for MockFactory {
    type Source = MockCamera;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        Ok((0..self.devices)
            .map(|i| DeviceInfo {
                name: format!("mock{i}"),
                driver: "mock".to_string(),
            })
            .collect())
    }

    fn create(&self, device: &DeviceInfo) -> Result<MockCamera> {
        if device.driver != "mock" {
            return Err(Error::NotFound(device.name.clone()));
        }
        Ok(MockCamera {
            info: device.clone(),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
            opened: false,
            streaming: false,
            counter: 0,
        })
    }
}

pub struct MockCamera {
    info: DeviceInfo,
    config: MockConfig,
    counters: Arc<MockCounters>,
    opened: bool,
    streaming: bool,
    counter: u64,
}

impl MockCamera {
    fn ramp(&self) -> Frame {
        let width = self.config.width;
        let height = self.config.height;
        let channels = self.config.pixel_format.channels();
        let mut data = vec![0u8; width as usize * height as usize * channels];
        for y in 0..height {
            for x in 0..width {
                let v = ((x as u64 + y as u64 + self.counter) % 256) as u8;
                let idx = (y as usize * width as usize + x as usize) * channels;
                data[idx..idx + channels].fill(v);
            }
        }
        Frame {
            width,
            height,
            pixel_format: self.config.pixel_format,
            data,
            ts: Some(OffsetDateTime::now_utc()),
        }
    }
}

impl CaptureSource for MockCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    fn configure(&mut self, profile: &AcquisitionProfile) -> Result<()> {
        if !self.opened {
            return Err(Error::Unsupported("configure before open"));
        }
        if self.streaming {
            return Err(Error::Unsupported("configure while streaming"));
        }
        if let Some(w) = profile.width {
            self.config.width = w;
        }
        if let Some(h) = profile.height {
            self.config.height = h;
        }
        Ok(())
    }

    fn start_streaming(&mut self, _strategy: GrabStrategy) -> Result<()> {
        if !self.opened {
            return Err(Error::Unsupported("start streaming before open"));
        }
        self.streaming = true;
        Ok(())
    }

    fn retrieve(&mut self, timeout_ms: u64) -> Result<GrabResult> {
        if !self.streaming {
            return Err(Error::Backend(format!("{} is not streaming", self.info.name)));
        }
        if self.config.frame_budget.is_some_and(|n| self.counter >= n) {
            return Err(Error::Timeout {
                device: self.info.name.clone(),
                timeout_ms,
            });
        }
        self.counter += 1;
        if self.config.fault_at == Some(self.counter) {
            return Err(Error::Backend(format!("{} transport fault", self.info.name)));
        }
        let status = match self.config.incomplete_every {
            Some(n) if n > 0 && self.counter % n == 0 => {
                GrabStatus::Incomplete("mock dropped packets".to_string())
            }
            _ => GrabStatus::Succeeded(self.ramp()),
        };
        self.counters.retrieved.fetch_add(1, Ordering::SeqCst);
        Ok(GrabResult {
            buffer: BufferId(self.counter),
            status,
        })
    }

    fn release(&mut self, _buffer: BufferId) -> Result<()> {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.streaming {
            self.streaming = false;
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.opened {
            self.opened = false;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(config: MockConfig) -> MockCamera {
        let factory = MockFactory::new(1, config);
        let dev = factory.enumerate().unwrap().remove(0);
        let mut cam = factory.create(&dev).unwrap();
        cam.open().unwrap();
        cam.start_streaming(GrabStrategy::LatestFrameOnly).unwrap();
        cam
    }

    #[test]
    fn retrieve_requires_streaming() {
        let factory = MockFactory::new(1, MockConfig::default());
        let dev = factory.enumerate().unwrap().remove(0);
        let mut cam = factory.create(&dev).unwrap();
        assert!(matches!(cam.retrieve(10), Err(Error::Backend(_))));
    }

    #[test]
    fn budget_exhaustion_times_out() {
        let mut cam = streaming(MockConfig {
            frame_budget: Some(2),
            ..MockConfig::default()
        });
        assert!(cam.retrieve(10).is_ok());
        assert!(cam.retrieve(10).is_ok());
        let err = cam.retrieve(10).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn profile_overrides_size() {
        let factory = MockFactory::new(1, MockConfig::default());
        let dev = factory.enumerate().unwrap().remove(0);
        let mut cam = factory.create(&dev).unwrap();
        cam.open().unwrap();
        let profile = AcquisitionProfile {
            width: Some(64),
            height: Some(48),
            ..AcquisitionProfile::named("small")
        };
        cam.configure(&profile).unwrap();
        cam.start_streaming(GrabStrategy::LatestFrameOnly).unwrap();
        match cam.retrieve(10).unwrap().status {
            GrabStatus::Succeeded(f) => assert_eq!((f.width, f.height), (64, 48)),
            GrabStatus::Incomplete(r) => panic!("unexpected incomplete grab: {r}"),
        }
    }

    #[test]
    fn incomplete_injection() {
        let mut cam = streaming(MockConfig {
            incomplete_every: Some(2),
            ..MockConfig::default()
        });
        assert!(matches!(cam.retrieve(10).unwrap().status, GrabStatus::Succeeded(_)));
        assert!(matches!(cam.retrieve(10).unwrap().status, GrabStatus::Incomplete(_)));
    }
}
