use opencv::prelude::*;
use opencv::{core, imgproc, videoio};
use tracing::{debug, warn};

use crate::config::AcquisitionProfile;
use crate::{
    BufferId, CaptureSource, DeviceInfo, Error, Frame, GrabResult, GrabStatus, GrabStrategy,
    PixelFormat, Result, SourceFactory,
};

/// Probes `VideoCapture` indices `0..probe`.
pub struct OpenCvFactory {
    probe: u32,
}

impl OpenCvFactory {
    pub fn new(probe: u32) -> Self {
        Self { probe }
    }
}

impl SourceFactory for OpenCvFactory {
    type Source = OpenCvCamera;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let mut out = Vec::new();
        for idx in 0..self.probe as i32 {
            let opened = videoio::VideoCapture::new(idx, videoio::CAP_ANY)
                .and_then(|cap| cap.is_opened())
                .unwrap_or(false);
            if opened {
                out.push(DeviceInfo {
                    name: idx.to_string(),
                    driver: "opencv".to_string(),
                });
            }
        }
        Ok(out)
    }

    fn create(&self, device: &DeviceInfo) -> Result<OpenCvCamera> {
        let index = device
            .name
            .parse::<i32>()
            .map_err(|_| Error::NotFound(device.name.clone()))?;
        Ok(OpenCvCamera {
            info: device.clone(),
            index,
            cap: None,
            streaming: false,
            next_buffer: 0,
        })
    }
}

pub struct OpenCvCamera {
    info: DeviceInfo,
    index: i32,
    cap: Option<videoio::VideoCapture>,
    streaming: bool,
    next_buffer: u64,
}

impl OpenCvCamera {
    fn cap(&mut self) -> Result<&mut videoio::VideoCapture> {
        self.cap
            .as_mut()
            .ok_or(Error::Unsupported("camera is not open"))
    }

    fn set(&mut self, prop: i32, value: f64) -> Result<()> {
        let name = self.info.name.clone();
        let applied = self
            .cap()?
            .set(prop, value)
            .map_err(|e| Error::Backend(e.to_string()))?;
        if !applied {
            warn!(device = %name, prop, value, "capture property not applied");
        }
        Ok(())
    }
}

impl CaptureSource for OpenCvCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<()> {
        let cap = videoio::VideoCapture::new(self.index, videoio::CAP_ANY)
            .map_err(|e| Error::Backend(e.to_string()))?;
        let opened =
            videoio::VideoCapture::is_opened(&cap).map_err(|e| Error::Backend(e.to_string()))?;
        if !opened {
            return Err(Error::NotFound(self.info.name.clone()));
        }
        self.cap = Some(cap);
        Ok(())
    }

    fn configure(&mut self, profile: &AcquisitionProfile) -> Result<()> {
        if let Some(w) = profile.width {
            self.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = profile.height {
            self.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        if let Some(fps) = profile.fps {
            self.set(videoio::CAP_PROP_FPS, fps)?;
        }
        if let Some(exp) = profile.exposure_us {
            self.set(videoio::CAP_PROP_EXPOSURE, exp)?;
        }
        debug!(device = %self.info.name, profile = %profile.name, "profile applied");
        Ok(())
    }

    fn start_streaming(&mut self, strategy: GrabStrategy) -> Result<()> {
        if strategy == GrabStrategy::LatestFrameOnly {
            self.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
        }
        self.streaming = true;
        Ok(())
    }

    fn retrieve(&mut self, timeout_ms: u64) -> Result<GrabResult> {
        if !self.streaming {
            return Err(Error::Backend(format!("{} is not streaming", self.info.name)));
        }
        // Honoured by backends that support it; others block on their own schedule.
        let _ = self
            .cap()?
            .set(videoio::CAP_PROP_READ_TIMEOUT_MSEC, timeout_ms as f64);
        let mut mat = core::Mat::default();
        let got = self
            .cap()?
            .read(&mut mat)
            .map_err(|e| Error::Backend(e.to_string()))?;
        if !got {
            return Err(Error::Timeout {
                device: self.info.name.clone(),
                timeout_ms,
            });
        }
        self.next_buffer += 1;
        let buffer = BufferId(self.next_buffer);
        if mat.empty() {
            return Ok(GrabResult {
                buffer,
                status: GrabStatus::Incomplete("empty frame".into()),
            });
        }
        Ok(GrabResult {
            buffer,
            status: GrabStatus::Succeeded(mat_to_frame(&mat)?),
        })
    }

    fn release(&mut self, _buffer: BufferId) -> Result<()> {
        // Frames are copied out of the Mat, nothing is held by the backend.
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.streaming = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut cap) = self.cap.take() {
            cap.release().map_err(|e| Error::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

fn mat_to_frame(mat: &core::Mat) -> Result<Frame> {
    let pixel_format = match mat.channels() {
        1 => PixelFormat::Gray8,
        3 => PixelFormat::Bgr8,
        n => return Err(Error::Shape(format!("unsupported channel count {n}"))),
    };
    let data = mat
        .data_bytes()
        .map_err(|e| Error::Backend(e.to_string()))?
        .to_vec();
    Frame::from_raw(mat.cols() as u32, mat.rows() as u32, pixel_format, data)
}

/// Copy a frame into a BGR or gray `Mat` for HighGUI.
pub(crate) fn frame_to_mat(frame: &Frame) -> Result<core::Mat> {
    let flat = core::Mat::from_slice(&frame.data).map_err(|e| Error::Backend(e.to_string()))?;
    let shaped = flat
        .reshape(frame.pixel_format.channels() as i32, frame.height as i32)
        .map_err(|e| Error::Backend(e.to_string()))?;
    let mut out = core::Mat::default();
    match frame.pixel_format {
        PixelFormat::Rgb8 => {
            imgproc::cvt_color(&shaped, &mut out, imgproc::COLOR_RGB2BGR, 0)
                .map_err(|e| Error::Backend(e.to_string()))?;
        }
        PixelFormat::Bgr8 | PixelFormat::Gray8 => {
            out = shaped
                .try_clone()
                .map_err(|e| Error::Backend(e.to_string()))?;
        }
    }
    Ok(out)
}
