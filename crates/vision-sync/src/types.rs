use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb};
use time::OffsetDateTime;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Row-major 8-bit pixel buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
    pub ts: Option<OffsetDateTime>,
}

impl Frame {
    /// All-zero frame of the given geometry.
    pub fn blank(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let len = width as usize * height as usize * pixel_format.channels();
        Self {
            width,
            height,
            pixel_format,
            data: vec![0u8; len],
            ts: None,
        }
    }

    /// Wrap an existing buffer, checking that its length matches the geometry.
    pub fn from_raw(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * pixel_format.channels();
        if data.len() != expected {
            return Err(Error::Shape(format!(
                "buffer holds {} bytes, {width}x{height} {pixel_format:?} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixel_format,
            data,
            ts: None,
        })
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_format.channels()
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Bilinear resize to an exact size. Same-size requests return a copy.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame> {
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        if width == 0 || height == 0 || self.width == 0 || self.height == 0 {
            return Err(Error::Shape(format!(
                "cannot resize {}x{} to {width}x{height}",
                self.width, self.height
            )));
        }
        let data = match self.pixel_format {
            PixelFormat::Gray8 => {
                let img: ImageBuffer<Luma<u8>, &[u8]> =
                    ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
                        .ok_or_else(|| Error::Shape("gray buffer size mismatch".into()))?;
                imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
            }
            // Channel order is irrelevant to interpolation, so BGR rides the RGB path.
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
                let img: ImageBuffer<Rgb<u8>, &[u8]> =
                    ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
                        .ok_or_else(|| Error::Shape("color buffer size mismatch".into()))?;
                imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
            }
        };
        Ok(Frame {
            width,
            height,
            pixel_format: self.pixel_format,
            data,
            ts: self.ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_short_buffers() {
        let err = Frame::from_raw(4, 4, PixelFormat::Rgb8, vec![0; 16]).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
        assert!(Frame::from_raw(4, 4, PixelFormat::Gray8, vec![0; 16]).is_ok());
    }

    #[test]
    fn resize_stretches_height_only() {
        let f = Frame::blank(8, 4, PixelFormat::Gray8);
        let r = f.resized(8, 10).unwrap();
        assert_eq!((r.width, r.height), (8, 10));
        assert_eq!(r.data.len(), 80);
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let mut f = Frame::blank(3, 2, PixelFormat::Bgr8);
        f.data[0] = 7;
        let r = f.resized(3, 2).unwrap();
        assert_eq!(r.data, f.data);
    }
}
