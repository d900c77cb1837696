use crate::{Error, Frame, Result};

pub const DEFAULT_GAP_PX: u32 = 1500;

/// Places two mosaics side by side with a blank column between them.
#[derive(Clone, Copy, Debug)]
pub struct CompositeComposer {
    gap_px: u32,
}

impl Default for CompositeComposer {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_PX)
    }
}

impl CompositeComposer {
    pub fn new(gap_px: u32) -> Self {
        Self { gap_px }
    }

    pub fn gap_px(&self) -> u32 {
        self.gap_px
    }

    /// Stretch the shorter input to the taller one's height, then concatenate
    /// `left | gap | right`. The gap is zero-filled in the inputs' pixel format.
    pub fn compose(&self, left: &Frame, right: &Frame) -> Result<Frame> {
        if left.pixel_format != right.pixel_format {
            return Err(Error::Shape(format!(
                "cannot merge {:?} with {:?}",
                left.pixel_format, right.pixel_format
            )));
        }
        let height = left.height.max(right.height);
        let left = left.resized(left.width, height)?;
        let right = right.resized(right.width, height)?;

        let format = left.pixel_format;
        let width = left.width + self.gap_px + right.width;
        let gap_bytes = self.gap_px as usize * format.channels();
        let mut data = Vec::with_capacity(width as usize * height as usize * format.channels());
        for y in 0..height {
            data.extend_from_slice(left.row(y));
            data.resize(data.len() + gap_bytes, 0);
            data.extend_from_slice(right.row(y));
        }
        Frame::from_raw(width, height, format, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelFormat;

    #[test]
    fn width_is_sum_plus_gap() {
        let c = CompositeComposer::default();
        let a = Frame::blank(640, 480, PixelFormat::Gray8);
        let b = Frame::blank(320, 480, PixelFormat::Gray8);
        let out = c.compose(&a, &b).unwrap();
        assert_eq!(out.width, 640 + 1500 + 320);
        assert_eq!(out.height, 480);
    }

    #[test]
    fn shorter_side_is_stretched_not_padded() {
        let c = CompositeComposer::new(2);
        let mut a = Frame::blank(2, 4, PixelFormat::Gray8);
        a.data.fill(10);
        let mut b = Frame::blank(1, 2, PixelFormat::Gray8);
        b.data.fill(20);
        let out = c.compose(&a, &b).unwrap();
        assert_eq!((out.width, out.height), (5, 4));
        for y in 0..4 {
            let row = out.row(y);
            assert_eq!(&row[..4], &[10, 10, 0, 0]);
            assert!((19..=20).contains(&row[4]));
        }
    }

    #[test]
    fn gap_follows_channel_count() {
        let c = CompositeComposer::new(3);
        let a = Frame::blank(1, 1, PixelFormat::Rgb8);
        let out = c.compose(&a, &a).unwrap();
        assert_eq!(out.data.len(), 5 * 3);
    }

    #[test]
    fn mixed_formats_rejected() {
        let c = CompositeComposer::default();
        let a = Frame::blank(4, 4, PixelFormat::Gray8);
        let b = Frame::blank(4, 4, PixelFormat::Rgb8);
        assert!(matches!(c.compose(&a, &b), Err(Error::Shape(_))));
    }
}
