use crate::{Error, Frame, Result};

/// Per-camera history of annotated frames, kept as one top-to-bottom canvas.
///
/// Frames are appended to the canvas as they arrive, so producing a snapshot
/// only pays for the final stretch rather than re-concatenating the history.
/// All frames must share width and pixel format.
#[derive(Debug, Default)]
pub struct MosaicAccumulator {
    canvas: Option<Frame>,
    frames: usize,
}

impl MosaicAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame below everything held so far.
    pub fn push(&mut self, frame: Frame) -> Result<()> {
        match self.canvas.as_mut() {
            None => {
                self.canvas = Some(Frame { ts: None, ..frame });
            }
            Some(canvas) => {
                if frame.width != canvas.width || frame.pixel_format != canvas.pixel_format {
                    return Err(Error::Shape(format!(
                        "cannot stack {}x{} {:?} under a {}-wide {:?} mosaic",
                        frame.width,
                        frame.height,
                        frame.pixel_format,
                        canvas.width,
                        canvas.pixel_format
                    )));
                }
                canvas.data.extend_from_slice(&frame.data);
                canvas.height += frame.height;
            }
        }
        self.frames += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Height of the unstretched stack.
    pub fn stacked_height(&self) -> u32 {
        self.canvas.as_ref().map_or(0, |c| c.height)
    }

    pub fn width(&self) -> Option<u32> {
        self.canvas.as_ref().map(|c| c.width)
    }

    /// The unstretched stack.
    pub fn stacked(&self) -> Option<&Frame> {
        self.canvas.as_ref()
    }

    /// The full stack stretched vertically to `target_height`, keeping its width.
    pub fn snapshot(&self, target_height: u32) -> Result<Frame> {
        let canvas = self
            .canvas
            .as_ref()
            .ok_or_else(|| Error::Shape("mosaic has no frames".into()))?;
        canvas.resized(canvas.width, target_height)
    }
}

/// Stretch target shared by both cameras: the taller of the two stacks.
pub fn common_height(a: &MosaicAccumulator, b: &MosaicAccumulator) -> u32 {
    a.stacked_height().max(b.stacked_height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelFormat;

    fn filled(w: u32, h: u32, v: u8) -> Frame {
        let mut f = Frame::blank(w, h, PixelFormat::Gray8);
        f.data.fill(v);
        f
    }

    #[test]
    fn stacks_in_arrival_order() {
        let mut acc = MosaicAccumulator::new();
        acc.push(filled(4, 2, 1)).unwrap();
        acc.push(filled(4, 3, 2)).unwrap();
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.stacked_height(), 5);
        let snap = acc.snapshot(5).unwrap();
        assert_eq!(snap.row(0), &[1, 1, 1, 1]);
        assert_eq!(snap.row(1), &[1, 1, 1, 1]);
        assert_eq!(snap.row(2), &[2, 2, 2, 2]);
        assert_eq!(snap.row(4), &[2, 2, 2, 2]);
    }

    #[test]
    fn snapshot_takes_target_height_and_keeps_width() {
        let mut a = MosaicAccumulator::new();
        let mut b = MosaicAccumulator::new();
        for _ in 0..3 {
            a.push(filled(8, 4, 9)).unwrap();
            b.push(filled(6, 6, 9)).unwrap();
        }
        let target = common_height(&a, &b);
        assert_eq!(target, 18);
        let sa = a.snapshot(target).unwrap();
        let sb = b.snapshot(target).unwrap();
        assert_eq!((sa.width, sa.height), (8, 18));
        assert_eq!((sb.width, sb.height), (6, 18));
    }

    #[test]
    fn width_change_is_rejected_without_mutation() {
        let mut acc = MosaicAccumulator::new();
        acc.push(filled(4, 2, 1)).unwrap();
        let err = acc.push(filled(5, 2, 1)).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.stacked_height(), 2);
        assert_eq!(acc.width(), Some(4));
    }

    #[test]
    fn empty_snapshot_is_an_error() {
        let acc = MosaicAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.snapshot(10).is_err());
    }
}
