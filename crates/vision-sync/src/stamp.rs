//! Capture-time stamping: clock readings, timestamp strings and the text overlay.

use std::fmt;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::{Error, Frame, Result};

const NANOS_PER_SEC: i128 = 1_000_000_000;
const SUFFIX_DIGITS: usize = 9;

/// A single clock reading: wall time for display plus a nanosecond count.
#[derive(Clone, Copy, Debug)]
pub struct ClockReading {
    pub local: OffsetDateTime,
    pub unix_nanos: i128,
}

pub trait Clock {
    fn now(&mut self) -> ClockReading;
}

/// Wall clock in the local offset captured at construction.
///
/// The offset is resolved once because `time` refuses to query it after other
/// threads have been spawned on some platforms; it falls back to UTC.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> ClockReading {
        let now = OffsetDateTime::now_utc();
        ClockReading {
            local: now.to_offset(self.offset),
            unix_nanos: now.unix_timestamp_nanos(),
        }
    }
}

/// `YYYY-MM-DD_HH-MM-SS.<9 digits>`; the suffix is the last nine digits of the
/// nanosecond count.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn from_reading(reading: &ClockReading) -> Result<Self> {
        let fmt = format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
        let date = reading
            .local
            .format(&fmt)
            .map_err(|e| Error::Timestamp(e.to_string()))?;
        let suffix = reading.unix_nanos.rem_euclid(NANOS_PER_SEC);
        Ok(Self(format!("{date}.{suffix:09}")))
    }

    /// Accept an externally produced timestamp, validating the numeric suffix.
    pub fn parse(s: &str) -> Result<Self> {
        let ts = Self(s.to_string());
        ts.suffix_nanos()?;
        Ok(ts)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing nine digits as an integer nanosecond count.
    pub fn suffix_nanos(&self) -> Result<u64> {
        let s = self.0.as_str();
        let tail = s
            .len()
            .checked_sub(SUFFIX_DIGITS)
            .and_then(|start| s.get(start..))
            .ok_or_else(|| Error::Timestamp(format!("'{s}' is shorter than its suffix")))?;
        if !tail.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Timestamp(format!("'{s}' has a non-numeric suffix")));
        }
        tail.parse::<u64>()
            .map_err(|e| Error::Timestamp(format!("'{s}': {e}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Placement and look of the overlay text.
#[derive(Clone, Copy, Debug)]
pub struct TextStyle {
    /// Left end of the text baseline, in pixels.
    pub origin: (u32, u32),
    /// Pixels per glyph cell.
    pub scale: u32,
    /// Extra thickening of every lit cell, in pixels.
    pub stroke: u32,
    /// Intensity written to every channel.
    pub value: u8,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            origin: (10, 30),
            scale: 3,
            stroke: 2,
            value: 255,
        }
    }
}

pub struct FrameStamper<C: Clock> {
    clock: C,
    style: TextStyle,
}

impl<C: Clock> FrameStamper<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            style: TextStyle::default(),
        }
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    /// Read the clock, burn the timestamp into `frame` and hand both back.
    pub fn stamp(&mut self, mut frame: Frame) -> Result<(Frame, Timestamp)> {
        let reading = self.clock.now();
        let ts = Timestamp::from_reading(&reading)?;
        draw_text(&mut frame, ts.as_str(), &self.style);
        frame.ts = Some(reading.local);
        Ok((frame, ts))
    }
}

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;

fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        _ => [0; 7],
    }
}

/// Draw `text` in place, clipped to the frame.
pub fn draw_text(frame: &mut Frame, text: &str, style: &TextStyle) {
    let s = style.scale.max(1);
    let block = s + style.stroke.saturating_sub(1);
    let top = style.origin.1.saturating_sub(GLYPH_H * s);
    let channels = frame.pixel_format.channels();
    let stride = frame.stride();
    for (i, c) in text.chars().enumerate() {
        let left = style.origin.0 + i as u32 * (GLYPH_W + 1) * s;
        if left >= frame.width {
            break;
        }
        for (gy, bits) in glyph(c).iter().enumerate() {
            for gx in 0..GLYPH_W {
                if bits & (0x10 >> gx) == 0 {
                    continue;
                }
                let x0 = left + gx * s;
                let y0 = top + gy as u32 * s;
                for y in y0..(y0 + block).min(frame.height) {
                    for x in x0..(x0 + block).min(frame.width) {
                        let idx = y as usize * stride + x as usize * channels;
                        frame.data[idx..idx + channels].fill(style.value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelFormat;
    use time::macros::datetime;

    struct FixedClock(i128);

    impl Clock for FixedClock {
        fn now(&mut self) -> ClockReading {
            ClockReading {
                local: datetime!(2024-03-09 07:05:04 UTC),
                unix_nanos: self.0,
            }
        }
    }

    #[test]
    fn timestamp_layout() {
        let reading = FixedClock(1_710_000_000_000_000_042).now();
        let ts = Timestamp::from_reading(&reading).unwrap();
        assert_eq!(ts.as_str(), "2024-03-09_07-05-04.000000042");
        assert_eq!(ts.suffix_nanos().unwrap(), 42);
    }

    #[test]
    fn suffix_is_always_nine_digits() {
        for nanos in [0i128, 7, 999_999_999, 1_000_000_000, 123_456_789_012] {
            let ts = Timestamp::from_reading(&FixedClock(nanos).now()).unwrap();
            let (_, suffix) = ts.as_str().rsplit_once('.').unwrap();
            assert_eq!(suffix.len(), 9, "{ts}");
        }
    }

    #[test]
    fn parse_rejects_bad_suffix() {
        assert!(Timestamp::parse("2024-01-01_00-00-00.12345678x").is_err());
        assert!(Timestamp::parse("1234").is_err());
        assert_eq!(
            Timestamp::parse("x.000000100").unwrap().suffix_nanos().unwrap(),
            100
        );
    }

    #[test]
    fn stamp_is_deterministic_and_clipped() {
        let mut a = FrameStamper::new(FixedClock(5));
        let mut b = FrameStamper::new(FixedClock(5));
        let (fa, ta) = a.stamp(Frame::blank(200, 40, PixelFormat::Gray8)).unwrap();
        let (fb, tb) = b.stamp(Frame::blank(200, 40, PixelFormat::Gray8)).unwrap();
        assert_eq!(ta, tb);
        assert_eq!(fa.data, fb.data);
        // The text runs off the right edge of a 200 px frame without panicking.
        assert!(fa.data.iter().any(|&v| v == 255));
        // Nothing above the glyph box is touched.
        assert!(fa.row(0).iter().all(|&v| v == 0));
        assert!(fa.ts.is_some());
    }

    #[test]
    fn stamp_writes_every_channel() {
        let mut st = FrameStamper::new(FixedClock(5));
        let (f, _) = st.stamp(Frame::blank(640, 480, PixelFormat::Bgr8)).unwrap();
        let lit: Vec<_> = f.data.chunks(3).filter(|px| px[0] == 255).collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|px| px == &[255, 255, 255]));
    }
}
