//! Subtitle cue timing and serialization.
//!
//! A cue is written as four parts: its 1-based index, a `start --> end` line,
//! the glyph rows of one frame, and a blank separator line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::render::GlyphGrid;

/// Exact frame rate as a reduced `num/den` ratio.
///
/// Cue times are derived from this ratio with integer arithmetic, so the end of
/// cue `n` and the start of cue `n + 1` are always the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FpsValue", into = "String")]
pub struct Fps {
    num: u32,
    den: u32,
}

impl Fps {
    pub fn new(num: u32, den: u32) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(Error::invalid_config(format!(
                "frame rate must be positive, got {}/{}",
                num, den
            )));
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    pub fn num(self) -> u32 {
        self.num
    }

    pub fn den(self) -> u32 {
        self.den
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Start time of frame `n` (0-based), truncated to whole milliseconds.
    pub fn frame_start(self, n: u64) -> Timestamp {
        let ms = u128::from(n) * 1000 * u128::from(self.den) / u128::from(self.num);
        Timestamp::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 10, den: 1 }
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl From<Fps> for String {
    fn from(fps: Fps) -> Self {
        fps.to_string()
    }
}

/// Accepts `"25"`, `"29.97"` and `"30000/1001"`.
///
/// Decimals with up to six fractional digits are taken exactly; longer ones are
/// approximated by the nearest ratio with a denominator of at most 1,000,000.
impl FromStr for Fps {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || Error::invalid_config(format!("invalid frame rate '{}'", s));

        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse::<u32>().map_err(|_| bad())?;
            let den = den.trim().parse::<u32>().map_err(|_| bad())?;
            return Fps::new(num, den);
        }

        if let Some((int, frac)) = s.split_once('.') {
            let frac = frac.trim_end_matches('0');
            if !frac.chars().all(|c| c.is_ascii_digit())
                || (!int.is_empty() && !int.chars().all(|c| c.is_ascii_digit()))
            {
                return Err(bad());
            }
            if frac.len() > 6 {
                // Long decimals such as 23.976023976 stand for NTSC-style ratios.
                let value: f64 = s.parse().map_err(|_| bad())?;
                let (num, den) = approximate_ratio(value).ok_or_else(bad)?;
                return Fps::new(num, den);
            }
            let scale = 10u64.pow(frac.len() as u32);
            let int: u64 = if int.is_empty() { 0 } else { int.parse().map_err(|_| bad())? };
            let frac_val: u64 = if frac.is_empty() { 0 } else { frac.parse().map_err(|_| bad())? };
            let num = int
                .checked_mul(scale)
                .and_then(|v| v.checked_add(frac_val))
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(bad)?;
            return Fps::new(num, scale as u32);
        }

        let num = s.parse::<u32>().map_err(|_| bad())?;
        Fps::new(num, 1)
    }
}

impl TryFrom<f64> for Fps {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::invalid_config(format!(
                "frame rate must be positive, got {}",
                value
            )));
        }
        value.to_string().parse()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FpsValue {
    Int(u32),
    Float(f64),
    Text(String),
}

impl TryFrom<FpsValue> for Fps {
    type Error = Error;

    fn try_from(value: FpsValue) -> Result<Self> {
        match value {
            FpsValue::Int(n) => Fps::new(n, 1),
            FpsValue::Float(f) => Fps::try_from(f),
            FpsValue::Text(s) => s.parse(),
        }
    }
}

/// Largest denominator used when approximating a decimal frame rate.
const MAX_APPROX_DENOMINATOR: u64 = 1_000_000;

/// Closest `num/den` to `value` from its continued fraction expansion, stopping
/// at a relative error of 1e-9 or when the denominator would pass
/// [`MAX_APPROX_DENOMINATOR`].
fn approximate_ratio(value: f64) -> Option<(u32, u32)> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let (mut h_prev, mut h) = (0u64, 1u64);
    let (mut k_prev, mut k) = (1u64, 0u64);
    let mut x = value;
    for _ in 0..32 {
        let a = x.floor();
        if a > f64::from(u32::MAX) {
            break;
        }
        let a = a as u64;
        let Some(h_next) = a.checked_mul(h).and_then(|v| v.checked_add(h_prev)) else {
            break;
        };
        let k_next = a * k + k_prev;
        if k_next > MAX_APPROX_DENOMINATOR || h_next > u64::from(u32::MAX) {
            break;
        }
        (h_prev, h, k_prev, k) = (h, h_next, k, k_next);

        let frac = x - a as f64;
        if frac < 1e-12 || (h as f64 / k as f64 - value).abs() <= value * 1e-9 {
            break;
        }
        x = 1.0 / frac;
    }
    if h == 0 || k == 0 {
        return None;
    }
    Some((u32::try_from(h).ok()?, u32::try_from(k).ok()?))
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Subtitle time in whole milliseconds. Displays as `HH:MM:SS,mmm`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Truncates to the millisecond. The value is snapped to the nearest
    /// microsecond first so that `2.3` does not come out as `2.299`.
    /// Negative and NaN inputs clamp to zero.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !(seconds > 0.0) {
            return Self(0);
        }
        let micros = (seconds * 1_000_000.0).round() as u64;
        Self(micros / 1000)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0;
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;
        write!(f, "{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

/// Format a number of seconds as an SRT timestamp (`HH:MM:SS,mmm`).
///
/// Milliseconds are truncated after snapping to the nearest microsecond, so an
/// input less than half a microsecond below a millisecond boundary lands on
/// that boundary: `0.0009996` formats as `00:00:00,001`.
pub fn format_timestamp(seconds: f64) -> String {
    Timestamp::from_secs_f64(seconds).to_string()
}

/// One subtitle entry borrowing the grid it displays.
#[derive(Debug, Clone, Copy)]
pub struct Cue<'a> {
    pub index: u64,
    pub start: Timestamp,
    pub end: Timestamp,
    pub grid: &'a GlyphGrid,
}

impl<'a> Cue<'a> {
    /// Cue for 0-based frame `n`.
    pub fn for_frame(n: u64, fps: Fps, grid: &'a GlyphGrid) -> Self {
        Self {
            index: n + 1,
            start: fps.frame_start(n),
            end: fps.frame_start(n + 1),
            grid,
        }
    }

    /// Write the cue, reusing `row_buf` for each glyph row.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, row_buf: &mut String) -> io::Result<()> {
        writeln!(out, "{}", self.index)?;
        writeln!(out, "{} --> {}", self.start, self.end)?;
        for y in 0..self.grid.height() {
            self.grid.fill_row(y, row_buf);
            row_buf.push('\n');
            out.write_all(row_buf.as_bytes())?;
        }
        out.write_all(b"\n")
    }
}

impl fmt::Display for Cue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(f, "{} --> {}", self.start, self.end)?;
        writeln!(f, "{}", self.grid)?;
        writeln!(f)
    }
}

/// Appends cues for consecutive frames to an output stream.
pub struct CueWriter<W: Write> {
    out: W,
    fps: Fps,
    written: u64,
    row_buf: String,
}

impl<W: Write> CueWriter<W> {
    pub fn new(out: W, fps: Fps) -> Self {
        Self {
            out,
            fps,
            written: 0,
            row_buf: String::new(),
        }
    }

    /// Write the next frame's grid and return the cue's end time.
    pub fn write_grid(&mut self, grid: &GlyphGrid) -> io::Result<Timestamp> {
        let cue = Cue::for_frame(self.written, self.fps, grid);
        cue.write_to(&mut self.out, &mut self.row_buf)?;
        self.written += 1;
        Ok(cue.end)
    }

    pub fn cues_written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}
