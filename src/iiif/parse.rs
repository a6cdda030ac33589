//! Parsers for the IIIF path segments.
//!
//! One function per segment, each pure and total: every input yields either a
//! typed value or a specific [`ParseError`]. None of them looks at the image.
//!
//! ```text
//! {identifier}/{region}/{size}/{rotation}/{quality}.{format}
//!      │           │       │        │          │        │
//!      │           │       │        │          │        └─ parse_format
//!      │           │       │        │          └─ parse_quality
//!      │           │       │        └─ parse_rotation
//!      │           │       └─ parse_size
//!      │           └─ parse_region
//!      └─ parse_identifier
//! ```
//!
//! An empty comma-delimited component means *absent*, never zero: `"20,"` is
//! a width-only size, and `"10,,30,40"` is not a region at all.

use super::params::{Identifier, ImageRequest, OutputFormat, Quality, Region, Rotation, Size};
use thiserror::Error;

/// Characters that may not appear in an identifier.
const FORBIDDEN_IDENTIFIER_CHARS: &[char] = &['/', '?', '#', '[', ']', '@', '%'];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("couldn't parse region: {0:?}")]
    InvalidRegion(String),
    #[error("couldn't parse size: {0:?}")]
    InvalidSize(String),
    #[error("couldn't parse rotation: {0:?}")]
    InvalidRotation(String),
    #[error("invalid rotation: {0} degrees out of range [0, 360]")]
    DegreesOutOfRange(f64),
    #[error("invalid quality: {0:?}")]
    InvalidQuality(String),
    #[error("invalid format: {0:?}")]
    InvalidFormat(String),
}

pub fn parse_identifier(raw: &str) -> Result<Identifier, ParseError> {
    if raw.is_empty() || raw.contains(FORBIDDEN_IDENTIFIER_CHARS) {
        return Err(ParseError::InvalidIdentifier(raw.to_string()));
    }
    Ok(Identifier::new_unchecked(raw.to_string()))
}

pub fn parse_region(raw: &str) -> Result<Region, ParseError> {
    let invalid = || ParseError::InvalidRegion(raw.to_string());

    if raw == "full" {
        return Ok(Region::Full);
    }

    if let Some(rest) = raw.strip_prefix("pct:") {
        let [x, y, w, h] = split_exact::<4>(rest).ok_or_else(invalid)?;
        return Ok(Region::PercentBox {
            x: parse_finite(x).ok_or_else(invalid)?,
            y: parse_finite(y).ok_or_else(invalid)?,
            w: parse_finite(w).ok_or_else(invalid)?,
            h: parse_finite(h).ok_or_else(invalid)?,
        });
    }

    if raw.contains(',') {
        let [x, y, w, h] = split_exact::<4>(raw).ok_or_else(invalid)?;
        return Ok(Region::ExactPixels {
            x: parse_pixels(x).ok_or_else(invalid)?,
            y: parse_pixels(y).ok_or_else(invalid)?,
            w: parse_pixels(w).ok_or_else(invalid)?,
            h: parse_pixels(h).ok_or_else(invalid)?,
        });
    }

    Err(invalid())
}

pub fn parse_size(raw: &str) -> Result<Size, ParseError> {
    let invalid = || ParseError::InvalidSize(raw.to_string());

    if raw == "full" {
        return Ok(Size::Full);
    }

    if let Some(rest) = raw.strip_prefix("pct:") {
        let pct = parse_finite(rest).ok_or_else(invalid)?;
        return Ok(Size::PercentScale { pct });
    }

    if let Some(rest) = raw.strip_prefix('!') {
        let [w, h] = split_exact::<2>(rest).ok_or_else(invalid)?;
        return Ok(Size::BestFitWH {
            w: parse_pixels(w).ok_or_else(invalid)?,
            h: parse_pixels(h).ok_or_else(invalid)?,
        });
    }

    if raw.contains(',') {
        let (w, h) = raw.split_once(',').ok_or_else(invalid)?;
        if h.contains(',') {
            return Err(invalid());
        }
        return match (w.is_empty(), h.is_empty()) {
            (false, false) => Ok(Size::ExactWH {
                w: parse_pixels(w).ok_or_else(invalid)?,
                h: parse_pixels(h).ok_or_else(invalid)?,
            }),
            (false, true) => Ok(Size::FixedWidth {
                w: parse_pixels(w).ok_or_else(invalid)?,
            }),
            (true, false) => Ok(Size::FixedHeight {
                h: parse_pixels(h).ok_or_else(invalid)?,
            }),
            (true, true) => Err(invalid()),
        };
    }

    Err(invalid())
}

pub fn parse_rotation(raw: &str) -> Result<Rotation, ParseError> {
    let (mirrored, rest) = match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let degrees =
        parse_finite(rest).ok_or_else(|| ParseError::InvalidRotation(raw.to_string()))?;
    if !(0.0..=360.0).contains(&degrees) {
        return Err(ParseError::DegreesOutOfRange(degrees));
    }

    Ok(if mirrored {
        Rotation::Mirrored { degrees }
    } else {
        Rotation::Standard { degrees }
    })
}

pub fn parse_quality(raw: &str) -> Result<Quality, ParseError> {
    Quality::ALL
        .into_iter()
        .find(|q| q.as_str() == raw)
        .ok_or_else(|| ParseError::InvalidQuality(raw.to_string()))
}

pub fn parse_format(raw: &str) -> Result<OutputFormat, ParseError> {
    OutputFormat::ALL
        .into_iter()
        .find(|f| f.extension() == raw)
        .ok_or_else(|| ParseError::InvalidFormat(raw.to_string()))
}

impl ImageRequest {
    /// Parse the five request segments. The last one is `{quality}.{format}`,
    /// split on its final dot.
    ///
    /// Segments are checked left to right, so the first bad one is reported.
    pub fn parse(
        identifier: &str,
        region: &str,
        size: &str,
        rotation: &str,
        quality_format: &str,
    ) -> Result<Self, ParseError> {
        let identifier = parse_identifier(identifier)?;
        let region = parse_region(region)?;
        let size = parse_size(size)?;
        let rotation = parse_rotation(rotation)?;
        let (quality, format) = quality_format
            .rsplit_once('.')
            .ok_or_else(|| ParseError::InvalidFormat(quality_format.to_string()))?;
        let quality = parse_quality(quality)?;
        let format = parse_format(format)?;

        Ok(Self {
            identifier,
            region,
            size,
            rotation,
            quality,
            format,
        })
    }
}

/// Split on `,` into exactly `N` non-empty parts.
fn split_exact<const N: usize>(raw: &str) -> Option<[&str; N]> {
    let mut parts = [""; N];
    let mut iter = raw.split(',');
    for slot in parts.iter_mut() {
        let part = iter.next()?;
        if part.is_empty() {
            return None;
        }
        *slot = part;
    }
    if iter.next().is_some() {
        return None;
    }
    Some(parts)
}

fn parse_pixels(raw: &str) -> Option<u32> {
    raw.parse().ok()
}

/// Rust's float parser accepts `inf` and `NaN`; the grammar doesn't.
fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
