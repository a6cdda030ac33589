//! Typed IIIF request parameters.
//!
//! These types describe *what* a client asked for, already validated. They
//! are the interface between the [`parse`](super::parse) module (which turns
//! URL segments into values) and the argument synthesizer in
//! [`imaging::args`](crate::imaging::args) (which turns values into tool
//! directives). Every parameter is a closed enum, so downstream code matches
//! exhaustively and a new variant is a compile error everywhere it matters.
//!
//! ## Types
//!
//! - [`Region`]: which rectangle of the source to extract.
//! - [`Size`]: how to scale the extracted region.
//! - [`Rotation`]: clockwise degrees, optionally mirrored first.
//! - [`Quality`]: color treatment.
//! - [`OutputFormat`]: encoded output, one of the canonical [`OutputFormat::ALL`].
//! - [`ImageRequest`]: all of the above plus the identifier.

use std::fmt;

/// Region of the source image to extract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Full,
    /// Absolute pixel rectangle.
    ExactPixels { x: u32, y: u32, w: u32, h: u32 },
    /// Percentages of the source dimensions, conventionally 0–100.
    /// Not clamped: out-of-range values are the tool's problem.
    PercentBox { x: f64, y: f64, w: f64, h: f64 },
}

/// Output size of the extracted region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Size {
    Full,
    FixedWidth { w: u32 },
    FixedHeight { h: u32 },
    /// Exact dimensions; may distort the aspect ratio.
    ExactWH { w: u32, h: u32 },
    /// Largest size that fits within `w`×`h`, aspect ratio preserved.
    BestFitWH { w: u32, h: u32 },
    PercentScale { pct: f64 },
}

/// Rotation in degrees, always within `[0, 360]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rotation {
    Standard { degrees: f64 },
    /// Horizontal flip applied before rotating.
    Mirrored { degrees: f64 },
}

impl Rotation {
    pub fn degrees(self) -> f64 {
        match self {
            Rotation::Standard { degrees } | Rotation::Mirrored { degrees } => degrees,
        }
    }

    pub fn is_mirrored(self) -> bool {
        matches!(self, Rotation::Mirrored { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Default,
    Color,
    Gray,
    Bitonal,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Default,
        Quality::Color,
        Quality::Gray,
        Quality::Bitonal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Default => "default",
            Quality::Color => "color",
            Quality::Gray => "gray",
            Quality::Bitonal => "bitonal",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported output (and source) formats.
///
/// The order of [`OutputFormat::ALL`] is the canonical discovery order: when
/// an identifier is stored in several formats, the first one found in this
/// order is the one probed for dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpg,
    Tif,
    Png,
    Gif,
    Jp2,
    Pdf,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Jpg,
        OutputFormat::Tif,
        OutputFormat::Png,
        OutputFormat::Gif,
        OutputFormat::Jp2,
        OutputFormat::Pdf,
        OutputFormat::Webp,
    ];

    /// URL and filename extension.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Tif => "tif",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Jp2 => "jp2",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Webp => "webp",
        }
    }

    /// ImageMagick coder used for the `coder:-` output sink.
    pub fn coder(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Tif => "tiff",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Jp2 => "jp2",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Tif => "image/tiff",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Jp2 => "image/jp2",
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A validated identifier: non-empty, no `/ ? # [ ] @ %`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap without checking. Only [`parse_identifier`](super::parse_identifier)
    /// should call this.
    pub(super) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully parsed image request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub identifier: Identifier,
    pub region: Region,
    pub size: Size,
    pub rotation: Rotation,
    pub quality: Quality,
    pub format: OutputFormat,
}
