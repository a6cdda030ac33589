//! IIIF Image API request grammar.
//!
//! The module is split into:
//! - **Parameters**: the closed enums a request is made of
//! - **Parsing**: one total function per URL segment
//! - **Routing**: which URL shape a path is, with per-segment decoding
//! - **Geometry**: percentage offsets → pixels

mod geometry;
mod params;
mod parse;
mod route;

pub use geometry::{PercentCrop, resolve};
pub use params::{Identifier, ImageRequest, OutputFormat, Quality, Region, Rotation, Size};
pub use parse::{
    ParseError, parse_format, parse_identifier, parse_quality, parse_region, parse_rotation,
    parse_size,
};
pub use route::{Route, canonical_request};

/// IIIF Image API 2.x context and protocol URIs.
pub const CONTEXT_URI: &str = "http://iiif.io/api/image/2/context.json";
pub const PROTOCOL_URI: &str = "http://iiif.io/api/image";
/// Compliance level advertised in `info.json` and in the image `Link` header.
pub const COMPLIANCE_LEVEL_URI: &str = "http://iiif.io/api/image/2/level2.json";
