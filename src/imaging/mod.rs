//! Image tooling: ImageMagick behind a trait.
//!
//! | Operation | Tool |
//! |---|---|
//! | **Identify** | `identify -ping`, or `image::image_dimensions` in native mode |
//! | **Transform** | `convert`, argument vector in, encoded bytes out on stdout |
//!
//! The module is split into:
//! - **Arguments**: [`synthesize`] turns a parsed request into an [`ArgumentVector`]
//! - **Backend**: [`ImageBackend`] trait + [`ImageMagickBackend`]
//! - **Exec**: bounded subprocess execution shared by both tools

pub mod args;
pub mod backend;
mod exec;
pub mod magick;

pub use args::{ArgumentVector, SynthesisError, SynthesisOptions, synthesize};
pub use backend::{BackendError, Dimensions, ImageBackend, parse_dimensions};
pub use magick::{ImageMagickBackend, ProbeMode};
