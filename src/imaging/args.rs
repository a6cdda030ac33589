//! Transform argument synthesis.
//!
//! Turns a parsed [`ImageRequest`] into the argument vector for ImageMagick's
//! `convert`. Each directive and each value is its own element; the vector is
//! handed to the OS as-is and never joined into a shell command line, so
//! nothing in a request can be interpreted by a shell.
//!
//! Clause order is fixed:
//!
//! ```text
//! [-crop G] [-resize G] [-flop] [-rotate D] [-colorspace Gray [-type Bilevel]]
//! [-limit memory M] INPUT CODER:-
//! ```

use super::backend::Dimensions;
use crate::iiif::{ImageRequest, Quality, Region, Rotation, Size, resolve};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    /// A value the parser should never have produced.
    #[error("unrecognized {0}")]
    UnrecognizedVariant(String),
    #[error("percentage region without source dimensions")]
    MissingDimensions,
}

/// Ordered arguments for one transform invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, arg: impl Into<String>) {
        self.0.push(arg.into());
    }
}

impl From<Vec<String>> for ArgumentVector {
    fn from(args: Vec<String>) -> Self {
        Self(args)
    }
}

/// Space-joined, for logs only. Never feed this to a shell.
impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Knobs that come from configuration rather than the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOptions {
    /// Value for `-limit memory`, e.g. `"256MiB"`.
    pub memory_limit: Option<String>,
}

/// Build the argument vector for `req`, reading from `input`.
///
/// `dims` is only consulted for [`Region::PercentBox`]; callers probe the
/// source only in that case.
pub fn synthesize(
    req: &ImageRequest,
    dims: Option<Dimensions>,
    input: &Path,
    options: &SynthesisOptions,
) -> Result<ArgumentVector, SynthesisError> {
    let mut args = ArgumentVector::default();

    match req.region {
        Region::Full => {}
        Region::ExactPixels { x, y, w, h } => {
            args.push("-crop");
            args.push(format!("{w}x{h}+{x}+{y}"));
        }
        Region::PercentBox { x, y, w, h } => {
            for v in [x, y, w, h] {
                finite(v, "percent region")?;
            }
            let dims = dims.ok_or(SynthesisError::MissingDimensions)?;
            let crop = resolve(x, y, w, h, dims);
            args.push("-crop");
            args.push(format!(
                "{}x{}%{:+}{:+}",
                crop.width_pct, crop.height_pct, crop.offset_x, crop.offset_y
            ));
        }
    }

    match req.size {
        Size::Full => {}
        Size::FixedHeight { h } => {
            args.push("-resize");
            args.push(format!("x{h}"));
        }
        Size::FixedWidth { w } => {
            args.push("-resize");
            args.push(format!("{w}x"));
        }
        Size::ExactWH { w, h } => {
            args.push("-resize");
            args.push(format!("{w}x{h}!"));
        }
        Size::PercentScale { pct } => {
            finite(pct, "percent size")?;
            args.push("-resize");
            args.push(format!("{pct}%"));
        }
        Size::BestFitWH { w, h } => {
            args.push("-resize");
            args.push(format!("{w}x{h}"));
        }
    }

    let degrees = req.rotation.degrees();
    if !degrees.is_finite() || !(0.0..=360.0).contains(&degrees) {
        return Err(SynthesisError::UnrecognizedVariant(format!(
            "rotation {degrees}"
        )));
    }
    if let Rotation::Mirrored { .. } = req.rotation {
        args.push("-flop");
    }
    if degrees != 0.0 {
        args.push("-rotate");
        args.push(degrees.to_string());
    }

    match req.quality {
        Quality::Default | Quality::Color => {}
        Quality::Gray => {
            args.push("-colorspace");
            args.push("Gray");
        }
        Quality::Bitonal => {
            args.push("-colorspace");
            args.push("Gray");
            args.push("-type");
            args.push("Bilevel");
        }
    }

    if let Some(limit) = &options.memory_limit {
        args.push("-limit");
        args.push("memory");
        args.push(limit.clone());
    }

    args.push(input.to_string_lossy());
    args.push(format!("{}:-", req.format.coder()));

    Ok(args)
}

fn finite(value: f64, what: &str) -> Result<(), SynthesisError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SynthesisError::UnrecognizedVariant(format!("{what} {value}")))
    }
}
