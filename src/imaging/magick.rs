//! ImageMagick backend.
//!
//! ## Tool mapping
//!
//! | Operation | How |
//! |---|---|
//! | Transform | `convert <args…>` with the output sink `coder:-`, stdout captured |
//! | Identify (`identify` mode) | `identify -ping -format "%w,%h\n" <path>` |
//! | Identify (`native` mode) | `image::image_dimensions`, header read only |
//!
//! Both subprocesses run under the same timeout.

use super::args::ArgumentVector;
use super::backend::{BackendError, Dimensions, ImageBackend, parse_dimensions};
use super::exec;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

/// How source dimensions are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Spawn ImageMagick `identify`. Works for every format ImageMagick reads.
    #[default]
    Identify,
    /// Read the header in-process. JPEG, PNG, TIFF, GIF and WebP only.
    Native,
}

pub struct ImageMagickBackend {
    convert: String,
    identify: String,
    probe: ProbeMode,
    timeout: Duration,
}

impl ImageMagickBackend {
    pub fn new(convert: impl Into<String>, identify: impl Into<String>) -> Self {
        Self {
            convert: convert.into(),
            identify: identify.into(),
            probe: ProbeMode::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_probe(mut self, probe: ProbeMode) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ImageMagickBackend {
    fn default() -> Self {
        Self::new("convert", "identify")
    }
}

impl ImageBackend for ImageMagickBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        match self.probe {
            ProbeMode::Identify => {
                let out = exec::run(
                    &self.identify,
                    [
                        OsStr::new("-ping"),
                        OsStr::new("-format"),
                        OsStr::new("%w,%h\n"),
                        path.as_os_str(),
                    ],
                    self.timeout,
                )?;
                parse_dimensions(&String::from_utf8_lossy(&out))
            }
            ProbeMode::Native => {
                let (width, height) = image::image_dimensions(path)
                    .map_err(|e| BackendError::BadOutput(format!("{}: {e}", path.display())))?;
                Ok(Dimensions { width, height })
            }
        }
    }

    fn transform(&self, args: &ArgumentVector) -> Result<Vec<u8>, BackendError> {
        log::debug!("{} {}", self.convert, args);
        let out = exec::run(&self.convert, args.as_slice(), self.timeout)?;
        if out.is_empty() {
            return Err(BackendError::BadOutput(format!(
                "`{}` produced no output",
                self.convert
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn native_probe_reads_png_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tiny.png");
        image::RgbImage::new(7, 3).save(&path).unwrap();

        let backend = ImageMagickBackend::default().with_probe(ProbeMode::Native);
        assert_eq!(
            backend.identify(&path).unwrap(),
            Dimensions {
                width: 7,
                height: 3
            }
        );
    }

    #[test]
    fn native_probe_rejects_non_images() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.png");
        std::fs::write(&path, "not an image").unwrap();

        let backend = ImageMagickBackend::default().with_probe(ProbeMode::Native);
        assert!(matches!(
            backend.identify(&path),
            Err(BackendError::BadOutput(_))
        ));
    }

    #[test]
    fn probe_mode_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            probe: ProbeMode,
        }
        let w: Wrapper = toml::from_str(r#"probe = "native""#).unwrap();
        assert_eq!(w.probe, ProbeMode::Native);
        let w: Wrapper = toml::from_str(r#"probe = "identify""#).unwrap();
        assert_eq!(w.probe, ProbeMode::Identify);
    }

    // =========================================================================
    // ImageMagick integration tests (require ImageMagick)
    // =========================================================================

    use crate::iiif::ImageRequest;
    use crate::imaging::args::{SynthesisOptions, synthesize};

    fn create_test_image(path: &Path, width: u32, height: u32) {
        let size = format!("{width}x{height}");
        let out = std::process::Command::new("convert")
            .args(["-size", size.as_str(), "xc:gray", path.to_str().unwrap()])
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "convert failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
    }

    /// Probe `source`, synthesize `request` against it and run the transform.
    fn render(
        source: &Path,
        region: &str,
        size: &str,
        rotation: &str,
        quality_format: &str,
        options: &SynthesisOptions,
    ) -> Vec<u8> {
        let backend = ImageMagickBackend::default();
        let req = ImageRequest::parse("src", region, size, rotation, quality_format).unwrap();
        let dims = backend.identify(source).unwrap();
        let args = synthesize(&req, Some(dims), source, options).unwrap();
        backend.transform(&args).unwrap()
    }

    fn dimensions_of(bytes: &[u8], dir: &Path, ext: &str) -> Dimensions {
        let path = dir.join(format!("out.{ext}"));
        std::fs::write(&path, bytes).unwrap();
        ImageMagickBackend::default().identify(&path).unwrap()
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn identify_reads_real_dimensions() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src.png");
        create_test_image(&source, 1000, 500);

        assert_eq!(
            ImageMagickBackend::default().identify(&source).unwrap(),
            Dimensions {
                width: 1000,
                height: 500
            }
        );
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn percent_region_crops_fractional_width() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src.png");
        create_test_image(&source, 1000, 500);

        // -crop 50.5x25%+100+100
        let bytes = render(
            &source,
            "pct:10,20,50.5,25",
            "full",
            "0",
            "default.jpg",
            &SynthesisOptions::default(),
        );
        assert_eq!(
            dimensions_of(&bytes, tmp.path(), "jpg"),
            Dimensions {
                width: 505,
                height: 125
            }
        );
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn best_fit_and_rotation_produce_expected_box() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src.png");
        create_test_image(&source, 1000, 500);

        let bytes = render(
            &source,
            "full",
            "!200,200",
            "90",
            "gray.png",
            &SynthesisOptions::default(),
        );
        assert_eq!(
            dimensions_of(&bytes, tmp.path(), "png"),
            Dimensions {
                width: 100,
                height: 200
            }
        );
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn tif_request_yields_tiff_bytes() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src.png");
        create_test_image(&source, 64, 32);

        let bytes = render(
            &source,
            "full",
            "full",
            "0",
            "default.tif",
            &SynthesisOptions::default(),
        );
        assert!(
            bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"),
            "not a TIFF header: {:?}",
            &bytes[..bytes.len().min(4)]
        );
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn memory_limit_is_accepted_by_convert() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src.png");
        create_test_image(&source, 64, 32);

        let options = SynthesisOptions {
            memory_limit: Some("256MiB".into()),
        };
        let bytes = render(&source, "full", "32,", "0", "default.jpg", &options);
        assert!(bytes.starts_with(&[0xFF, 0xD8]), "not a JPEG");
        assert_eq!(
            dimensions_of(&bytes, tmp.path(), "jpg"),
            Dimensions {
                width: 32,
                height: 16
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn transform_rejects_empty_output() {
        let backend = ImageMagickBackend::new("true", "identify");
        let args = ArgumentVector::from(vec!["in.jpg".to_string(), "jpg:-".to_string()]);
        assert!(matches!(
            backend.transform(&args),
            Err(BackendError::BadOutput(_))
        ));
    }
}
