//! `info.json` assembly and source-file discovery.
//!
//! Source images live flat in the images directory as
//! `<images_dir>/<identifier>.<ext>`. An identifier may be stored in more
//! than one format; discovery checks the extensions in canonical
//! [`OutputFormat::ALL`] order and the first hit is the one probed for
//! dimensions.

use crate::iiif::{COMPLIANCE_LEVEL_URI, CONTEXT_URI, Identifier, OutputFormat, PROTOCOL_URI};
use crate::imaging::{BackendError, ImageBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfoError {
    #[error("no stored image in a supported format for {0:?}")]
    NoSupportedFormat(String),
    #[error("failed to read dimensions of {path}: {source}")]
    ProbeFailed {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
}

/// IIIF Image API 2 image information document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoDocument {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@id")]
    pub id: String,
    pub protocol: String,
    pub width: u32,
    pub height: u32,
    pub profile: Vec<ProfileEntry>,
}

/// One element of the `profile` array: the compliance level URI, followed by
/// an object listing extra formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileEntry {
    Level(String),
    Formats { formats: Vec<String> },
}

/// Where `identifier` would be stored in `format`.
pub fn source_path(images_dir: &Path, identifier: &Identifier, format: OutputFormat) -> PathBuf {
    images_dir.join(format!("{}.{}", identifier, format.extension()))
}

/// Formats `identifier` is stored in, in canonical order.
pub fn discover_formats(images_dir: &Path, identifier: &Identifier) -> Vec<OutputFormat> {
    OutputFormat::ALL
        .into_iter()
        .filter(|&format| source_path(images_dir, identifier, format).is_file())
        .collect()
}

/// Pick the stored file to transform for a request in `requested` format.
///
/// A file already in the requested format wins; otherwise the first
/// discovered format is converted.
pub fn select_source(
    images_dir: &Path,
    identifier: &Identifier,
    requested: OutputFormat,
) -> Result<PathBuf, InfoError> {
    let formats = discover_formats(images_dir, identifier);
    let chosen = if formats.contains(&requested) {
        requested
    } else {
        *formats
            .first()
            .ok_or_else(|| InfoError::NoSupportedFormat(identifier.to_string()))?
    };
    Ok(source_path(images_dir, identifier, chosen))
}

/// Build the info document for `identifier`, published under
/// `{base_url}/{prefix}/{identifier}`.
pub fn describe(
    backend: &impl ImageBackend,
    images_dir: &Path,
    base_url: &str,
    identifier: &Identifier,
    prefix: &str,
) -> Result<InfoDocument, InfoError> {
    let formats = discover_formats(images_dir, identifier);
    let first = formats
        .first()
        .ok_or_else(|| InfoError::NoSupportedFormat(identifier.to_string()))?;

    let path = source_path(images_dir, identifier, *first);
    let dims = backend
        .identify(&path)
        .map_err(|source| InfoError::ProbeFailed { path, source })?;

    Ok(InfoDocument {
        context: CONTEXT_URI.to_string(),
        id: format!("{}/{}/{}", base_url.trim_end_matches('/'), prefix, identifier),
        protocol: PROTOCOL_URI.to_string(),
        width: dims.width,
        height: dims.height,
        profile: vec![
            ProfileEntry::Level(COMPLIANCE_LEVEL_URI.to_string()),
            ProfileEntry::Formats {
                formats: formats
                    .iter()
                    .map(|f| f.extension().to_string())
                    .collect(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iiif::parse_identifier;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::setup_images;
    use tempfile::TempDir;

    fn id(raw: &str) -> Identifier {
        parse_identifier(raw).unwrap()
    }

    fn images(tmp: &TempDir) -> PathBuf {
        tmp.path().join("images")
    }

    #[test]
    fn discovery_follows_canonical_order() {
        let tmp = setup_images(&[("cat", "webp"), ("cat", "png"), ("cat", "jpg"), ("dog", "tif")]);
        let formats = discover_formats(&images(&tmp), &id("cat"));
        assert_eq!(
            formats,
            vec![OutputFormat::Jpg, OutputFormat::Png, OutputFormat::Webp]
        );
    }

    #[test]
    fn discovery_ignores_unknown_extensions_and_directories() {
        let tmp = setup_images(&[("cat", "bmp")]);
        std::fs::create_dir(images(&tmp).join("cat.jpg")).unwrap();
        assert!(discover_formats(&images(&tmp), &id("cat")).is_empty());
    }

    #[test]
    fn select_source_prefers_requested_format() {
        let tmp = setup_images(&[("cat", "jpg"), ("cat", "png")]);
        assert_eq!(
            select_source(&images(&tmp), &id("cat"), OutputFormat::Png).unwrap(),
            images(&tmp).join("cat.png")
        );
        assert_eq!(
            select_source(&images(&tmp), &id("cat"), OutputFormat::Gif).unwrap(),
            images(&tmp).join("cat.jpg")
        );
    }

    #[test]
    fn select_source_without_files_is_not_found() {
        let tmp = setup_images(&[]);
        assert!(matches!(
            select_source(&images(&tmp), &id("cat"), OutputFormat::Jpg),
            Err(InfoError::NoSupportedFormat(name)) if name == "cat"
        ));
    }

    #[test]
    fn describe_builds_document() {
        let tmp = setup_images(&[("cat", "png"), ("cat", "jpg")]);
        let backend = MockBackend::with_dimensions(1024, 768);

        let doc = describe(
            &backend,
            &images(&tmp),
            "http://localhost:8080/",
            &id("cat"),
            "iiif",
        )
        .unwrap();

        assert_eq!(doc.id, "http://localhost:8080/iiif/cat");
        assert_eq!(doc.width, 1024);
        assert_eq!(doc.height, 768);
        assert_eq!(
            doc.profile,
            vec![
                ProfileEntry::Level(COMPLIANCE_LEVEL_URI.to_string()),
                ProfileEntry::Formats {
                    formats: vec!["jpg".into(), "png".into()]
                },
            ]
        );

        // The first discovered format is the one probed.
        let expected = images(&tmp).join("cat.jpg").to_string_lossy().to_string();
        assert_eq!(backend.get_operations(), vec![RecordedOp::Identify(expected)]);
    }

    #[test]
    fn describe_serializes_iiif_field_names() {
        let tmp = setup_images(&[("cat", "jpg")]);
        let backend = MockBackend::with_dimensions(10, 20);
        let doc = describe(&backend, &images(&tmp), "http://x", &id("cat"), "iiif").unwrap();

        let json: serde_json::Value = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["@context"], CONTEXT_URI);
        assert_eq!(json["@id"], "http://x/iiif/cat");
        assert_eq!(json["protocol"], PROTOCOL_URI);
        assert_eq!(json["width"], 10);
        assert_eq!(json["height"], 20);
        assert_eq!(json["profile"][0], COMPLIANCE_LEVEL_URI);
        assert_eq!(json["profile"][1]["formats"][0], "jpg");

        let back: InfoDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn describe_unknown_identifier_is_not_found() {
        let tmp = setup_images(&[("dog", "jpg")]);
        let backend = MockBackend::new();
        let err = describe(&backend, &images(&tmp), "http://x", &id("cat"), "iiif").unwrap_err();
        assert!(matches!(err, InfoError::NoSupportedFormat(_)));
        assert_eq!(backend.identify_count(), 0);
    }

    #[test]
    fn describe_probe_failure() {
        let tmp = setup_images(&[("cat", "jpg")]);
        let backend = MockBackend {
            dimensions: None,
            ..MockBackend::default()
        };
        let err = describe(&backend, &images(&tmp), "http://x", &id("cat"), "iiif").unwrap_err();
        assert!(matches!(err, InfoError::ProbeFailed { .. }));
    }
}
