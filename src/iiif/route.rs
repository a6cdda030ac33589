//! URL shapes served by the IIIF front end.
//!
//! ```text
//! /                                                           → Root
//! /{prefix}/{identifier}                                      → Base (redirect)
//! /{prefix}/{identifier}/info.json                            → Info
//! /{prefix}/{identifier}/{region}/{size}/{rotation}/{q}.{fmt} → Image
//! ```
//!
//! The path is split on `/` *before* percent-decoding, and each segment is
//! decoded on its own. An encoded slash (`%2F`) therefore stays inside its
//! segment, where the identifier rules reject it.

use super::parse::{ParseError, parse_identifier};
use super::params::{Identifier, ImageRequest};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;

const INFO_SEGMENT: &str = "info.json";

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Root,
    Base { prefix: String, identifier: Identifier },
    Info { prefix: String, identifier: Identifier },
    Image { prefix: String, request: ImageRequest },
}

impl Route {
    /// Match a raw request path (query string allowed, it is ignored).
    ///
    /// Returns `Ok(None)` for paths that fit none of the shapes, and an error
    /// when the shape matches but a segment fails its grammar.
    pub fn parse(raw: &str) -> Result<Option<Route>, ParseError> {
        let path = strip_query(raw);
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return Ok(Some(Route::Root));
        }

        let segments: Vec<Cow<'_, str>> = trimmed.split('/').map(decode_segment).collect();
        let segments: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();

        let route = match segments.as_slice() {
            [prefix, identifier] if !prefix.is_empty() => Route::Base {
                prefix: prefix.to_string(),
                identifier: parse_identifier(identifier)?,
            },
            [prefix, identifier, info] if !prefix.is_empty() && *info == INFO_SEGMENT => {
                Route::Info {
                    prefix: prefix.to_string(),
                    identifier: parse_identifier(identifier)?,
                }
            }
            [prefix, identifier, region, size, rotation, quality_format]
                if !prefix.is_empty() =>
            {
                Route::Image {
                    prefix: prefix.to_string(),
                    request: ImageRequest::parse(
                        identifier,
                        region,
                        size,
                        rotation,
                        quality_format,
                    )?,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(route))
    }
}

/// The canonical request string used as cache-key input: the decoded path,
/// plus the query string verbatim when present.
pub fn canonical_request(raw: &str) -> String {
    match raw.split_once('?') {
        Some((path, query)) => format!("{}?{}", percent_decode_str(path).decode_utf8_lossy(), query),
        None => percent_decode_str(raw).decode_utf8_lossy().into_owned(),
    }
}

fn strip_query(raw: &str) -> &str {
    raw.split_once('?').map_or(raw, |(path, _)| path)
}

fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8_lossy()
}
