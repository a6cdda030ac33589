//! # IIIF Server
//!
//! A small IIIF Image API 2 server. Clients ask for a region of a stored
//! image, scaled, rotated, color-treated and encoded in a chosen format, all
//! spelled out in the URL path:
//!
//! ```text
//! /iiif/cat/pct:10,10,50,50/!400,400/90/gray.png
//!  │     │   │               │        │  │    └─ format
//!  │     │   │               │        │  └─ quality
//!  │     │   │               │        └─ rotation
//!  │     │   │               └─ size
//!  │     │   └─ region
//!  │     └─ identifier
//!  └─ prefix
//! ```
//!
//! The request is validated into typed parameters, translated into an
//! argument vector for ImageMagick `convert`, run, and the bytes cached on
//! disk under the hash of the request string.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`iiif`] | URL routing and the parameter grammar: typed requests, parse errors, percent-region geometry |
//! | [`imaging`] | `convert` argument synthesis, the `ImageBackend` trait and its ImageMagick implementation |
//! | [`cache`] | Content-addressed on-disk response cache with staged writes |
//! | [`flight`] | Per-key single-flight so concurrent identical requests render once |
//! | [`info`] | Source-format discovery and the `info.json` document |
//! | [`service`] | Orchestration of one request: cache, single-flight, probe, synthesize, transform |
//! | [`serve`] | Blocking HTTP front end over `tiny_http` with a rayon worker pool |
//! | [`config`] | `config.toml` loading, merging over defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Argument Vectors, Never a Shell
//!
//! Every directive and value handed to ImageMagick is its own `argv` element.
//! Identifiers are restricted by the parser, but even a hostile one can only
//! ever name a file; it cannot become a second command.
//!
//! ## Probe Only When Needed
//!
//! Only percentage regions need the source dimensions, so only they pay for
//! an `identify` run. Everything else goes straight to `convert`.
//!
//! ## One File Per Cache Entry
//!
//! The content type and the bytes share a single file, published with one
//! rename. There is no window in which a reader can see bytes without their
//! type or a half-written image.

pub mod cache;
pub mod config;
pub mod flight;
pub mod iiif;
pub mod imaging;
pub mod info;
pub mod output;
pub mod serve;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;
