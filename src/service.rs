//! Request orchestration.
//!
//! [`ImageService`] ties the pieces together for one image request:
//!
//! ```text
//! route + parse ─► cache get ─hit─► bytes
//!                      │
//!                     miss
//!                      ▼
//!              single-flight join ─(waiter)─► leader's result
//!                      │
//!                   (leader)
//!                      ▼
//!   cache re-check ─► source lookup ─► probe (pct regions only)
//!                 ─► synthesize ─► convert ─► cache put ─► bytes
//! ```
//!
//! Parse errors return before anything touches the filesystem. Cache
//! failures are logged and never hide a rendered response.

use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::config::ServerConfig;
use crate::flight::{Outcome, SingleFlight};
use crate::iiif::{Identifier, ImageRequest, ParseError, Region, Route, canonical_request};
use crate::imaging::{
    ArgumentVector, ImageBackend, ImageMagickBackend, SynthesisError, SynthesisOptions,
    synthesize,
};
use crate::info::{self, InfoDocument, InfoError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced to a client. `Clone` so one failed build can be handed
/// to every request that waited on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("not an image request: {0}")]
    NotAnImageRequest(String),
    #[error("no stored image in a supported format for {0:?}")]
    NoSupportedFormat(String),
    #[error("couldn't read source dimensions: {0}")]
    SourceProbeFailed(String),
    #[error("couldn't build transform arguments: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("transform failed: {0}")]
    ExternalProcessFailed(String),
    #[error("render abandoned by the request that started it")]
    BuildAbandoned,
}

impl From<InfoError> for ServiceError {
    fn from(err: InfoError) -> Self {
        match err {
            InfoError::NoSupportedFormat(id) => ServiceError::NoSupportedFormat(id),
            probe @ InfoError::ProbeFailed { .. } => {
                ServiceError::SourceProbeFailed(probe.to_string())
            }
        }
    }
}

/// Where the bytes of a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Read from the response cache.
    Cache,
    /// Rendered by this request.
    Rendered,
    /// Rendered by a concurrent identical request this one waited on.
    Shared,
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub entry: CacheEntry,
    pub provenance: Provenance,
}

/// What `convert` would be run with for a request.
#[derive(Debug, Clone)]
pub struct Plan {
    pub source: PathBuf,
    pub args: ArgumentVector,
}

/// Result of a leader's build, shared with waiters.
type BuildResult = Result<(CacheEntry, Provenance), ServiceError>;

pub struct ImageService<B: ImageBackend> {
    backend: B,
    images_dir: PathBuf,
    base_url: String,
    cache: ResponseCache,
    options: SynthesisOptions,
    flights: SingleFlight<CacheKey, BuildResult>,
}

impl ImageService<ImageMagickBackend> {
    /// Service backed by the ImageMagick tools named in `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        let backend = ImageMagickBackend::new(&config.tools.convert, &config.tools.identify)
            .with_probe(config.tools.probe)
            .with_timeout(config.tools.timeout());
        Self::new(backend, config)
    }
}

impl<B: ImageBackend> ImageService<B> {
    pub fn new(backend: B, config: &ServerConfig) -> Self {
        let cache = if config.cache.enabled {
            ResponseCache::new(config.cache_path())
        } else {
            ResponseCache::disabled(config.cache_path())
        };
        Self {
            backend,
            images_dir: config.images_path(),
            base_url: config.base_url.clone(),
            cache,
            options: SynthesisOptions {
                memory_limit: config.tools.memory_limit.clone(),
            },
            flights: SingleFlight::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Serve an image request given as a raw request path (query allowed).
    pub fn render(&self, raw: &str) -> Result<Rendered, ServiceError> {
        let request = image_request(raw)?;
        self.render_request(raw, &request)
    }

    /// Serve an already-parsed image request. `raw` is the request path it
    /// was parsed from and determines the cache key.
    pub fn render_request(
        &self,
        raw: &str,
        request: &ImageRequest,
    ) -> Result<Rendered, ServiceError> {
        let key = ResponseCache::key(&canonical_request(raw));

        if let Some(entry) = self.lookup(&key) {
            log::debug!("cache hit {raw}");
            return Ok(Rendered {
                entry,
                provenance: Provenance::Cache,
            });
        }

        let outcome = self
            .flights
            .run(&key, || self.build(raw, &key, request))
            .map_err(|_| ServiceError::BuildAbandoned)?;

        match outcome {
            Outcome::Led(result) => {
                let (entry, provenance) = result?;
                Ok(Rendered { entry, provenance })
            }
            Outcome::Joined(result) => {
                self.cache.stats().share();
                log::debug!("joined in-flight render of {raw}");
                let (entry, _) = result?;
                Ok(Rendered {
                    entry,
                    provenance: Provenance::Shared,
                })
            }
        }
    }

    /// Resolve the source and argument vector for an image request without
    /// running the transform. Percentage regions still probe the source.
    pub fn plan(&self, raw: &str) -> Result<Plan, ServiceError> {
        let request = image_request(raw)?;
        let source = info::select_source(&self.images_dir, &request.identifier, request.format)?;
        let args = self.synthesize_for(&request, &source)?;
        Ok(Plan { source, args })
    }

    /// Build the `info.json` document for `identifier` under `prefix`.
    pub fn info(&self, identifier: &Identifier, prefix: &str) -> Result<InfoDocument, ServiceError> {
        Ok(info::describe(
            &self.backend,
            &self.images_dir,
            &self.base_url,
            identifier,
            prefix,
        )?)
    }

    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.cache.get(key) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("{e}; rendering afresh");
                None
            }
        }
    }

    /// Runs once per key at a time, under the single-flight.
    fn build(&self, raw: &str, key: &CacheKey, request: &ImageRequest) -> BuildResult {
        // Another leader may have finished between our miss and our join.
        if let Some(entry) = self.lookup(key) {
            return Ok((entry, Provenance::Cache));
        }

        let source = info::select_source(&self.images_dir, &request.identifier, request.format)?;
        let args = self.synthesize_for(request, &source)?;

        log::info!("rendering {raw}");
        let bytes = self.backend.transform(&args).map_err(|e| {
            log::error!("transform failed for {raw}: {e}");
            log::error!("args were: {args}");
            ServiceError::ExternalProcessFailed(e.to_string())
        })?;
        self.cache.stats().build();

        let content_type = request.format.content_type();
        if let Err(e) = self.cache.put(key, &bytes, content_type) {
            log::warn!("{e}");
        }

        Ok((
            CacheEntry {
                bytes,
                content_type: content_type.to_string(),
            },
            Provenance::Rendered,
        ))
    }

    fn synthesize_for(
        &self,
        request: &ImageRequest,
        source: &Path,
    ) -> Result<ArgumentVector, ServiceError> {
        let dims = match request.region {
            Region::PercentBox { .. } => Some(self.backend.identify(source).map_err(|e| {
                log::error!("probe failed for {}: {e}", source.display());
                ServiceError::SourceProbeFailed(format!("{}: {e}", source.display()))
            })?),
            Region::Full | Region::ExactPixels { .. } => None,
        };
        Ok(synthesize(request, dims, source, &self.options)?)
    }
}

fn image_request(raw: &str) -> Result<ImageRequest, ServiceError> {
    match Route::parse(raw)? {
        Some(Route::Image { request, .. }) => Ok(request),
        _ => Err(ServiceError::NotAnImageRequest(raw.to_string())),
    }
}
