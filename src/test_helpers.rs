//! Shared test utilities.
//!
//! Fixtures are built in a temp directory laid out the way a deployment is:
//!
//! ```text
//! <tmp>/
//! ├── images/     # setup_images writes <identifier>.<ext> files here
//! └── cache/      # test_config points the response cache here
//! ```
//!
//! The image files hold placeholder bytes; tests pair them with
//! `MockBackend`, which never opens them.

use crate::config::ServerConfig;
use std::path::Path;
use tempfile::TempDir;

/// Create `<tmp>/images/` holding one placeholder file per
/// `(identifier, extension)` pair.
pub fn setup_images(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let images = tmp.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    for (identifier, ext) in files {
        std::fs::write(images.join(format!("{identifier}.{ext}")), b"placeholder").unwrap();
    }
    tmp
}

/// Default config with `images_dir` and `cache_dir` inside `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        images_dir: root.join("images").to_string_lossy().to_string(),
        cache_dir: root.join("cache").to_string_lossy().to_string(),
        ..ServerConfig::default()
    }
}
