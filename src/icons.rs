//! Icon lookup and the temporary files derived from icons while rendering.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

/// Maps a logical icon reference (usually a URL) to a readable file.
pub trait AssetResolver {
    fn resolve(&self, icon_url: &str) -> Option<PathBuf>;
}

impl<F> AssetResolver for F
where
    F: Fn(&str) -> Option<PathBuf>,
{
    fn resolve(&self, icon_url: &str) -> Option<PathBuf> {
        self(icon_url)
    }
}

/// Resolves nothing; every icon is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetResolver for NoAssets {
    fn resolve(&self, _icon_url: &str) -> Option<PathBuf> {
        None
    }
}

/// Replaces a URL prefix with a local directory, keeping the rest of the path.
///
/// References that do not start with the prefix are treated as plain paths.
/// Only files that exist are returned.
#[derive(Debug, Clone)]
pub struct PrefixResolver {
    prefix: String,
    root: PathBuf,
}

impl PrefixResolver {
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            root: root.into(),
        }
    }
}

impl AssetResolver for PrefixResolver {
    fn resolve(&self, icon_url: &str) -> Option<PathBuf> {
        if icon_url.is_empty() {
            return None;
        }
        let path = match icon_url.strip_prefix(self.prefix.as_str()) {
            Some(rest) if !self.prefix.is_empty() => self.root.join(rest.trim_start_matches('/')),
            _ => PathBuf::from(icon_url),
        };
        if path.is_file() {
            Some(path)
        } else {
            debug!(icon = icon_url, path = %path.display(), "icon file not found");
            None
        }
    }
}

/// Temporary files created during a render. They are deleted when this value
/// is dropped.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    dir: Option<PathBuf>,
    files: Vec<TempPath>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            files: Vec::new(),
        }
    }

    pub fn store(&mut self, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("img-").suffix(".png");
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        let location = path.to_path_buf();
        self.files.push(path);
        Ok(location)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|path| path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Stops tracking the files so they survive this value. The caller becomes
    /// responsible for removing them.
    pub fn keep(&mut self) -> io::Result<Vec<PathBuf>> {
        self.files
            .drain(..)
            .map(|path| path.keep().map_err(io::Error::from))
            .collect()
    }
}

/// Produces an opaque white silhouette of an icon, used to mask the edges
/// running below a faded icon.
pub trait IconFilter {
    fn whiten(&self, icon: &Path, artifacts: &mut TempArtifacts) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFilter;

impl IconFilter for NoFilter {
    fn whiten(&self, _icon: &Path, _artifacts: &mut TempArtifacts) -> Option<PathBuf> {
        None
    }
}

/// Whitens PNG icons with tiny-skia, keeping the alpha channel.
#[cfg(feature = "raster")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WhiteningFilter;

#[cfg(feature = "raster")]
impl IconFilter for WhiteningFilter {
    fn whiten(&self, icon: &Path, artifacts: &mut TempArtifacts) -> Option<PathBuf> {
        use tiny_skia::{Pixmap, PremultipliedColorU8};

        let mut pixmap = match Pixmap::load_png(icon) {
            Ok(pixmap) => pixmap,
            Err(err) => {
                warn!(icon = %icon.display(), "cannot whiten icon: {err}");
                return None;
            }
        };

        for pixel in pixmap.pixels_mut() {
            let alpha = pixel.alpha();
            if let Some(white) = PremultipliedColorU8::from_rgba(alpha, alpha, alpha, alpha) {
                *pixel = white;
            }
        }

        let bytes = match pixmap.encode_png() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(icon = %icon.display(), "cannot encode whitened icon: {err}");
                return None;
            }
        };

        match artifacts.store(&bytes) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("cannot store whitened icon: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prefix_is_replaced_by_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("icons")).unwrap();
        std::fs::write(dir.path().join("icons/server.png"), b"png").unwrap();

        let resolver = PrefixResolver::new("https://cmdb.example/modules/", dir.path());
        assert_eq!(
            resolver.resolve("https://cmdb.example/modules/icons/server.png"),
            Some(dir.path().join("icons/server.png"))
        );
        assert_eq!(
            resolver.resolve("https://cmdb.example/modules/icons/missing.png"),
            None
        );
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn closures_resolve_assets() {
        let resolver = |url: &str| (url == "known").then(|| PathBuf::from("/tmp/known.png"));
        assert!(resolver.resolve("known").is_some());
        assert!(resolver.resolve("other").is_none());
    }

    #[test]
    fn artifacts_are_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let mut artifacts = TempArtifacts::in_dir(dir.path());
        let path = artifacts.store(b"data").unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("img-"));
        assert_eq!(artifacts.len(), 1);

        drop(artifacts);
        assert!(!path.exists());
    }

    #[test]
    fn kept_artifacts_outlive_the_owner() {
        let dir = TempDir::new().unwrap();
        let mut artifacts = TempArtifacts::in_dir(dir.path());
        let stored = artifacts.store(b"data").unwrap();

        let kept = artifacts.keep().unwrap();
        assert_eq!(kept, vec![stored.clone()]);
        assert!(artifacts.is_empty());

        drop(artifacts);
        assert!(stored.exists());
    }

    #[test]
    fn no_filter_never_whitens() {
        let mut artifacts = TempArtifacts::new();
        assert!(NoFilter.whiten(Path::new("icon.png"), &mut artifacts).is_none());
        assert!(artifacts.is_empty());
    }

    #[cfg(feature = "raster")]
    #[test]
    fn whitening_keeps_alpha_and_drops_color() {
        use tiny_skia::{Color, Pixmap};

        let dir = TempDir::new().unwrap();
        let icon = dir.path().join("icon.png");
        let mut pixmap = Pixmap::new(2, 1).unwrap();
        pixmap.fill(Color::from_rgba8(200, 10, 10, 255));
        pixmap.save_png(&icon).unwrap();

        let mut artifacts = TempArtifacts::in_dir(dir.path());
        let whitened = WhiteningFilter.whiten(&icon, &mut artifacts).unwrap();

        let result = Pixmap::load_png(&whitened).unwrap();
        for pixel in result.pixels() {
            assert_eq!(
                (pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()),
                (255, 255, 255, 255)
            );
        }
    }

    #[cfg(feature = "raster")]
    #[test]
    fn unreadable_icons_are_not_whitened() {
        let dir = TempDir::new().unwrap();
        let icon = dir.path().join("broken.png");
        std::fs::write(&icon, b"not a png").unwrap();
        let mut artifacts = TempArtifacts::new();
        assert!(WhiteningFilter.whiten(&icon, &mut artifacts).is_none());
    }
}
