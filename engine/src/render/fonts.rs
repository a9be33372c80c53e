//! System font resolution for the overlay text.
//!
//! Each font family token maps to a fixed stack of well-known font files
//! (Noto Sans, DejaVu, Ubuntu, Liberation) resolved from the system font
//! directories, the way the original deployment resolved its CSS-style
//! font stacks through the host.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ab_glyph::FontArc;
use tracing::{debug, warn};

use crate::render::overlay::FontFamily;

/// Directories scanned (recursively) for font files.
const SYSTEM_FONT_DIRS: &[&str] = &["/usr/share/fonts", "/usr/local/share/fonts"];

/// Candidate file names per family, best match first. Bold cuts lead
/// because the overlay text is always drawn bold.
fn candidates(family: FontFamily) -> &'static [&'static str] {
    match family {
        FontFamily::Sans => &[
            "NotoSans-Bold.ttf",
            "DejaVuSans-Bold.ttf",
            "Ubuntu-Bold.ttf",
            "LiberationSans-Bold.ttf",
            "NotoSans-Regular.ttf",
            "DejaVuSans.ttf",
            "LiberationSans-Regular.ttf",
        ],
        FontFamily::Serif => &[
            "DejaVuSerif-Bold.ttf",
            "NotoSerif-Bold.ttf",
            "LiberationSerif-Bold.ttf",
            "DejaVuSerif.ttf",
            "LiberationSerif-Regular.ttf",
        ],
        FontFamily::Mono => &[
            "UbuntuMono-Bold.ttf",
            "DejaVuSansMono-Bold.ttf",
            "LiberationMono-Bold.ttf",
            "DejaVuSansMono.ttf",
            "LiberationMono-Regular.ttf",
        ],
        FontFamily::Ubuntu => &[
            "Ubuntu-Bold.ttf",
            "NotoSans-Bold.ttf",
            "DejaVuSans-Bold.ttf",
            "DejaVuSans.ttf",
        ],
    }
}

/// Resolves and caches fonts per family.
pub struct FontCatalog {
    dirs: Vec<PathBuf>,
    cache: Mutex<HashMap<FontFamily, Option<FontArc>>>,
}

impl FontCatalog {
    /// Catalog over the system font directories plus an optional extra one.
    pub fn new(extra_dir: Option<&str>) -> Self {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(dir) = extra_dir {
            dirs.push(PathBuf::from(dir));
        }
        dirs.extend(SYSTEM_FONT_DIRS.iter().map(PathBuf::from));
        FontCatalog {
            dirs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load the best available font for the family, or `None` when no
    /// candidate file exists on this host.
    pub fn load(&self, family: FontFamily) -> Option<FontArc> {
        if let Some(cached) = self.cache.lock().unwrap().get(&family) {
            return cached.clone();
        }

        let font = self.resolve(family);
        if font.is_none() {
            warn!(family = ?family, "font_not_found");
        }
        self.cache.lock().unwrap().insert(family, font.clone());
        font
    }

    fn resolve(&self, family: FontFamily) -> Option<FontArc> {
        for name in candidates(family) {
            for dir in &self.dirs {
                if let Some(path) = find_file(dir, name, 0) {
                    match std::fs::read(&path) {
                        Ok(bytes) => match FontArc::try_from_vec(bytes) {
                            Ok(font) => {
                                debug!(family = ?family, path = %path.display(), "font_resolved");
                                return Some(font);
                            }
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "font_parse_failed");
                            }
                        },
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "font_read_failed");
                        }
                    }
                }
            }
        }
        None
    }
}

/// Depth-limited recursive search for a file by exact name.
fn find_file(dir: &Path, name: &str, depth: usize) -> Option<PathBuf> {
    if depth > 4 {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().map(|f| f == name).unwrap_or(false) {
            return Some(path);
        }
    }
    subdirs
        .into_iter()
        .find_map(|sub| find_file(&sub, name, depth + 1))
}
