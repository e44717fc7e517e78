//! Image discovery and decoding utilities.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use walkdir::WalkDir;

/// Longest side uploaded as a texture; larger images are downscaled first.
pub const MAX_TEXTURE_SIDE: u32 = 4096;

/// Decoded RGBA pixels ready to hand to the UI thread.
#[derive(Clone)]
pub struct ViewerImage {
    /// Width and height in pixels.
    pub size: [usize; 2],
    /// Unmultiplied RGBA8, row-major.
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for ViewerImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerImage").field("size", &self.size).finish()
    }
}

/// Collect the file names of supported images directly inside `folder`.
///
/// Names are kept as the OS returns them so every file can be opened again.
pub fn collect_image_names(folder: &Path) -> Result<BTreeSet<OsString>> {
    let mut names = BTreeSet::new();
    for entry in WalkDir::new(folder).follow_links(true).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to scan {}", folder.display()))?;
        if !entry.file_type().is_file() || !is_supported_image(entry.path()) {
            continue;
        }
        names.insert(entry.file_name().to_os_string());
    }
    Ok(names)
}

pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) => matches!(
            ext.to_ascii_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "tif" | "tiff" | "webp"
        ),
        None => false,
    }
}

/// Decode `path` into RGBA, downscaling anything larger than [`MAX_TEXTURE_SIDE`].
pub fn load_viewer_image(path: &Path) -> Result<ViewerImage> {
    let mut img = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    if img.width() > MAX_TEXTURE_SIDE || img.height() > MAX_TEXTURE_SIDE {
        img = img.resize(MAX_TEXTURE_SIDE, MAX_TEXTURE_SIDE, FilterType::Lanczos3);
    }
    let rgba = img.to_rgba8();
    Ok(ViewerImage {
        size: [rgba.width() as usize, rgba.height() as usize],
        pixels: rgba.into_raw(),
    })
}
