//! Texture loading and caching for imported materials.
//!
//! Textures are addressed by a cleaned base name (directory and extension
//! stripped), so every material that references the same image file shares
//! one entry. Missing files never fail a load; they resolve to a placeholder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during texture loading.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to load texture: {0}")]
    LoadError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Unsupported texture format: {0}")]
    UnsupportedFormat(String),
}

pub type TextureResult<T> = Result<T, TextureError>;

/// Index into a [`TextureCache`] (and later a mesh's texture table).
pub type TextureId = usize;

/// File name that produces a 1x1 white texture instead of reading from disk.
pub const WHITE_PLACEHOLDER: &str = "__white__gen ";

/// GPU format chosen for upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureFormat {
    #[default]
    Dxt1,
    Dxt5,
    Argb8888,
}

impl TextureFormat {
    /// DXT1 for opaque images, DXT5 with alpha, uncompressed when forced or for normal maps.
    pub fn choose(has_alpha: bool, force_rgb: bool, path: &str) -> Self {
        if force_rgb || path.contains("-norm_") {
            TextureFormat::Argb8888
        } else if has_alpha {
            TextureFormat::Dxt5
        } else {
            TextureFormat::Dxt1
        }
    }
}

/// A loaded texture with pixel data.
#[derive(Clone, Debug)]
pub struct Texture {
    /// Cache name (cleaned file name)
    pub name: String,

    pub width: u32,
    pub height: u32,

    /// Pixel data in RGBA format (linear, 0-1 range), row-major
    pub pixels: Vec<[f32; 4]>,

    /// File path the pixels came from
    pub path: String,

    pub format: TextureFormat,

    /// Set when the file could not be read and a placeholder was substituted
    pub missing: bool,
}

impl Texture {
    pub fn new(width: u32, height: u32, pixels: Vec<[f32; 4]>, path: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            width,
            height,
            pixels,
            path: path.into(),
            format: TextureFormat::default(),
            missing: false,
        }
    }

    /// Create a solid color texture (1x1).
    pub fn solid_color(color: [f32; 4]) -> Self {
        Self::filled(1, 1, color)
    }

    /// Create a texture filled with one color.
    pub fn filled(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self::new(width, height, vec![color; (width * height) as usize], "<solid>")
    }

    /// Create a two-color checkerboard with square cells.
    pub fn checker(width: u32, height: u32, cell: u32, a: [f32; 4], b: [f32; 4]) -> Self {
        let cell = cell.max(1);
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x / cell) + (y / cell)) % 2 == 0))
            .map(|even| if even { a } else { b })
            .collect();
        Self::new(width, height, pixels, "<checker>")
    }

    pub fn has_alpha(&self) -> bool {
        self.pixels.iter().any(|p| p[3] < 1.0)
    }

    /// Get total size in bytes (approximate).
    pub fn size_bytes(&self) -> usize {
        self.pixels.len() * std::mem::size_of::<[f32; 4]>()
    }
}

/// Decodes image files into textures.
pub trait ImageSource {
    fn load_image(&self, path: &Path) -> TextureResult<Texture>;
}

/// Reads images from disk with the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    fn load_image(&self, path: &Path) -> TextureResult<Texture> {
        load_texture_file(path)
    }
}

impl<F> ImageSource for F
where
    F: Fn(&Path) -> TextureResult<Texture>,
{
    fn load_image(&self, path: &Path) -> TextureResult<Texture> {
        self(path)
    }
}

/// Name-addressed texture arena.
pub struct TextureCache {
    textures: Vec<Arc<Texture>>,
    by_name: HashMap<String, TextureId>,

    /// Base directory for resolving relative paths
    base_dir: Option<PathBuf>,

    source: Box<dyn ImageSource>,

    /// Skip decoding and substitute a checkerboard
    fast_load: bool,
}

impl TextureCache {
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            by_name: HashMap::new(),
            base_dir: None,
            source: Box::new(FileImageSource),
            fast_load: false,
        }
    }

    /// Create a texture cache with a base directory for relative paths.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::new()
        }
    }

    /// Replace the image decoder.
    pub fn with_source(mut self, source: impl ImageSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn set_fast_load(&mut self, fast_load: bool) {
        self.fast_load = fast_load;
    }

    /// Resolve an image file to a texture, loading it on first request.
    ///
    /// Never fails: unreadable files fall back to alternate extensions and
    /// finally to a red placeholder.
    pub fn resolve(&mut self, file: &str, force_rgb: bool) -> TextureId {
        let name = clean_name(file);
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }

        let path = self.resolve_path(file_name(file));
        let mut texture = if self.fast_load {
            let a = rgb(0xc0, 0xc0, 0xa0);
            let b = rgb(0xa0, 0xc0, 0xc0);
            Texture::checker(64, 64, 8, a, b)
        } else if file == WHITE_PLACEHOLDER {
            Texture::solid_color([1.0; 4])
        } else {
            self.load_with_fallback(&path)
        };

        let path_text = path.to_string_lossy().to_string();
        texture.format = TextureFormat::choose(texture.has_alpha(), force_rgb, &path_text);
        texture.name = name.clone();
        if texture.path.starts_with('<') {
            texture.path = path_text;
        }

        log::debug!(
            "Loaded texture: {} ({}x{}, {:?}, {:.1} KB)",
            texture.name,
            texture.width,
            texture.height,
            texture.format,
            texture.size_bytes() as f32 / 1024.0
        );

        let id = self.textures.len();
        self.textures.push(Arc::new(texture));
        self.by_name.insert(name, id);
        id
    }

    fn load_with_fallback(&self, path: &Path) -> Texture {
        match self.source.load_image(path) {
            Ok(texture) => return texture,
            Err(e) => log::debug!("{}", e),
        }
        for ext in ["pic", "tga", "bmp"] {
            let alternate = path.with_extension(ext);
            if let Ok(texture) = self.source.load_image(&alternate) {
                return texture;
            }
        }

        log::warn!("Texture {} not found, using placeholder", path.display());
        let mut texture = Texture::filled(16, 16, [1.0, 0.0, 0.0, 1.0]);
        texture.missing = true;
        texture
    }

    pub fn get(&self, id: TextureId) -> Option<&Arc<Texture>> {
        self.textures.get(id)
    }

    /// Look up a cached texture by file name or cleaned name.
    pub fn find(&self, file: &str) -> Option<TextureId> {
        self.by_name.get(&clean_name(file)).copied()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn textures(&self) -> &[Arc<Texture>] {
        &self.textures
    }

    /// Give up the arena; ids stay valid as indices into the returned list.
    pub fn into_textures(self) -> Vec<Arc<Texture>> {
        self.textures
    }

    /// Resolve a path relative to the base directory.
    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);

        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(base) = &self.base_dir {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

/// File name without directories; both separators are accepted.
fn file_name(file: &str) -> &str {
    file.rsplit(['/', '\\']).next().unwrap_or(file)
}

/// Cache key for an image file: directories stripped, cut at the first '.'.
pub fn clean_name(file: &str) -> String {
    let base = file_name(file);
    base.split('.').next().unwrap_or(base).to_string()
}

fn rgb(r: u8, g: u8, b: u8) -> [f32; 4] {
    [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), 1.0]
}

/// Load a texture from a file path.
fn load_texture_file(path: &Path) -> TextureResult<Texture> {
    let img = image::open(path).map_err(|e| {
        TextureError::LoadError(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let pixels: Vec<[f32; 4]> = rgba
        .pixels()
        .map(|p| {
            [
                srgb_to_linear(p[0]),
                srgb_to_linear(p[1]),
                srgb_to_linear(p[2]),
                p[3] as f32 / 255.0, // Alpha is linear
            ]
        })
        .collect();

    Ok(Texture::new(
        width,
        height,
        pixels,
        path.to_string_lossy().to_string(),
    ))
}

/// Convert sRGB byte value to linear float.
fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn only_tga(path: &Path) -> TextureResult<Texture> {
        if path.extension().is_some_and(|e| e == "tga") {
            Ok(Texture::filled(2, 2, [0.5, 0.5, 0.5, 1.0]))
        } else {
            Err(TextureError::LoadError(path.display().to_string()))
        }
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("C:\\maps\\wall-diff.tga"), "wall-diff");
        assert_eq!(clean_name("maps/wall.v2.png"), "wall");
        assert_eq!(clean_name("plain"), "plain");
    }

    #[test]
    fn test_format_choice() {
        assert_eq!(TextureFormat::choose(false, false, "a.png"), TextureFormat::Dxt1);
        assert_eq!(TextureFormat::choose(true, false, "a.png"), TextureFormat::Dxt5);
        assert_eq!(TextureFormat::choose(true, true, "a.png"), TextureFormat::Argb8888);
        assert_eq!(
            TextureFormat::choose(false, false, "rock-norm_01.png"),
            TextureFormat::Argb8888
        );
    }

    #[test]
    fn test_resolve_caches_by_clean_name() {
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let mut cache = TextureCache::with_base_dir("scene").with_source(move |_: &Path| -> TextureResult<Texture> {
            *counter.borrow_mut() += 1;
            Ok(Texture::filled(4, 4, [1.0; 4]))
        });

        let a = cache.resolve("maps/brick-diff.png", false);
        let b = cache.resolve("other\\brick-diff.tga", false);
        assert_eq!(a, b);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find("brick-diff"), Some(a));
        assert_eq!(cache.get(a).map(|t| t.name.as_str()), Some("brick-diff"));
    }

    #[test]
    fn test_resolve_extension_fallback() {
        let mut cache = TextureCache::new().with_source(only_tga);
        let id = cache.resolve("wall.pic.png", false);
        let tex = cache.get(id).map(Arc::clone);
        assert_eq!(tex.as_ref().map(|t| t.width), Some(2));
        assert_eq!(tex.map(|t| t.missing), Some(false));
    }

    #[test]
    fn test_resolve_missing_placeholder() {
        let mut cache = TextureCache::new()
            .with_source(|p: &Path| -> TextureResult<Texture> {
                Err(TextureError::LoadError(p.display().to_string()))
            });
        let id = cache.resolve("nowhere.png", false);
        let tex = &cache.textures()[id];
        assert!(tex.missing);
        assert_eq!((tex.width, tex.height), (16, 16));
        assert_eq!(tex.pixels[0], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_white_and_fast_load() {
        let mut cache = TextureCache::new()
            .with_source(|p: &Path| -> TextureResult<Texture> {
                Err(TextureError::LoadError(p.display().to_string()))
            });
        let white = cache.resolve(WHITE_PLACEHOLDER, false);
        assert_eq!(cache.textures()[white].width, 1);
        assert!(!cache.textures()[white].missing);

        cache.set_fast_load(true);
        let checker = cache.resolve("anything.png", true);
        let tex = &cache.textures()[checker];
        assert_eq!((tex.width, tex.height), (64, 64));
        assert_ne!(tex.pixels[0], tex.pixels[8]);
        assert_eq!(tex.format, TextureFormat::Argb8888);
    }

    #[test]
    fn test_srgb_to_linear() {
        assert!((srgb_to_linear(0) - 0.0).abs() < 0.001);
        assert!((srgb_to_linear(255) - 1.0).abs() < 0.001);

        let mid = srgb_to_linear(128);
        assert!(mid < 0.5);
        assert!(mid > 0.1);
    }
}
