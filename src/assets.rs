//! Image handles and the resolver that turns them into bytes or pixels.
//!
//! Three kinds of handle reach the editor: remote URLs, transient handles that
//! only live as long as the session (freshly picked files, background-removal
//! results) and embedded images that carry their bytes inline. Anything that
//! must outlive the session has to be materialized into an embedded image
//! before it crosses a persistence boundary.

use crate::compositor::{encode_jpeg, fit_within, flatten_onto};
use crate::error::{ComposeError, Result};
use crate::services::RemoteFetcher;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Image bytes carried inline, together with their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl EmbeddedImage {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Wraps encoded bytes, sniffing the MIME type from their signature.
    pub fn sniffed(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            mime: mime_for_bytes(&bytes).to_string(),
            bytes,
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn from_data_url(url: &str) -> std::result::Result<Self, ParseImageError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or(ParseImageError::NotDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ParseImageError::MissingPayload)?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or(ParseImageError::NotBase64)?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|err| ParseImageError::Base64(err.to_string()))?;
        Ok(Self::new(mime, bytes))
    }
}

impl fmt::Debug for EmbeddedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedImage")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseImageError {
    #[error("empty image reference")]
    Empty,
    #[error("not a data URL")]
    NotDataUrl,
    #[error("data URL has no payload")]
    MissingPayload,
    #[error("data URL is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Base64(String),
}

/// Key of a session-scoped image in the [`TransientStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TransientId(Uuid);

#[derive(Clone, Debug, PartialEq)]
pub enum ImageHandle {
    Remote(String),
    Transient(TransientId),
    Embedded(EmbeddedImage),
}

impl ImageHandle {
    pub fn is_transient(&self) -> bool {
        matches!(self, ImageHandle::Transient(_))
    }

    /// Short description for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            ImageHandle::Remote(url) => url.clone(),
            ImageHandle::Transient(id) => format!("transient:{}", id.0),
            ImageHandle::Embedded(img) => format!("embedded {} ({} bytes)", img.mime, img.bytes.len()),
        }
    }

    /// The handle as a persistable reference, if it already is one.
    pub fn to_stable(&self) -> Option<StableImage> {
        match self {
            ImageHandle::Remote(url) => Some(StableImage::Remote(url.clone())),
            ImageHandle::Transient(_) => None,
            ImageHandle::Embedded(img) => Some(StableImage::Embedded(img.clone())),
        }
    }
}

/// An image reference that survives serialization: a remote URL or inline bytes.
///
/// Serialized as a single string, `data:<mime>;base64,...` for embedded images
/// and the URL otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StableImage {
    Remote(String),
    Embedded(EmbeddedImage),
}

impl From<StableImage> for String {
    fn from(image: StableImage) -> Self {
        match image {
            StableImage::Remote(url) => url,
            StableImage::Embedded(img) => img.to_data_url(),
        }
    }
}

impl TryFrom<String> for StableImage {
    type Error = ParseImageError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Err(ParseImageError::Empty)
        } else if trimmed.starts_with("data:") {
            EmbeddedImage::from_data_url(trimmed).map(StableImage::Embedded)
        } else {
            Ok(StableImage::Remote(trimmed.to_string()))
        }
    }
}

impl From<StableImage> for ImageHandle {
    fn from(image: StableImage) -> Self {
        match image {
            StableImage::Remote(url) => ImageHandle::Remote(url),
            StableImage::Embedded(img) => ImageHandle::Embedded(img),
        }
    }
}

/// Session-scoped image bytes, addressed by [`TransientId`].
///
/// Handles into this store do not survive serialization; clearing it simulates
/// a reload.
#[derive(Clone, Default)]
pub struct TransientStore {
    entries: Arc<RwLock<HashMap<TransientId, Arc<[u8]>>>>,
}

impl TransientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bytes: impl Into<Arc<[u8]>>) -> ImageHandle {
        let id = TransientId(Uuid::new_v4());
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, bytes.into());
        ImageHandle::Transient(id)
    }

    pub fn read(&self, id: TransientId) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn revoke(&self, id: TransientId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounds and quality used when a transient element image is persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterializeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

/// Resolves any [`ImageHandle`] to bytes, pixels or a persistable form.
#[derive(Clone)]
pub struct AssetResolver {
    fetcher: Arc<dyn RemoteFetcher>,
    transients: TransientStore,
}

impl AssetResolver {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, transients: TransientStore) -> Self {
        Self {
            fetcher,
            transients,
        }
    }

    pub fn transients(&self) -> &TransientStore {
        &self.transients
    }

    pub fn resolve_bytes(&self, handle: &ImageHandle) -> Result<Arc<[u8]>> {
        match handle {
            ImageHandle::Remote(url) => self
                .fetcher
                .fetch(url)
                .map(Arc::<[u8]>::from)
                .map_err(|err| ComposeError::source_unavailable(url.clone(), err)),
            ImageHandle::Transient(id) => self.transients.read(*id).ok_or_else(|| {
                ComposeError::source_unavailable(handle.describe(), "transient handle was revoked")
            }),
            ImageHandle::Embedded(img) => Ok(img.bytes.clone()),
        }
    }

    /// Materializes any handle into inline bytes that stay valid indefinitely.
    pub fn resolve_for_export(&self, handle: &ImageHandle) -> Result<EmbeddedImage> {
        match handle {
            ImageHandle::Embedded(img) => Ok(img.clone()),
            _ => {
                let bytes = self.resolve_bytes(handle)?;
                Ok(EmbeddedImage::sniffed(bytes))
            }
        }
    }

    /// Decodes the first frame behind `handle` into straight-alpha RGBA.
    pub fn decode(&self, handle: &ImageHandle) -> Result<RgbaImage> {
        let bytes = self.resolve_bytes(handle)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|err| ComposeError::source_unavailable(handle.describe(), err))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ComposeError::source_unavailable(
                handle.describe(),
                "image has no pixels",
            ));
        }
        Ok(image.to_rgba8())
    }

    /// Decodes `handle` and shrinks it to fit a `max_side` square for display.
    pub fn decode_preview(&self, handle: &ImageHandle, max_side: u32) -> Result<RgbaImage> {
        let pixels = self.decode(handle)?;
        let (width, height) = fit_within(pixels.width(), pixels.height(), max_side, max_side);
        if (width, height) == pixels.dimensions() {
            Ok(pixels)
        } else {
            Ok(image::imageops::thumbnail(&pixels, width, height))
        }
    }

    /// Turns a layer image into something a look record can keep.
    ///
    /// Transient images are downscaled into the configured bounding box and
    /// transcoded to JPEG; remote and embedded images are kept as they are.
    pub fn materialize_element(
        &self,
        handle: &ImageHandle,
        options: MaterializeOptions,
    ) -> Result<StableImage> {
        if let Some(stable) = handle.to_stable() {
            return Ok(stable);
        }

        let pixels = self.decode(handle)?;
        let (width, height) = fit_within(
            pixels.width(),
            pixels.height(),
            options.max_width,
            options.max_height,
        );
        let pixels = if (width, height) == pixels.dimensions() {
            pixels
        } else {
            image::imageops::resize(&pixels, width, height, FilterType::Triangle)
        };
        let flattened = flatten_onto(&pixels, Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        encode_jpeg(&flattened, options.jpeg_quality, &mut bytes)?;
        log::debug!(
            "materialized {} into {}x{} jpeg ({} bytes)",
            handle.describe(),
            width,
            height,
            bytes.len()
        );
        Ok(StableImage::Embedded(EmbeddedImage::new("image/jpeg", bytes)))
    }
}

pub fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::OfflineFetcher;
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    pub(crate) fn embedded_png(width: u32, height: u32, color: [u8; 4]) -> ImageHandle {
        ImageHandle::Embedded(EmbeddedImage::new("image/png", png_bytes(width, height, color)))
    }

    /// Fetcher that fails for every URL.
    pub(crate) struct BrokenFetcher;

    impl RemoteFetcher for BrokenFetcher {
        fn fetch(&self, url: &str) -> std::io::Result<Vec<u8>> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{url} refused"),
            ))
        }
    }

    fn offline_resolver() -> AssetResolver {
        AssetResolver::new(Arc::new(OfflineFetcher), TransientStore::new())
    }

    const OPTIONS: MaterializeOptions = MaterializeOptions {
        max_width: 800,
        max_height: 800,
        jpeg_quality: 82,
    };

    #[test]
    fn data_url_survives_string_form() {
        let img = EmbeddedImage::new("image/png", vec![1u8, 2, 3, 4]);
        let url = img.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(EmbeddedImage::from_data_url(&url).unwrap(), img);
        assert_eq!(
            EmbeddedImage::from_data_url("data:image/png,abc"),
            Err(ParseImageError::NotBase64)
        );
    }

    #[test]
    fn stable_image_serializes_as_string() {
        let remote = StableImage::Remote("https://cdn.example/item.png".into());
        let json = serde_json::to_string(&remote).unwrap();
        assert_eq!(json, "\"https://cdn.example/item.png\"");

        let embedded = StableImage::Embedded(EmbeddedImage::new("image/jpeg", vec![9u8; 5]));
        let json = serde_json::to_string(&embedded).unwrap();
        let back: StableImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, embedded);

        assert!(serde_json::from_str::<StableImage>("\"\"").is_err());
    }

    #[test]
    fn revoked_transient_is_unavailable() {
        let resolver = offline_resolver();
        let handle = resolver.transients().register(png_bytes(4, 4, [1, 2, 3, 255]));
        assert!(resolver.resolve_bytes(&handle).is_ok());

        let ImageHandle::Transient(id) = handle else {
            panic!("expected a transient handle");
        };
        assert!(resolver.transients().revoke(id));
        assert!(matches!(
            resolver.resolve_bytes(&handle),
            Err(ComposeError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn resolve_for_export_embeds_transient_bytes() {
        let resolver = offline_resolver();
        let bytes = png_bytes(3, 2, [10, 20, 30, 255]);
        let handle = resolver.transients().register(bytes.clone());

        let embedded = resolver.resolve_for_export(&handle).unwrap();
        assert_eq!(embedded.mime, "image/png");
        assert_eq!(&*embedded.bytes, bytes.as_slice());

        resolver.transients().clear();
        let decoded = image::load_from_memory(&embedded.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn failed_fetch_is_source_unavailable() {
        let resolver = AssetResolver::new(Arc::new(BrokenFetcher), TransientStore::new());
        let handle = ImageHandle::Remote("https://cdn.example/missing.png".into());
        match resolver.resolve_for_export(&handle) {
            Err(ComposeError::SourceUnavailable { handle, .. }) => {
                assert_eq!(handle, "https://cdn.example/missing.png")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn undecodable_bytes_are_unavailable() {
        let resolver = offline_resolver();
        let handle = ImageHandle::Embedded(EmbeddedImage::new("image/png", vec![0u8; 16]));
        assert!(matches!(
            resolver.decode(&handle),
            Err(ComposeError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn transient_elements_are_downscaled_to_jpeg() {
        let resolver = offline_resolver();
        let handle = resolver.transients().register(png_bytes(1600, 400, [200, 10, 10, 255]));

        let StableImage::Embedded(img) = resolver.materialize_element(&handle, OPTIONS).unwrap()
        else {
            panic!("expected an embedded image");
        };
        assert_eq!(img.mime, "image/jpeg");
        let decoded = image::load_from_memory(&img.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 200));
    }

    #[test]
    fn small_transient_elements_keep_their_size() {
        let resolver = offline_resolver();
        let handle = resolver.transients().register(png_bytes(120, 90, [0, 0, 0, 0]));
        let StableImage::Embedded(img) = resolver.materialize_element(&handle, OPTIONS).unwrap()
        else {
            panic!("expected an embedded image");
        };
        let decoded = image::load_from_memory(&img.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 90));
    }

    #[test]
    fn persistable_elements_pass_through() {
        let resolver = offline_resolver();
        let remote = ImageHandle::Remote("https://cdn.example/a.png".into());
        assert_eq!(
            resolver.materialize_element(&remote, OPTIONS).unwrap(),
            StableImage::Remote("https://cdn.example/a.png".into())
        );
    }
}
