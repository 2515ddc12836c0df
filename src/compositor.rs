//! Rasterizes a scene or the photo layer into an encoded bitmap.
//!
//! Layers are drawn bottom to top onto an opaque background, each one
//! contain-fitted into its scaled box and rotated about the box center. Only
//! scene data is drawn, so selection outlines and handles can never leak into
//! an export. A layer whose image cannot be resolved is painted as a flat
//! placeholder and reported in the [`ExportOutcome`].

use crate::assets::{AssetResolver, EmbeddedImage};
use crate::constants::PLACEHOLDER_RGBA;
use crate::error::{ComposeError, Result};
use crate::layer::LayerId;
use crate::scene::{PhotoSnapshot, SceneSnapshot};
use egui::{pos2, Color32, Pos2, Vec2};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use rayon::prelude::*;
use std::sync::{Mutex, TryLockError};

/// What the export is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportTarget {
    /// Lossless, supersampled, uncapped: the user-initiated download.
    Download,
    /// Capped dimensions and lossy encoding, for looks kept in storage.
    Storage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitmapFormat {
    Png,
    Jpeg,
}

impl BitmapFormat {
    pub fn mime(self) -> &'static str {
        match self {
            BitmapFormat::Png => "image/png",
            BitmapFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            BitmapFormat::Png => "png",
            BitmapFormat::Jpeg => "jpg",
        }
    }
}

/// Encoded output plus the parameters it was encoded with.
#[derive(Clone, Debug)]
pub struct EncodedBitmap {
    pub bytes: Vec<u8>,
    pub format: BitmapFormat,
    pub width: u32,
    pub height: u32,
    pub quality: Option<u8>,
}

impl EncodedBitmap {
    pub fn to_embedded(&self) -> EmbeddedImage {
        EmbeddedImage::new(self.format.mime(), self.bytes.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportSettings {
    pub supersample: f32,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

/// Something that had to be drawn as a placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    Layer(LayerId),
    Photo,
}

#[derive(Clone, Debug)]
pub struct ExportOutcome {
    pub bitmap: EncodedBitmap,
    pub placeholders: Vec<Placeholder>,
}

pub struct Exporter {
    settings: ExportSettings,
    resolver: AssetResolver,
    /// Encoder output buffer. Holding it is what makes an export "in flight".
    staging: Mutex<Vec<u8>>,
}

impl Exporter {
    pub fn new(settings: ExportSettings, resolver: AssetResolver) -> Self {
        Self {
            settings,
            resolver,
            staging: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn export_scene(
        &self,
        snapshot: &SceneSnapshot,
        target: ExportTarget,
    ) -> Result<ExportOutcome> {
        let mut staging = self.claim_staging()?;
        let (raster, placeholders) = self.render_scene(snapshot)?;
        let bitmap = self.encode(&raster, target, &mut staging)?;
        log::info!(
            "exported collage ({} layers) as {}x{} {:?}",
            snapshot.layers.len(),
            bitmap.width,
            bitmap.height,
            bitmap.format
        );
        Ok(ExportOutcome {
            bitmap,
            placeholders,
        })
    }

    pub fn export_photo(
        &self,
        snapshot: &PhotoSnapshot,
        target: ExportTarget,
    ) -> Result<ExportOutcome> {
        let mut staging = self.claim_staging()?;
        let (raster, placeholders) = self.render_photo(snapshot)?;
        let bitmap = self.encode(&raster, target, &mut staging)?;
        log::info!(
            "exported photo as {}x{} {:?}",
            bitmap.width,
            bitmap.height,
            bitmap.format
        );
        Ok(ExportOutcome {
            bitmap,
            placeholders,
        })
    }

    fn claim_staging(&self) -> Result<std::sync::MutexGuard<'_, Vec<u8>>> {
        match self.staging.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(ComposeError::ExportBusy),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    fn canvas_pixels(&self, canvas_size: Vec2) -> Result<(u32, u32, f32)> {
        let ss = self.settings.supersample;
        let width = (canvas_size.x * ss).round();
        let height = (canvas_size.y * ss).round();
        if !(width >= 1.0 && height >= 1.0) {
            return Err(ComposeError::ExportFailed(format!(
                "canvas {}x{} at {ss}x has no pixels",
                canvas_size.x, canvas_size.y
            )));
        }
        Ok((width as u32, height as u32, ss))
    }

    /// Rasterizes the collage at the supersampled resolution.
    pub fn render_scene(&self, snapshot: &SceneSnapshot) -> Result<(RgbaImage, Vec<Placeholder>)> {
        let (width, height, ss) = self.canvas_pixels(snapshot.canvas_size)?;
        let mut canvas = RgbaImage::from_pixel(width, height, rgba(snapshot.background));

        let decoded: Vec<_> = snapshot
            .layers
            .par_iter()
            .map(|layer| self.resolver.decode(&layer.image))
            .collect();

        let mut placeholders = Vec::new();
        for (layer, pixels) in snapshot.layers.iter().zip(decoded) {
            let paint = match &pixels {
                Ok(image) => Paint::Image(image),
                Err(err) => {
                    log::warn!("layer {} drawn as placeholder: {err}", layer.id);
                    placeholders.push(Placeholder::Layer(layer.id));
                    Paint::Solid(Rgba(PLACEHOLDER_RGBA))
                }
            };
            let t = &layer.transform;
            let center = t.center();
            draw(
                &mut canvas,
                &paint,
                pos2(center.x * ss, center.y * ss),
                t.content_size() * ss,
                t.normalized_rotation().to_radians(),
            );
            log::debug!(
                "drew layer {} z={} rot={} scale={}",
                layer.id,
                layer.z_order,
                t.rotation,
                t.scale
            );
        }
        Ok((canvas, placeholders))
    }

    /// Rasterizes the photo layer, contained and centered on its background.
    pub fn render_photo(&self, snapshot: &PhotoSnapshot) -> Result<(RgbaImage, Vec<Placeholder>)> {
        let (width, height, _) = self.canvas_pixels(snapshot.canvas_size)?;
        let mut canvas = RgbaImage::from_pixel(width, height, rgba(snapshot.background));
        let photo = &snapshot.photo;
        if !(photo.scale.is_finite() && photo.scale > 0.0) {
            return Err(ComposeError::InvalidTransform(format!(
                "photo scale {} must be positive",
                photo.scale
            )));
        }

        let decoded = self.resolver.decode(&photo.image);
        let mut placeholders = Vec::new();
        let paint = match &decoded {
            Ok(image) => Paint::Image(image),
            Err(err) => {
                log::warn!("photo drawn as placeholder: {err}");
                placeholders.push(Placeholder::Photo);
                Paint::Solid(Rgba(PLACEHOLDER_RGBA))
            }
        };
        let frame = Vec2::new(width as f32, height as f32);
        draw(
            &mut canvas,
            &paint,
            (frame / 2.0).to_pos2(),
            frame * photo.scale,
            photo.rotation.rem_euclid(360.0).to_radians(),
        );
        Ok((canvas, placeholders))
    }

    fn encode(
        &self,
        raster: &RgbaImage,
        target: ExportTarget,
        staging: &mut Vec<u8>,
    ) -> Result<EncodedBitmap> {
        staging.clear();
        let bitmap = match target {
            ExportTarget::Download => {
                encode_png(raster, staging)?;
                EncodedBitmap {
                    bytes: staging.clone(),
                    format: BitmapFormat::Png,
                    width: raster.width(),
                    height: raster.height(),
                    quality: None,
                }
            }
            ExportTarget::Storage => {
                let resized = downscale_for_storage(raster, &self.settings);
                let flattened = flatten_onto(&resized, Rgba([255, 255, 255, 255]));
                encode_jpeg(&flattened, self.settings.jpeg_quality, staging)?;
                EncodedBitmap {
                    bytes: staging.clone(),
                    format: BitmapFormat::Jpeg,
                    width: flattened.width(),
                    height: flattened.height(),
                    quality: Some(self.settings.jpeg_quality),
                }
            }
        };
        Ok(bitmap)
    }
}

/// Largest size with the same aspect ratio that fits in `max_width` x `max_height`.
/// Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let k = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    if k >= 1.0 {
        return (width, height);
    }
    let w = ((width as f64 * k).round() as u32).clamp(1, max_width.max(1));
    let h = ((height as f64 * k).round() as u32).clamp(1, max_height.max(1));
    (w, h)
}

/// Applies the storage caps; images that already fit are returned unchanged.
pub fn downscale_for_storage(raster: &RgbaImage, settings: &ExportSettings) -> RgbaImage {
    let (width, height) = fit_within(
        raster.width(),
        raster.height(),
        settings.max_width,
        settings.max_height,
    );
    if (width, height) == raster.dimensions() {
        raster.clone()
    } else {
        image::imageops::resize(raster, width, height, FilterType::Triangle)
    }
}

/// Composites a straight-alpha image over a solid color, dropping alpha.
pub fn flatten_onto(image: &RgbaImage, background: Rgba<u8>) -> RgbImage {
    let [br, bg, bb, _] = background.0;
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let mix = |c: u8, under: u8| (c as f32 * alpha + under as f32 * (1.0 - alpha)).round() as u8;
        Rgb([mix(r, br), mix(g, bg), mix(b, bb)])
    })
}

pub fn encode_png(image: &RgbaImage, out: &mut Vec<u8>) -> Result<()> {
    PngEncoder::new(&mut *out)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|err| ComposeError::ExportFailed(format!("PNG encoding failed: {err}")))
}

pub fn encode_jpeg(image: &RgbImage, quality: u8, out: &mut Vec<u8>) -> Result<()> {
    JpegEncoder::new_with_quality(&mut *out, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| ComposeError::ExportFailed(format!("JPEG encoding failed: {err}")))
}

fn rgba(color: Color32) -> Rgba<u8> {
    Rgba(color.to_srgba_unmultiplied())
}

enum Paint<'a> {
    Image(&'a RgbaImage),
    Solid(Rgba<u8>),
}

/// Draws `paint` contain-fitted into a box of `box_size` pixels centered on
/// `center`, rotated by `rotation` radians about that center.
fn draw(canvas: &mut RgbaImage, paint: &Paint<'_>, center: Pos2, box_size: Vec2, rotation: f32) {
    if !(box_size.x > 0.0 && box_size.y > 0.0) {
        return;
    }

    // Content size and the pixels-per-source-pixel factor.
    let (drawn, k) = match paint {
        Paint::Image(image) => {
            let (iw, ih) = (image.width() as f32, image.height() as f32);
            let k = (box_size.x / iw).min(box_size.y / ih);
            (Vec2::new(iw * k, ih * k), k)
        }
        Paint::Solid(_) => (box_size, 1.0),
    };
    let half = drawn / 2.0;
    let (sin, cos) = rotation.sin_cos();

    let extent_x = (half.x * cos).abs() + (half.y * sin).abs();
    let extent_y = (half.x * sin).abs() + (half.y * cos).abs();
    let width = canvas.width() as i64;
    let height = canvas.height() as i64;
    let x0 = ((center.x - extent_x).floor() as i64).clamp(0, width);
    let x1 = ((center.x + extent_x).ceil() as i64).clamp(0, width);
    let y0 = ((center.y - extent_y).floor() as i64).clamp(0, height);
    let y1 = ((center.y + extent_y).ceil() as i64).clamp(0, height);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let row_bytes = width as usize * 4;
    let buffer: &mut [u8] = &mut **canvas;
    buffer
        .par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - center.y;
            for x in x0 as usize..x1 as usize {
                let dx = x as f32 + 0.5 - center.x;
                // Rotate back into the unrotated content frame.
                let lx = dx * cos + dy * sin;
                let ly = -dx * sin + dy * cos;
                if lx.abs() >= half.x || ly.abs() >= half.y {
                    continue;
                }
                let src = match paint {
                    Paint::Image(image) => {
                        sample_premultiplied(image, (lx + half.x) / k - 0.5, (ly + half.y) / k - 0.5)
                    }
                    Paint::Solid(color) => premultiply(color.0),
                };
                let px = x * 4;
                blend_over(&mut row[px..px + 4], src);
            }
        });
}

fn premultiply([r, g, b, a]: [u8; 4]) -> [f32; 4] {
    let alpha = a as f32 / 255.0;
    [r as f32 * alpha, g as f32 * alpha, b as f32 * alpha, alpha]
}

/// Bilinear sample in premultiplied space with edge clamping.
fn sample_premultiplied(image: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let max_x = image.width() as i64 - 1;
    let max_y = image.height() as i64 - 1;
    let fu = u.floor();
    let fv = v.floor();
    let fx = u - fu;
    let fy = v - fv;
    let x0 = (fu as i64).clamp(0, max_x) as u32;
    let x1 = (fu as i64 + 1).clamp(0, max_x) as u32;
    let y0 = (fv as i64).clamp(0, max_y) as u32;
    let y1 = (fv as i64 + 1).clamp(0, max_y) as u32;

    let tl = premultiply(image.get_pixel(x0, y0).0);
    let tr = premultiply(image.get_pixel(x1, y0).0);
    let bl = premultiply(image.get_pixel(x0, y1).0);
    let br = premultiply(image.get_pixel(x1, y1).0);

    let mut out = [0.0; 4];
    for c in 0..4 {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bot = bl[c] + (br[c] - bl[c]) * fx;
        out[c] = top + (bot - top) * fy;
    }
    out
}

/// Porter-Duff "over" of a premultiplied source onto a straight-alpha pixel.
fn blend_over(dst: &mut [u8], src: [f32; 4]) {
    let src_alpha = src[3].clamp(0.0, 1.0);
    if src_alpha <= 0.0 {
        return;
    }
    let dst_alpha = dst[3] as f32 / 255.0;
    let keep = dst_alpha * (1.0 - src_alpha);
    let out_alpha = src_alpha + keep;
    for c in 0..3 {
        let premul = src[c] + dst[c] as f32 * keep;
        dst[c] = (premul / out_alpha).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::{embedded_png, BrokenFetcher};
    use crate::assets::{ImageHandle, TransientStore};
    use crate::layer::PhotoLayer;
    use crate::scene::{parse_hex_color, Placement, SceneStore};
    use crate::services::OfflineFetcher;
    use crate::transform::TransformPatch;
    use egui::vec2;
    use std::sync::Arc;

    const SETTINGS: ExportSettings = ExportSettings {
        supersample: 2.0,
        max_width: 1080,
        max_height: 1920,
        jpeg_quality: 82,
    };

    fn exporter() -> Exporter {
        Exporter::new(
            SETTINGS,
            AssetResolver::new(Arc::new(OfflineFetcher), TransientStore::new()),
        )
    }

    fn scene() -> SceneStore {
        SceneStore::new(
            vec2(360.0, 640.0),
            parse_hex_color("#f8fafc").unwrap(),
            Placement::default(),
        )
    }

    fn decode(bitmap: &EncodedBitmap) -> RgbaImage {
        image::load_from_memory(&bitmap.bytes).unwrap().to_rgba8()
    }

    #[test]
    fn empty_scene_is_uniform_background() {
        let outcome = exporter()
            .export_scene(&scene().snapshot(), ExportTarget::Download)
            .unwrap();
        assert_eq!(outcome.bitmap.format, BitmapFormat::Png);
        let image = decode(&outcome.bitmap);
        assert_eq!(image.dimensions(), (720, 1280));
        assert_eq!(image.width() * 16, image.height() * 9);
        assert!(image.pixels().all(|p| p.0 == [0xf8, 0xfa, 0xfc, 255]));
    }

    #[test]
    fn higher_layer_wins_where_layers_overlap() {
        let mut scene = scene();
        let red = scene
            .add_layer(embedded_png(10, 10, [255, 0, 0, 255]), Some(pos2(50.0, 50.0)))
            .unwrap();
        let blue = scene
            .add_layer(embedded_png(10, 10, [0, 0, 255, 255]), Some(pos2(100.0, 100.0)))
            .unwrap();
        for id in [red, blue] {
            scene
                .update_layer(
                    id,
                    &TransformPatch {
                        size: Some(vec2(100.0, 100.0)),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        assert!(scene.get(blue).unwrap().z_order > scene.get(red).unwrap().z_order);

        let (raster, placeholders) = exporter().render_scene(&scene.snapshot()).unwrap();
        assert!(placeholders.is_empty());
        // Overlap in logical units is (100..150, 100..150); sample at (125, 125).
        assert_eq!(raster.get_pixel(250, 250).0, [0, 0, 255, 255]);
        // Red-only region.
        assert_eq!(raster.get_pixel(150, 150).0, [255, 0, 0, 255]);
        // Background outside both.
        assert_eq!(raster.get_pixel(10, 10).0, [0xf8, 0xfa, 0xfc, 255]);

        scene.bring_to_front(red);
        let (raster, _) = exporter().render_scene(&scene.snapshot()).unwrap();
        assert_eq!(raster.get_pixel(250, 250).0, [255, 0, 0, 255]);
    }

    #[test]
    fn selection_does_not_change_export() {
        let mut scene = scene();
        let id = scene
            .add_layer(embedded_png(8, 4, [20, 200, 20, 255]), None)
            .unwrap();
        scene.update_layer(id, &TransformPatch::rotation(30.0)).unwrap();

        let exporter = exporter();
        scene.set_active(Some(id));
        let selected = exporter
            .export_scene(&scene.snapshot(), ExportTarget::Download)
            .unwrap();
        scene.set_active(None);
        let cleared = exporter
            .export_scene(&scene.snapshot(), ExportTarget::Download)
            .unwrap();
        assert_eq!(decode(&selected.bitmap), decode(&cleared.bitmap));
    }

    #[test]
    fn contain_fit_letterboxes_inside_the_box() {
        let mut scene = scene();
        // 2:1 image in a square 100x100 box -> drawn 100x50, centered vertically.
        let id = scene
            .add_layer(embedded_png(20, 10, [0, 0, 0, 255]), Some(pos2(0.0, 0.0)))
            .unwrap();
        scene
            .update_layer(
                id,
                &TransformPatch {
                    size: Some(vec2(100.0, 100.0)),
                    ..Default::default()
                },
            )
            .unwrap();
        let (raster, _) = exporter().render_scene(&scene.snapshot()).unwrap();
        assert_eq!(raster.get_pixel(100, 100).0, [0, 0, 0, 255]);
        assert_eq!(raster.get_pixel(100, 20).0, [0xf8, 0xfa, 0xfc, 255]);
        assert_eq!(raster.get_pixel(100, 180).0, [0xf8, 0xfa, 0xfc, 255]);
    }

    #[test]
    fn rotation_turns_content_about_the_center() {
        let mut scene = scene();
        // Wide bar 100x20 centered at (100, 100).
        let id = scene
            .add_layer(embedded_png(50, 10, [0, 0, 0, 255]), Some(pos2(50.0, 90.0)))
            .unwrap();
        scene
            .update_layer(
                id,
                &TransformPatch {
                    size: Some(vec2(100.0, 20.0)),
                    ..Default::default()
                },
            )
            .unwrap();
        let exporter = exporter();
        let (flat, _) = exporter.render_scene(&scene.snapshot()).unwrap();
        // (100, 140) logical is outside the horizontal bar.
        assert_eq!(flat.get_pixel(200, 280).0, [0xf8, 0xfa, 0xfc, 255]);

        scene.update_layer(id, &TransformPatch::rotation(90.0)).unwrap();
        let (turned, _) = exporter.render_scene(&scene.snapshot()).unwrap();
        assert_eq!(turned.get_pixel(200, 280).0, [0, 0, 0, 255]);

        scene.update_layer(id, &TransformPatch::rotation(-270.0)).unwrap();
        let (same, _) = exporter.render_scene(&scene.snapshot()).unwrap();
        assert_eq!(same, turned);
    }

    #[test]
    fn broken_source_is_a_deterministic_placeholder() {
        let mut scene = scene();
        let broken = scene
            .add_layer(
                ImageHandle::Remote("https://cdn.example/gone.png".into()),
                Some(pos2(0.0, 0.0)),
            )
            .unwrap();
        let exporter = Exporter::new(
            SETTINGS,
            AssetResolver::new(Arc::new(BrokenFetcher), TransientStore::new()),
        );
        let first = exporter
            .export_scene(&scene.snapshot(), ExportTarget::Download)
            .unwrap();
        let second = exporter
            .export_scene(&scene.snapshot(), ExportTarget::Download)
            .unwrap();
        assert_eq!(first.placeholders, vec![Placeholder::Layer(broken)]);
        assert_eq!(first.bitmap.bytes, second.bitmap.bytes);

        let image = decode(&first.bitmap);
        // Center of the 220x220 box at the origin.
        assert_eq!(image.get_pixel(220, 220).0, PLACEHOLDER_RGBA);
    }

    #[test]
    fn storage_export_is_capped_jpeg() {
        let exporter = Exporter::new(
            ExportSettings {
                supersample: 4.0,
                ..SETTINGS
            },
            AssetResolver::new(Arc::new(OfflineFetcher), TransientStore::new()),
        );
        let outcome = exporter
            .export_scene(&scene().snapshot(), ExportTarget::Storage)
            .unwrap();
        assert_eq!(outcome.bitmap.format, BitmapFormat::Jpeg);
        assert_eq!(outcome.bitmap.quality, Some(82));
        assert_eq!((outcome.bitmap.width, outcome.bitmap.height), (1080, 1920));
        let image = decode(&outcome.bitmap);
        assert_eq!(image.dimensions(), (1080, 1920));
    }

    #[test]
    fn storage_export_within_caps_keeps_size() {
        let outcome = exporter()
            .export_scene(&scene().snapshot(), ExportTarget::Storage)
            .unwrap();
        assert_eq!(outcome.bitmap.format, BitmapFormat::Jpeg);
        assert_eq!((outcome.bitmap.width, outcome.bitmap.height), (720, 1280));
    }

    #[test]
    fn downscale_never_upscales_and_keeps_aspect() {
        let (max_w, max_h) = (1080u32, 1920u32);
        for &(w, h) in &[
            (1u32, 1u32),
            (720, 1280),
            (1080, 1920),
            (2160, 3840),
            (5000, 300),
            (300, 5000),
            (1081, 1921),
            (4096, 4096),
            (3, 7919),
        ] {
            let (out_w, out_h) = fit_within(w, h, max_w, max_h);
            assert!(out_w <= w.min(max_w), "{w}x{h} -> {out_w}x{out_h}");
            assert!(out_h <= h.min(max_h), "{w}x{h} -> {out_w}x{out_h}");
            let k = (max_w as f64 / w as f64).min(max_h as f64 / h as f64).min(1.0);
            assert!((out_w as f64 - w as f64 * k).abs() <= 1.0, "{w}x{h} -> {out_w}x{out_h}");
            assert!((out_h as f64 - h as f64 * k).abs() <= 1.0, "{w}x{h} -> {out_w}x{out_h}");
        }
    }

    #[test]
    fn photo_export_is_contained_on_white() {
        let exporter = exporter();
        let snapshot = PhotoSnapshot {
            canvas_size: vec2(360.0, 640.0),
            background: Color32::WHITE,
            photo: PhotoLayer::new(embedded_png(10, 10, [30, 60, 90, 255])),
        };
        let (raster, placeholders) = exporter.render_photo(&snapshot).unwrap();
        assert!(placeholders.is_empty());
        // Square photo in a 720x1280 frame: 720x720 centered vertically.
        assert_eq!(raster.get_pixel(360, 640).0, [30, 60, 90, 255]);
        assert_eq!(raster.get_pixel(360, 100).0, [255, 255, 255, 255]);

        let mut half = snapshot.clone();
        half.photo.scale = 0.5;
        let (raster, _) = exporter.render_photo(&half).unwrap();
        assert_eq!(raster.get_pixel(100, 640).0, [255, 255, 255, 255]);
        assert_eq!(raster.get_pixel(360, 640).0, [30, 60, 90, 255]);
    }

    #[test]
    fn concurrent_export_is_rejected() {
        let exporter = exporter();
        let _held = exporter.staging.lock().unwrap();
        assert!(matches!(
            exporter.export_scene(&scene().snapshot(), ExportTarget::Download),
            Err(ComposeError::ExportBusy)
        ));
    }

    #[test]
    fn transparent_pixels_keep_the_background() {
        let mut scene = scene();
        scene
            .add_layer(embedded_png(4, 4, [255, 0, 0, 0]), Some(pos2(0.0, 0.0)))
            .unwrap();
        let (raster, _) = exporter().render_scene(&scene.snapshot()).unwrap();
        assert_eq!(raster.get_pixel(100, 100).0, [0xf8, 0xfa, 0xfc, 255]);
    }
}
