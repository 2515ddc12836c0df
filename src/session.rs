//! One editing session: the collage, the photo, and the pieces that act on them.
//!
//! Both editor entry points (adding from the wardrobe and uploading files) go
//! through this type, differing only in the placement preset they use.

use crate::assets::{AssetResolver, ImageHandle};
use crate::compositor::{ExportOutcome, ExportTarget, Exporter, Placeholder};
use crate::config::ComposerConfig;
use crate::error::{ComposeError, Result};
use crate::gesture::{GestureController, PointerKind, PointerTarget, ViewMode};
use crate::layer::{Layer, LayerId, PhotoLayer};
use crate::look::{Look, LookDraft, LookElement, LookPersistence, WardrobeItem};
use crate::repository::LookRepository;
use crate::scene::{PhotoSnapshot, SceneStore};
use crate::services::BackgroundRemover;
use crate::transform::TransformPatch;
use crate::viewport::Viewport;
use chrono::Utc;
use egui::{Color32, Pos2};
use rayon::prelude::*;

pub struct ComposeSession {
    config: ComposerConfig,
    scene: SceneStore,
    photo: Option<PhotoLayer>,
    viewport: Viewport,
    gestures: GestureController,
    mode: ViewMode,
    title: String,
    resolver: AssetResolver,
    exporter: Exporter,
    persistence: LookPersistence,
}

impl ComposeSession {
    pub fn new(config: ComposerConfig, resolver: AssetResolver, persistence: LookPersistence) -> Self {
        let viewport = config.viewport();
        let scene = SceneStore::new(
            viewport.logical_size(),
            config.background_color(),
            config.wardrobe_placement.to_placement(),
        );
        Self {
            scene,
            photo: None,
            viewport,
            gestures: GestureController::new(config.swipe_threshold),
            mode: ViewMode::Collage,
            title: String::new(),
            exporter: Exporter::new(config.export_settings(), resolver.clone()),
            resolver,
            persistence,
            config,
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn photo(&self) -> Option<&PhotoLayer> {
        self.photo.as_ref()
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn gestures(&self) -> &GestureController {
        &self.gestures
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        if self.mode != mode {
            self.gestures.commit();
            self.mode = mode;
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Adding content
    // ─────────────────────────────────────────────────────────────────────────────

    /// Drops a wardrobe item onto the collage, selects it and shows the collage.
    pub fn add_from_wardrobe(&mut self, item: &WardrobeItem) -> Result<LayerId> {
        let placement = self.config.wardrobe_placement.to_placement();
        let id = self
            .scene
            .add_placed(item.image.clone().into(), item.name.clone(), &placement)?;
        self.scene.set_active(Some(id));
        self.set_mode(ViewMode::Collage);
        Ok(id)
    }

    /// Adds freshly picked files as transient layers, cascading within the batch.
    pub fn add_uploads(&mut self, files: Vec<(Vec<u8>, Option<String>)>) -> Result<Vec<LayerId>> {
        let placement = self.config.upload_placement.to_placement();
        let transients = self.resolver.transients();
        let batch = files
            .into_iter()
            .map(|(bytes, name)| (transients.register(bytes), name))
            .collect();
        let ids = self.scene.add_batch(batch, &placement)?;
        self.set_mode(ViewMode::Collage);
        Ok(ids)
    }

    /// Replaces the photo and shows it.
    pub fn set_photo(&mut self, image: ImageHandle) {
        self.photo = Some(PhotoLayer::new(image));
        self.set_mode(ViewMode::Photo);
    }

    pub fn set_photo_bytes(&mut self, bytes: Vec<u8>) {
        let handle = self.resolver.transients().register(bytes);
        self.set_photo(handle);
    }

    pub fn set_background(&mut self, color: Color32) {
        self.scene.set_background(color);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Photo controls
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn rotate_photo(&mut self, degrees: f32) {
        if let Some(photo) = &mut self.photo {
            if degrees.is_finite() {
                photo.rotation = degrees;
            }
        }
    }

    pub fn scale_photo(&mut self, scale: f32) -> Result<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ComposeError::InvalidTransform(format!(
                "photo scale {scale} must be positive"
            )));
        }
        if let Some(photo) = &mut self.photo {
            photo.scale = scale;
        }
        Ok(())
    }

    pub fn reset_photo(&mut self) {
        if let Some(photo) = &mut self.photo {
            photo.reset();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Active layer
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn select(&mut self, id: Option<LayerId>) -> bool {
        self.scene.set_active(id)
    }

    pub fn bring_to_front(&mut self, id: LayerId) {
        self.scene.bring_to_front(id);
    }

    pub fn set_layer_scale(&mut self, id: LayerId, scale: f32) -> Result<()> {
        self.scene.update_layer(id, &TransformPatch::scale(scale))
    }

    pub fn delete_active(&mut self) -> Option<Layer> {
        let id = self.scene.active()?;
        self.gestures.commit();
        self.scene.remove_layer(id)
    }

    /// Swaps the active layer's image for a cut-out. On failure the layer keeps
    /// its original image.
    pub fn remove_background(&mut self, remover: &dyn BackgroundRemover) -> Result<LayerId> {
        let layer = self
            .scene
            .active_layer()
            .ok_or_else(|| ComposeError::BackgroundRemoval("no layer selected".to_string()))?;
        let (id, handle) = (layer.id, layer.image.clone());

        let bytes = self.resolver.resolve_bytes(&handle)?;
        let cut_out = remover.remove_background(&bytes).map_err(|reason| {
            log::warn!("background removal failed for layer {id}: {reason}");
            ComposeError::BackgroundRemoval(reason)
        })?;
        let replacement = self.resolver.transients().register(cut_out);
        self.scene.set_image(id, replacement)?;
        log::info!("replaced background of layer {id}");
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pointer input
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn pointer_down(&mut self, screen_pos: Pos2, target: PointerTarget, kind: PointerKind) {
        self.gestures
            .pointer_down(&mut self.scene, &self.viewport, screen_pos, target, kind);
    }

    pub fn pointer_move(&mut self, screen_pos: Pos2) {
        self.gestures
            .pointer_move(&mut self.scene, &self.viewport, screen_pos);
    }

    /// Ends the gesture and applies a mode switch if it was a swipe.
    pub fn pointer_up(&mut self, screen_pos: Pos2) -> Option<ViewMode> {
        let switched = self
            .gestures
            .pointer_up(&mut self.scene, &self.viewport, screen_pos, self.mode);
        if let Some(mode) = switched {
            log::debug!("swiped to {mode:?}");
            self.mode = mode;
        }
        switched
    }

    pub fn begin_rotate(&mut self, id: LayerId) {
        self.gestures.begin_rotate(&mut self.scene, id);
    }

    pub fn rotate_to(&mut self, degrees: f32) {
        self.gestures.rotate_to(&mut self.scene, degrees);
    }

    pub fn end_rotate(&mut self) {
        self.gestures.end_rotate();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Export & save
    // ─────────────────────────────────────────────────────────────────────────────

    /// Settles any gesture in flight and drops the selection before a snapshot.
    fn prepare_export(&mut self) {
        if self.gestures.commit() {
            log::debug!("committed gesture before export");
        }
        self.scene.set_active(None);
    }

    fn photo_snapshot(&self) -> Option<PhotoSnapshot> {
        self.photo.as_ref().map(|photo| PhotoSnapshot {
            canvas_size: self.viewport.logical_size(),
            background: self.config.photo_background_color(),
            photo: photo.clone(),
        })
    }

    /// Full-quality export of whichever view is showing.
    pub fn export_download(&mut self) -> Result<ExportOutcome> {
        self.prepare_export();
        match self.mode {
            ViewMode::Collage => self
                .exporter
                .export_scene(&self.scene.snapshot(), ExportTarget::Download),
            ViewMode::Photo => {
                let snapshot = self
                    .photo_snapshot()
                    .ok_or_else(|| ComposeError::ExportFailed("no photo to export".to_string()))?;
                self.exporter.export_photo(&snapshot, ExportTarget::Download)
            }
        }
    }

    /// Exports both views for storage, materializes every layer image and
    /// writes a new look. Nothing is written if any step fails.
    pub fn save_look(&mut self, repository: &mut LookRepository) -> Result<Look> {
        self.prepare_export();

        let collage = if self.scene.is_empty() {
            None
        } else {
            let outcome = self
                .exporter
                .export_scene(&self.scene.snapshot(), ExportTarget::Storage)?;
            warn_placeholders(&outcome.placeholders);
            Some(outcome.bitmap)
        };
        let photo = match self.photo_snapshot() {
            Some(snapshot) => {
                let outcome = self.exporter.export_photo(&snapshot, ExportTarget::Storage)?;
                warn_placeholders(&outcome.placeholders);
                Some(outcome.bitmap)
            }
            None => None,
        };

        let options = self.config.materialize_options();
        let elements = self
            .scene
            .paint_order()
            .par_iter()
            .map(|layer| {
                Ok(LookElement {
                    id: layer.id.to_string(),
                    image: self.resolver.materialize_element(&layer.image, options)?,
                    display_name: layer.display_name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let draft = LookDraft {
            title: self.title.clone(),
            collage,
            photo,
            elements,
        };
        let look = self.persistence.build(draft, Utc::now());
        repository.create(look.clone())?;
        Ok(look)
    }
}

fn warn_placeholders(placeholders: &[Placeholder]) {
    for placeholder in placeholders {
        log::warn!("saved with a placeholder for {placeholder:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::{embedded_png, png_bytes};
    use crate::assets::{StableImage, TransientStore};
    use crate::services::OfflineFetcher;
    use crate::storage::MemoryStore;
    use egui::pos2;
    use std::sync::Arc;

    fn session() -> ComposeSession {
        ComposeSession::new(
            ComposerConfig::default(),
            AssetResolver::new(Arc::new(OfflineFetcher), TransientStore::new()),
            LookPersistence::default(),
        )
    }

    fn repository() -> LookRepository {
        let mut repo = LookRepository::new(Box::new(MemoryStore::new(8 << 20)));
        repo.migrate().unwrap();
        repo
    }

    struct Cutter(std::result::Result<Vec<u8>, String>);

    impl BackgroundRemover for Cutter {
        fn remove_background(&self, _encoded: &[u8]) -> std::result::Result<Vec<u8>, String> {
            self.0.clone()
        }
    }

    fn wardrobe_item(id: &str) -> WardrobeItem {
        WardrobeItem {
            id: id.to_string(),
            image: StableImage::Remote(format!("https://img.example/{id}.png")),
            name: Some(format!("Item {id}")),
            kind: None,
        }
    }

    #[test]
    fn wardrobe_adds_cascade_and_show_collage() {
        let mut session = session();
        session.set_photo(embedded_png(4, 4, [0, 0, 0, 255]));
        assert_eq!(session.mode(), ViewMode::Photo);

        let first = session.add_from_wardrobe(&wardrobe_item("a")).unwrap();
        let second = session.add_from_wardrobe(&wardrobe_item("b")).unwrap();
        assert_eq!(session.mode(), ViewMode::Collage);
        assert_eq!(session.scene().active(), Some(second));
        let a = session.scene().get(first).unwrap();
        let b = session.scene().get(second).unwrap();
        assert_eq!(a.transform.position, pos2(60.0, 60.0));
        assert_eq!(b.transform.position, pos2(72.0, 72.0));
        assert_eq!(b.display_name.as_deref(), Some("Item b"));
    }

    #[test]
    fn uploads_use_the_batch_preset() {
        let mut session = session();
        session.add_from_wardrobe(&wardrobe_item("a")).unwrap();
        let ids = session
            .add_uploads(vec![
                (png_bytes(4, 4, [1, 2, 3, 255]), None),
                (png_bytes(4, 4, [1, 2, 3, 255]), Some("shirt.png".into())),
            ])
            .unwrap();
        let layers: Vec<&Layer> = ids.iter().map(|id| session.scene().get(*id).unwrap()).collect();
        assert_eq!(layers[0].transform.position, pos2(40.0, 40.0));
        assert_eq!(layers[1].transform.position, pos2(60.0, 60.0));
        assert_eq!(layers[0].z_order, 2);
        assert_eq!(layers[1].z_order, 3);
        assert!(layers[0].image.is_transient());
    }

    #[test]
    fn failed_background_removal_keeps_the_image() {
        let mut session = session();
        let id = session
            .add_uploads(vec![(png_bytes(4, 4, [9, 9, 9, 255]), None)])
            .unwrap()[0];
        let original = session.scene().get(id).unwrap().image.clone();

        assert!(session.remove_background(&Cutter(Ok(Vec::new()))).is_err());
        session.select(Some(id));
        let err = session
            .remove_background(&Cutter(Err("quota".to_string())))
            .unwrap_err();
        assert!(matches!(err, ComposeError::BackgroundRemoval(_)));
        assert_eq!(session.scene().get(id).unwrap().image, original);

        let cut = png_bytes(4, 4, [9, 9, 9, 0]);
        session.remove_background(&Cutter(Ok(cut.clone()))).unwrap();
        let replaced = session.scene().get(id).unwrap().image.clone();
        assert_ne!(replaced, original);
        assert_eq!(&*session.resolver().resolve_bytes(&replaced).unwrap(), &cut[..]);
    }

    #[test]
    fn transient_layers_survive_a_reload_through_the_look() {
        let mut session = session();
        session
            .add_uploads(vec![(png_bytes(1600, 400, [200, 30, 30, 255]), Some("scarf".into()))])
            .unwrap();
        session.set_title("  Weekend ");
        let mut repo = repository();
        let saved = session.save_look(&mut repo).unwrap();
        assert_eq!(saved.title, "Weekend");
        assert!(saved.collage.is_some());
        assert!(saved.photo.is_none());

        // Simulate a reload: every transient handle is gone.
        session.resolver().transients().clear();
        let reloaded = ComposeSession::new(
            ComposerConfig::default(),
            AssetResolver::new(Arc::new(OfflineFetcher), TransientStore::new()),
            LookPersistence::default(),
        );

        let look = repo.get(&saved.id).unwrap().unwrap();
        assert_eq!(look.elements.len(), 1);
        let element = &look.elements[0];
        assert_eq!(element.display_name.as_deref(), Some("scarf"));
        let pixels = reloaded
            .resolver()
            .decode(&element.image.clone().into())
            .unwrap();
        assert_eq!(pixels.dimensions(), (800, 200));
        let [r, g, b, _] = pixels.get_pixel(400, 100).0;
        assert!(r > 180 && g < 60 && b < 60, "{r} {g} {b}");
    }

    #[test]
    fn save_settles_a_drag_and_clears_selection() {
        let mut session = session();
        session.viewport_mut().fit_container(376.0);
        let id = session.add_from_wardrobe(&wardrobe_item("a")).unwrap();
        let start = session.viewport().logical_to_screen(pos2(100.0, 100.0));
        session.pointer_down(start, PointerTarget::Layer(id), PointerKind::Mouse);
        session.pointer_move(start + egui::vec2(30.0, 0.0));

        let mut repo = repository();
        session.save_look(&mut repo).unwrap();
        assert!(session.gestures().is_idle());
        assert_eq!(session.scene().active(), None);
        assert_eq!(session.scene().get(id).unwrap().transform.position, pos2(90.0, 60.0));
    }

    #[test]
    fn failed_element_fails_the_whole_save() {
        let mut session = session();
        session
            .add_uploads(vec![(png_bytes(8, 8, [0, 0, 0, 255]), None)])
            .unwrap();
        session.resolver().transients().clear();
        let mut repo = repository();
        assert!(matches!(
            session.save_look(&mut repo),
            Err(ComposeError::SourceUnavailable { .. })
        ));
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn download_follows_the_visible_view() {
        let mut session = session();
        session.set_mode(ViewMode::Photo);
        assert!(matches!(
            session.export_download(),
            Err(ComposeError::ExportFailed(_))
        ));

        session.set_photo(embedded_png(4, 8, [10, 20, 30, 255]));
        session.rotate_photo(90.0);
        assert!(session.scale_photo(0.0).is_err());
        session.scale_photo(1.5).unwrap();
        let outcome = session.export_download().unwrap();
        assert_eq!((outcome.bitmap.width, outcome.bitmap.height), (720, 1280));
        session.reset_photo();
        assert_eq!(session.photo().unwrap().scale, 1.0);

        let start = session.viewport().logical_to_screen(pos2(200.0, 300.0));
        session.pointer_down(start, PointerTarget::Background, PointerKind::Touch);
        let end = session.viewport().logical_to_screen(pos2(150.0, 300.0));
        assert_eq!(session.pointer_up(end), Some(ViewMode::Collage));
        assert_eq!(session.mode(), ViewMode::Collage);
    }
}
