use eframe::egui::{self, Align2, Color32, FontId, Pos2, Rect, RichText, Sense, Stroke, Vec2};
use egui::{emath::Rot2, pos2, vec2, Mesh, TextureHandle};
use lookboard::assets::{AssetResolver, EmbeddedImage, ImageHandle, StableImage, TransientStore};
use lookboard::config::ComposerConfig;
use lookboard::constants::{
    MAX_SLIDER_SCALE, MIN_SLIDER_SCALE, PLACEHOLDER_RGBA, RESIZE_HANDLE_SIZE, ROTATION_SLIDER_LIMIT,
};
use lookboard::gesture::{GestureState, PointerKind, PointerTarget, ViewMode};
use lookboard::layer::LayerId;
use image::RgbaImage;
use lookboard::look::{Look, LookPersistence, WardrobeItem};
use lookboard::paths::AppPaths;
use lookboard::repository::LookRepository;
use lookboard::services::{EdgeFloodRemover, LocalFileFetcher};
use lookboard::session::ComposeSession;
use lookboard::storage::{FileStore, KeyValueStore, MemoryStore};
use lookboard::transform::Corner;
use lookboard::ComposeError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Largest texture side used for on-screen previews.
const PREVIEW_MAX_SIDE: u32 = 1024;

/// Side of the square each item thumbnail gets in the look viewer.
const ELEMENT_THUMB_SIDE: f32 = 72.0;

const KINDS: [&str; 7] = [
    "Outerwear",
    "Tops",
    "Bottoms",
    "Shoes",
    "Accessories",
    "Swimwear",
    "Other",
];

fn main() -> eframe::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 800.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "Lookboard",
        options,
        Box::new(|cc| Ok(Box::new(LookboardApp::new(cc)))),
    )
}

/// Preview texture for one image handle. `None` marks a source that could not
/// be decoded, drawn as a placeholder.
struct CachedTexture {
    handle: ImageHandle,
    texture: Option<TextureHandle>,
}

struct ElementThumb {
    label: String,
    texture: Option<TextureHandle>,
}

/// A saved look opened for viewing, decoded from its record.
struct LookViewer {
    id: String,
    title: String,
    collage: Option<TextureHandle>,
    photo: Option<TextureHandle>,
    elements: Vec<ElementThumb>,
    showing_photo: bool,
}

struct LookboardApp {
    session: ComposeSession,
    repository: LookRepository,
    exports_dir: Option<PathBuf>,
    layer_textures: HashMap<LayerId, CachedTexture>,
    photo_texture: Option<CachedTexture>,
    looks: Vec<Look>,
    wardrobe: Vec<WardrobeItem>,
    kind_filter: Option<String>,
    query: String,
    comment_draft: String,
    viewer: Option<LookViewer>,
    pointer_down: bool,
    status: Option<String>,
}

impl LookboardApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let paths = AppPaths::from_project_dirs();
        if let Some(paths) = &paths {
            if let Err(err) = paths.ensure_dirs_exist() {
                log::error!("could not create data directories: {err}");
            }
        }
        let config = paths
            .as_ref()
            .map(|p| ComposerConfig::load_or_default(&p.config_file))
            .unwrap_or_default();

        let store: Box<dyn KeyValueStore> = match paths
            .as_ref()
            .map(|p| FileStore::open(&p.store, config.storage_quota))
        {
            Some(Ok(store)) => Box::new(store),
            Some(Err(err)) => {
                log::warn!("falling back to in-memory storage: {err}");
                Box::new(MemoryStore::new(config.storage_quota))
            }
            None => {
                log::warn!("no data directory, looks will not persist");
                Box::new(MemoryStore::new(config.storage_quota))
            }
        };
        let mut repository = LookRepository::new(store);
        if let Err(err) = repository.migrate() {
            log::error!("storage migration failed: {err}");
        }

        let resolver = AssetResolver::new(Arc::new(LocalFileFetcher), TransientStore::new());
        let session = ComposeSession::new(config, resolver, LookPersistence::default());

        let mut app = Self {
            session,
            repository,
            exports_dir: paths.map(|p| p.exports),
            layer_textures: HashMap::new(),
            photo_texture: None,
            looks: Vec::new(),
            wardrobe: Vec::new(),
            kind_filter: None,
            query: String::new(),
            comment_draft: String::new(),
            viewer: None,
            pointer_down: false,
            status: None,
        };
        app.reload_lists();
        app
    }

    fn report(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        self.status = Some(message);
    }

    fn report_error(&mut self, context: &str, err: &ComposeError) {
        log::error!("{context}: {err}");
        let hint = match err {
            ComposeError::StorageQuotaExceeded { .. } => {
                " Delete a few old looks or use smaller images."
            }
            ComposeError::ExportFailed(_) | ComposeError::ExportBusy => " Try again.",
            _ => "",
        };
        self.status = Some(format!("{context}: {err}.{hint}"));
    }

    fn reload_lists(&mut self) {
        match self.repository.list() {
            Ok(looks) => self.looks = looks,
            Err(err) => self.report_error("Could not read looks", &err),
        }
        match self.repository.wardrobe(self.kind_filter.as_deref()) {
            Ok(items) => self.wardrobe = items,
            Err(err) => self.report_error("Could not read wardrobe", &err),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // File input
    // ─────────────────────────────────────────────────────────────────────────────

    fn pick_images() -> Vec<PathBuf> {
        rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp"])
            .pick_files()
            .unwrap_or_default()
    }

    fn add_upload_paths(&mut self, paths: Vec<PathBuf>) {
        let mut files = Vec::new();
        for path in paths {
            match std::fs::read(&path) {
                Ok(bytes) => files.push((bytes, file_label(&path))),
                Err(err) => log::error!("could not read {}: {err}", path.display()),
            }
        }
        if files.is_empty() {
            return;
        }
        if let Err(err) = self.session.add_uploads(files) {
            self.report_error("Could not add images", &err);
        }
    }

    fn pick_photo(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp"])
            .pick_file()
        else {
            return;
        };
        match std::fs::read(&path) {
            Ok(bytes) => self.session.set_photo_bytes(bytes),
            Err(err) => log::error!("could not read {}: {err}", path.display()),
        }
    }

    fn add_wardrobe_items(&mut self) {
        let kind = self.kind_filter.clone();
        for path in Self::pick_images() {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::error!("could not read {}: {err}", path.display());
                    continue;
                }
            };
            let item = WardrobeItem {
                id: Uuid::new_v4().to_string(),
                image: StableImage::Embedded(EmbeddedImage::sniffed(bytes)),
                name: file_label(&path),
                kind: kind.clone(),
            };
            if let Err(err) = self.repository.add_wardrobe_item(item) {
                self.report_error("Could not add to wardrobe", &err);
                break;
            }
        }
        self.reload_lists();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Export & save
    // ─────────────────────────────────────────────────────────────────────────────

    fn export_png(&mut self) {
        let outcome = match self.session.export_download() {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report_error("Export failed", &err);
                return;
            }
        };
        let mut dialog = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(format!("look.{}", outcome.bitmap.format.extension()));
        if let Some(dir) = &self.exports_dir {
            dialog = dialog.set_directory(dir);
        }
        let Some(path) = dialog.save_file() else {
            return;
        };
        match std::fs::write(&path, &outcome.bitmap.bytes) {
            Ok(()) if outcome.placeholders.is_empty() => {
                self.report(format!("Exported {}", path.display()))
            }
            Ok(()) => self.report(format!(
                "Exported {} with {} missing image(s)",
                path.display(),
                outcome.placeholders.len()
            )),
            Err(err) => self.report_error("Export failed", &err.into()),
        }
    }

    fn save_look(&mut self) {
        match self.session.save_look(&mut self.repository) {
            Ok(look) => {
                self.report(format!("Saved \"{}\"", look.title));
                self.reload_lists();
            }
            Err(err) => self.report_error("Could not save the look", &err),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Textures
    // ─────────────────────────────────────────────────────────────────────────────

    fn load_preview(&self, ctx: &egui::Context, label: String, handle: &ImageHandle) -> Option<TextureHandle> {
        match self.session.resolver().decode_preview(handle, PREVIEW_MAX_SIDE) {
            Ok(pixels) => Some(upload_texture(ctx, label, &pixels)),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }

    /// Keeps one texture per layer, reloading when the layer's image changes.
    fn sync_textures(&mut self, ctx: &egui::Context) {
        let layers: Vec<(LayerId, ImageHandle)> = self
            .session
            .scene()
            .layers()
            .iter()
            .map(|layer| (layer.id, layer.image.clone()))
            .collect();
        self.layer_textures
            .retain(|id, _| layers.iter().any(|(layer_id, _)| layer_id == id));
        for (id, handle) in layers {
            let stale = self
                .layer_textures
                .get(&id)
                .map_or(true, |cached| cached.handle != handle);
            if stale {
                let texture = self.load_preview(ctx, format!("layer-{id}"), &handle);
                self.layer_textures.insert(id, CachedTexture { handle, texture });
            }
        }

        let photo = self.session.photo().map(|photo| photo.image.clone());
        match photo {
            Some(handle)
                if self
                    .photo_texture
                    .as_ref()
                    .map_or(true, |cached| cached.handle != handle) =>
            {
                let texture = self.load_preview(ctx, "photo".to_string(), &handle);
                self.photo_texture = Some(CachedTexture { handle, texture });
            }
            Some(_) => {}
            None => self.photo_texture = None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Canvas
    // ─────────────────────────────────────────────────────────────────────────────

    fn handle_rects(rect: Rect) -> [(Corner, Rect); 4] {
        Corner::ALL.map(|corner| {
            (
                corner,
                Rect::from_center_size(corner.of(rect), Vec2::splat(RESIZE_HANDLE_SIZE)),
            )
        })
    }

    fn pointer_target(&self, screen_pos: Pos2) -> PointerTarget {
        if self.session.mode() == ViewMode::Photo {
            return PointerTarget::Background;
        }
        let viewport = self.session.viewport();
        let scene = self.session.scene();
        if let Some(active) = scene.active_layer() {
            let rect = viewport.rect_to_screen(active.transform.content_rect());
            if let Some((corner, _)) = Self::handle_rects(rect)
                .into_iter()
                .find(|(_, handle)| handle.contains(screen_pos))
            {
                return PointerTarget::ResizeHandle(active.id, corner);
            }
        }
        match scene.hit_test(viewport.screen_to_logical(screen_pos)) {
            Some(id) => PointerTarget::Layer(id),
            None => PointerTarget::Background,
        }
    }

    fn handle_pointer(&mut self, ui: &egui::Ui, canvas_rect: Rect) {
        let (pressed, released, pos, touch) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.interact_pos(),
                i.any_touches(),
            )
        });
        let kind = if touch {
            PointerKind::Touch
        } else {
            PointerKind::Mouse
        };

        if let Some(pos) = pos {
            if pressed && canvas_rect.contains(pos) {
                let target = self.pointer_target(pos);
                self.session.pointer_down(pos, target, kind);
                self.pointer_down = true;
            } else if self.pointer_down && !released {
                self.session.pointer_move(pos);
            }
        }
        // Releases anywhere end the gesture, even outside the canvas.
        if released && self.pointer_down {
            self.pointer_down = false;
            let pos = pos.unwrap_or(canvas_rect.center());
            if let Some(mode) = self.session.pointer_up(pos) {
                log::debug!("switched to {mode:?}");
            }
        }
    }

    fn paint_image(painter: &egui::Painter, texture: Option<&TextureHandle>, center: Pos2, size: Vec2, degrees: f32) {
        let rotation = Rot2::from_angle(degrees.to_radians());
        match texture {
            Some(texture) => {
                let [w, h] = texture.size();
                let k = (size.x / w as f32).min(size.y / h as f32);
                let drawn = Rect::from_center_size(center, vec2(w as f32 * k, h as f32 * k));
                let mut mesh = Mesh::with_texture(texture.id());
                mesh.add_rect_with_uv(
                    drawn,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
                mesh.rotate(rotation, center);
                painter.add(egui::Shape::mesh(mesh));
            }
            None => {
                let mut mesh = Mesh::default();
                mesh.add_colored_rect(Rect::from_center_size(center, size), placeholder_color());
                mesh.rotate(rotation, center);
                painter.add(egui::Shape::mesh(mesh));
            }
        }
    }

    fn paint_collage(&self, painter: &egui::Painter) {
        let viewport = self.session.viewport();
        let scene = self.session.scene();
        let scale = viewport.scale_factor();
        painter.rect_filled(viewport.screen_rect(), 0.0, scene.background());

        for layer in scene.paint_order() {
            let texture = self
                .layer_textures
                .get(&layer.id)
                .and_then(|cached| cached.texture.as_ref());
            Self::paint_image(
                painter,
                texture,
                viewport.logical_to_screen(layer.transform.center()),
                layer.transform.content_size() * scale,
                layer.transform.rotation,
            );
        }

        // Selection decoration lives only here; exports never see it.
        if let Some(active) = scene.active_layer() {
            let rect = viewport.rect_to_screen(active.transform.content_rect());
            let accent = Color32::from_rgb(59, 130, 246);
            painter.rect_stroke(rect, 0.0, Stroke::new(1.5, accent));
            for (_, handle) in Self::handle_rects(rect) {
                painter.rect_filled(handle, 2.0, Color32::WHITE);
                painter.rect_stroke(handle, 2.0, Stroke::new(1.0, accent));
            }
        }
    }

    fn paint_photo(&self, painter: &egui::Painter) {
        let viewport = self.session.viewport();
        let rect = viewport.screen_rect();
        painter.rect_filled(rect, 0.0, self.session.config().photo_background_color());
        match self.session.photo() {
            Some(photo) => Self::paint_image(
                painter,
                self.photo_texture
                    .as_ref()
                    .and_then(|cached| cached.texture.as_ref()),
                rect.center(),
                rect.size() * photo.scale,
                photo.rotation,
            ),
            None => {
                painter.text(
                    rect.center(),
                    Align2::CENTER_CENTER,
                    "No photo yet",
                    FontId::proportional(16.0),
                    Color32::GRAY,
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Panels
    // ─────────────────────────────────────────────────────────────────────────────

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(8.0);
            let icon = |ui: &mut egui::Ui, glyph: &str, hint: &str| {
                ui.add(
                    egui::Button::new(RichText::new(glyph).size(22.0))
                        .min_size(Vec2::new(32.0, 32.0))
                        .frame(false),
                )
                .on_hover_text(hint)
                .clicked()
            };

            if icon(ui, "🖼", "Add Images") {
                let paths = Self::pick_images();
                self.add_upload_paths(paths);
            }
            if icon(ui, "📷", "Set Photo") {
                self.pick_photo();
            }

            ui.separator();
            let mut mode = self.session.mode();
            ui.selectable_value(&mut mode, ViewMode::Collage, "Collage");
            ui.selectable_value(&mut mode, ViewMode::Photo, "Photo");
            self.session.set_mode(mode);

            ui.separator();
            let mut background = self.session.scene().background();
            if egui::color_picker::color_edit_button_srgba(
                ui,
                &mut background,
                egui::color_picker::Alpha::Opaque,
            )
            .changed()
            {
                self.session.set_background(background);
            }

            ui.separator();
            let mut title = self.session.title().to_string();
            if ui
                .add(egui::TextEdit::singleline(&mut title).hint_text("Caption").desired_width(180.0))
                .changed()
            {
                self.session.set_title(title);
            }
            if icon(ui, "⬇", "Export PNG") {
                self.export_png();
            }
            if icon(ui, "💾", "Save Look") {
                self.save_look();
            }
        });
    }

    fn layer_controls(&mut self, ui: &mut egui::Ui) {
        match self.session.mode() {
            ViewMode::Photo => {
                ui.heading("Photo");
                let Some(photo) = self.session.photo() else {
                    ui.label("Pick a photo to adjust it.");
                    return;
                };
                let (mut rotation, mut scale) = (photo.rotation, photo.scale);
                let limit = ROTATION_SLIDER_LIMIT;
                if ui
                    .add(egui::Slider::new(&mut rotation, -limit..=limit).text("Rotation"))
                    .changed()
                {
                    self.session.rotate_photo(rotation);
                }
                if ui
                    .add(egui::Slider::new(&mut scale, MIN_SLIDER_SCALE..=MAX_SLIDER_SCALE).text("Scale"))
                    .changed()
                {
                    if let Err(err) = self.session.scale_photo(scale) {
                        log::debug!("{err}");
                    }
                }
                if ui.button("Reset").clicked() {
                    self.session.reset_photo();
                }
            }
            ViewMode::Collage => {
                ui.heading("Layer");
                let Some(active) = self.session.scene().active_layer() else {
                    ui.label("Click an item on the canvas to select it.");
                    self.layer_list(ui);
                    return;
                };
                let id = active.id;
                let (mut rotation, mut scale) = (active.transform.rotation, active.transform.scale);
                if let Some(name) = &active.display_name {
                    ui.label(name);
                }

                let limit = ROTATION_SLIDER_LIMIT;
                let response =
                    ui.add(egui::Slider::new(&mut rotation, -limit..=limit).text("Rotation"));
                if response.changed() {
                    if self.session.gestures().is_idle() {
                        self.session.begin_rotate(id);
                    }
                    self.session.rotate_to(rotation);
                }
                let rotating = matches!(self.session.gestures().state(), GestureState::Rotating { .. });
                if rotating && !response.dragged() {
                    self.session.end_rotate();
                }

                if ui
                    .add(egui::Slider::new(&mut scale, MIN_SLIDER_SCALE..=MAX_SLIDER_SCALE).text("Scale"))
                    .changed()
                {
                    if let Err(err) = self.session.set_layer_scale(id, scale) {
                        log::debug!("{err}");
                    }
                }

                ui.horizontal(|ui| {
                    if ui.button("Bring to front").clicked() {
                        self.session.bring_to_front(id);
                    }
                    if ui.button("Remove background").clicked() {
                        match self.session.remove_background(&EdgeFloodRemover::default()) {
                            Ok(_) => self.report("Background removed"),
                            Err(err) => self.report_error("Background removal failed", &err),
                        }
                    }
                    if ui.button("Delete").clicked() {
                        self.session.delete_active();
                    }
                });
                ui.separator();
                self.layer_list(ui);
            }
        }
    }

    fn layer_list(&mut self, ui: &mut egui::Ui) {
        let active = self.session.scene().active();
        let entries: Vec<(LayerId, String)> = self
            .session
            .scene()
            .topmost_first()
            .iter()
            .enumerate()
            .map(|(index, layer)| {
                let label = layer
                    .display_name
                    .clone()
                    .unwrap_or_else(|| format!("Layer {}", index + 1));
                (layer.id, label)
            })
            .collect();
        for (id, label) in entries {
            if ui.selectable_label(active == Some(id), label).clicked() {
                self.session.select(Some(id));
            }
        }
    }

    fn wardrobe_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Wardrobe");
        let mut filter = self.kind_filter.clone();
        egui::ComboBox::from_id_salt("kind_filter")
            .selected_text(filter.as_deref().unwrap_or("All"))
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut filter, None, "All");
                for kind in KINDS {
                    ui.selectable_value(&mut filter, Some(kind.to_string()), kind);
                }
            });
        if filter != self.kind_filter {
            self.kind_filter = filter;
            self.reload_lists();
        }
        if ui.button("Add to wardrobe…").clicked() {
            self.add_wardrobe_items();
        }

        let mut picked = None;
        egui::ScrollArea::vertical()
            .id_salt("wardrobe_list")
            .max_height(220.0)
            .show(ui, |ui| {
                for item in &self.wardrobe {
                    let label = item.name.as_deref().unwrap_or("Item");
                    if ui.button(label).clicked() {
                        picked = Some(item.clone());
                    }
                }
            });
        if let Some(item) = picked {
            if let Err(err) = self.session.add_from_wardrobe(&item) {
                self.report_error("Could not add item", &err);
            }
        }
    }

    fn open_look(&mut self, ctx: &egui::Context, id: &str) {
        let Some(look) = self.looks.iter().find(|look| look.id == id) else {
            return;
        };
        let preview = look.preview(self.session.resolver(), PREVIEW_MAX_SIDE);
        let texture = |name: &str, pixels: &Option<RgbaImage>| {
            pixels
                .as_ref()
                .map(|pixels| upload_texture(ctx, format!("look-{id}-{name}"), pixels))
        };
        self.viewer = Some(LookViewer {
            id: look.id.clone(),
            title: look.title.clone(),
            collage: texture("collage", &preview.collage),
            photo: texture("photo", &preview.photo),
            elements: preview
                .elements
                .iter()
                .map(|element| ElementThumb {
                    label: element.display_name.clone().unwrap_or_else(|| "Item".to_string()),
                    texture: texture(&element.id, &element.pixels),
                })
                .collect(),
            showing_photo: preview.photo.is_some(),
        });
    }

    fn look_viewer(&mut self, ctx: &egui::Context) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };
        let mut open = true;
        egui::Window::new(viewer.title.clone())
            .id(egui::Id::new("look_viewer"))
            .open(&mut open)
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut viewer.showing_photo, false, "Collage");
                    ui.selectable_value(&mut viewer.showing_photo, true, "Photo");
                });
                let shown = if viewer.showing_photo {
                    viewer.photo.as_ref()
                } else {
                    viewer.collage.as_ref()
                };
                fitted_image(ui, shown, vec2(270.0, 480.0));

                if !viewer.elements.is_empty() {
                    ui.separator();
                    ui.label("Items");
                    egui::ScrollArea::horizontal()
                        .id_salt("look_elements")
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                for element in &viewer.elements {
                                    fitted_image(
                                        ui,
                                        element.texture.as_ref(),
                                        Vec2::splat(ELEMENT_THUMB_SIDE),
                                    )
                                    .on_hover_text(&element.label);
                                }
                            });
                        });
                }
            });
        if !open {
            self.viewer = None;
        }
    }

    fn looks_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Looks");
        ui.add(egui::TextEdit::singleline(&mut self.query).hint_text("Search by title…"));
        ui.add(egui::TextEdit::singleline(&mut self.comment_draft).hint_text("Comment…"));

        enum Action {
            Open(String),
            Like(String),
            Comment(String),
            Delete(String),
        }
        let mut action = None;
        egui::ScrollArea::vertical()
            .id_salt("looks_list")
            .show(ui, |ui| {
                for look in self.looks.iter().filter(|look| look.matches_query(&self.query)) {
                    let meta = self.repository.meta(&look.id).unwrap_or_default();
                    ui.group(|ui| {
                        if ui
                            .add(egui::Button::new(RichText::new(&look.title).strong()).frame(false))
                            .on_hover_text("Open")
                            .clicked()
                        {
                            action = Some(Action::Open(look.id.clone()));
                        }
                        if let Some(created) = look.created() {
                            ui.label(created.format("%Y-%m-%d %H:%M").to_string());
                        }
                        ui.horizontal(|ui| {
                            let heart = if meta.liked { "❤" } else { "♡" };
                            if ui.button(format!("{heart} {}", meta.likes)).clicked() {
                                action = Some(Action::Like(look.id.clone()));
                            }
                            if ui
                                .button(format!("💬 {}", meta.comments.len()))
                                .on_hover_text("Add the comment above")
                                .clicked()
                            {
                                action = Some(Action::Comment(look.id.clone()));
                            }
                            if ui.button("🗑").on_hover_text("Delete").clicked() {
                                action = Some(Action::Delete(look.id.clone()));
                            }
                        });
                    });
                }
            });

        let result = match action {
            Some(Action::Open(id)) => {
                self.open_look(ui.ctx(), &id);
                return;
            }
            Some(Action::Like(id)) => self.repository.toggle_like(&id).map(|_| ()),
            Some(Action::Comment(id)) => {
                let text = std::mem::take(&mut self.comment_draft);
                self.repository.add_comment(&id, &text).map(|_| ())
            }
            Some(Action::Delete(id)) => {
                if self.viewer.as_ref().is_some_and(|viewer| viewer.id == id) {
                    self.viewer = None;
                }
                self.repository.delete(&id).map(|_| ())
            }
            None => return,
        };
        if let Err(err) = result {
            self.report_error("Could not update the look", &err);
        }
        self.reload_lists();
    }
}

fn placeholder_color() -> Color32 {
    let [r, g, b, a] = PLACEHOLDER_RGBA;
    Color32::from_rgba_unmultiplied(r, g, b, a)
}

fn upload_texture(ctx: &egui::Context, label: String, pixels: &RgbaImage) -> TextureHandle {
    let size = [pixels.width() as usize, pixels.height() as usize];
    let image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_raw());
    ctx.load_texture(label, image, egui::TextureOptions::LINEAR)
}

/// Draws `texture` scaled down to fit `bounds`, or a placeholder box.
fn fitted_image(ui: &mut egui::Ui, texture: Option<&TextureHandle>, bounds: Vec2) -> egui::Response {
    match texture {
        Some(texture) => {
            let size = texture.size_vec2();
            let k = (bounds.x / size.x).min(bounds.y / size.y).min(1.0);
            ui.image((texture.id(), size * k))
        }
        None => {
            let (rect, response) = ui.allocate_exact_size(bounds, Sense::hover());
            ui.painter().rect_filled(rect, 4.0, placeholder_color());
            response
        }
    }
}

fn file_label(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

impl eframe::App for LookboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|file| file.path.clone())
                .collect()
        });
        if !dropped.is_empty() {
            self.add_upload_paths(dropped);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Delete)) && !ctx.wants_keyboard_input() {
            self.session.delete_active();
        }
        self.sync_textures(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(self.status.as_deref().unwrap_or("Ready"));
        });
        egui::SidePanel::left("library")
            .default_width(220.0)
            .show(ctx, |ui| {
                self.wardrobe_panel(ui);
                ui.separator();
                self.looks_panel(ui);
            });
        egui::SidePanel::right("controls")
            .default_width(240.0)
            .show(ctx, |ui| self.layer_controls(ui));

        self.look_viewer(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(Color32::from_rgb(30, 30, 30)))
            .show(ctx, |ui| {
                self.session.viewport_mut().fit_container(ui.available_width());
                let size = self.session.viewport().screen_size();
                let (canvas_rect, _) = ui.allocate_exact_size(size, Sense::click_and_drag());
                self.session.viewport_mut().set_origin(canvas_rect.min);

                self.handle_pointer(ui, canvas_rect);

                let painter = ui.painter_at(canvas_rect);
                match self.session.mode() {
                    ViewMode::Collage => self.paint_collage(&painter),
                    ViewMode::Photo => self.paint_photo(&painter),
                }
            });
    }
}
