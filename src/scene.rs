//! Scene store for the collage: layer CRUD, z-order and the active selection.
//!
//! All mutations are synchronous. Paint order is z-order, with ties resolved by
//! insertion order, and the store is the single source of truth the gesture
//! controller and the compositor read from.

use crate::assets::ImageHandle;
use crate::error::{ComposeError, Result};
use crate::layer::{Layer, LayerId, PhotoLayer};
use crate::transform::{Transform, TransformPatch};
use egui::{pos2, Color32, Pos2, Vec2};

/// Where new layers land and how big they start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub origin: Pos2,
    pub step: f32,
    pub size: Vec2,
}

impl Placement {
    /// Top-left of the `index`-th layer in a cascade.
    pub fn position_at(&self, index: usize) -> Pos2 {
        self.origin + Vec2::splat(self.step * index as f32)
    }
}

/// Manages the collage layers with operations for lookup, layering and selection.
pub struct SceneStore {
    layers: Vec<Layer>,
    background: Color32,
    active: Option<LayerId>,
    canvas_size: Vec2,
    placement: Placement,
}

/// Read-only copy of a scene taken for export. It never carries a selection.
#[derive(Clone, Debug)]
pub struct SceneSnapshot {
    pub canvas_size: Vec2,
    pub background: Color32,
    /// Layers in paint order, bottom first.
    pub layers: Vec<Layer>,
}

/// Read-only copy of the photo layer taken for export.
#[derive(Clone, Debug)]
pub struct PhotoSnapshot {
    pub canvas_size: Vec2,
    pub background: Color32,
    pub photo: PhotoLayer,
}

impl SceneStore {
    /// Creates an empty scene on a canvas of `canvas_size` logical units.
    pub fn new(canvas_size: Vec2, background: Color32, placement: Placement) -> Self {
        Self {
            layers: Vec::new(),
            background,
            active: None,
            canvas_size,
            placement,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Layer Collection Access
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the layers in insertion order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn canvas_size(&self) -> Vec2 {
        self.canvas_size
    }

    pub fn background(&self) -> Color32 {
        self.background
    }

    pub fn active(&self) -> Option<LayerId> {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.get(id))
    }

    /// Layers bottom to top. Equal z-orders keep insertion order.
    pub fn paint_order(&self) -> Vec<&Layer> {
        let mut ordered: Vec<&Layer> = self.layers.iter().collect();
        ordered.sort_by_key(|layer| layer.z_order);
        ordered
    }

    /// Layers top to bottom, as a layer list shows them.
    pub fn topmost_first(&self) -> Vec<&Layer> {
        let mut ordered = self.paint_order();
        ordered.reverse();
        ordered
    }

    /// Returns the topmost layer whose drawn content box contains `point`.
    pub fn hit_test(&self, point: Pos2) -> Option<LayerId> {
        self.topmost_first()
            .into_iter()
            .find(|layer| layer.transform.content_rect().contains(point))
            .map(|layer| layer.id)
    }

    fn next_z(&self) -> i64 {
        self.layers
            .iter()
            .map(|layer| layer.z_order)
            .max()
            .map_or(1, |max| max + 1)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Layer CRUD
    // ─────────────────────────────────────────────────────────────────────────────

    /// Adds a layer on top of every existing one.
    ///
    /// Without an explicit position the layer is cascaded from the previous
    /// addition so stacked imports stay visible.
    pub fn add_layer(
        &mut self,
        image: ImageHandle,
        initial_position: Option<Pos2>,
    ) -> Result<LayerId> {
        let placement = self.placement;
        let position = initial_position.unwrap_or_else(|| placement.position_at(self.layers.len()));
        self.insert(image, None, position, placement.size)
    }

    /// Adds a named layer using a caller-specific placement, cascading by the
    /// number of layers already on the canvas.
    pub fn add_placed(
        &mut self,
        image: ImageHandle,
        name: Option<String>,
        placement: &Placement,
    ) -> Result<LayerId> {
        let position = placement.position_at(self.layers.len());
        self.insert(image, name, position, placement.size)
    }

    /// Adds a batch of layers, cascading by position within the batch.
    pub fn add_batch(
        &mut self,
        images: Vec<(ImageHandle, Option<String>)>,
        placement: &Placement,
    ) -> Result<Vec<LayerId>> {
        let mut ids = Vec::with_capacity(images.len());
        for (index, (image, name)) in images.into_iter().enumerate() {
            ids.push(self.insert(image, name, placement.position_at(index), placement.size)?);
        }
        Ok(ids)
    }

    fn insert(
        &mut self,
        image: ImageHandle,
        name: Option<String>,
        position: Pos2,
        size: Vec2,
    ) -> Result<LayerId> {
        let transform = Transform::new(position, size)?;
        let layer = Layer::new(image, transform, self.next_z()).with_name(name);
        let id = layer.id;
        log::debug!("added layer {id} at z={}", layer.z_order);
        self.layers.push(layer);
        Ok(id)
    }

    /// Merges `patch` into the layer's transform.
    ///
    /// Unknown ids are a no-op. A patch that would make the layer degenerate is
    /// rejected and the previous transform is kept.
    pub fn update_layer(&mut self, id: LayerId, patch: &TransformPatch) -> Result<()> {
        let Some(layer) = self.layers.iter_mut().find(|layer| layer.id == id) else {
            return Ok(());
        };
        layer.transform = layer.transform.merged(patch)?;
        Ok(())
    }

    /// Swaps the image behind a layer, e.g. after background removal.
    pub fn set_image(&mut self, id: LayerId, image: ImageHandle) -> Result<()> {
        let layer = self
            .layers
            .iter_mut()
            .find(|layer| layer.id == id)
            .ok_or(ComposeError::LayerNotFound(id))?;
        layer.image = image;
        Ok(())
    }

    /// Removes a layer, clearing the selection if it was active.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        let index = self.layers.iter().position(|layer| layer.id == id)?;
        if self.active == Some(id) {
            self.active = None;
        }
        Some(self.layers.remove(index))
    }

    /// Selects a layer, deselecting any other. Unknown ids leave the selection alone.
    pub fn set_active(&mut self, id: Option<LayerId>) -> bool {
        match id {
            Some(id) if self.get(id).is_none() => false,
            _ => {
                self.active = id;
                true
            }
        }
    }

    /// Moves a layer above every other one.
    pub fn bring_to_front(&mut self, id: LayerId) {
        let max_other = self
            .layers
            .iter()
            .filter(|layer| layer.id != id)
            .map(|layer| layer.z_order)
            .max();
        let (Some(max_other), Some(layer)) = (
            max_other,
            self.layers.iter_mut().find(|layer| layer.id == id),
        ) else {
            return;
        };
        if layer.z_order <= max_other {
            layer.z_order = max_other + 1;
        }
    }

    pub fn set_background(&mut self, color: Color32) {
        self.background = color;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────────

    /// Copies the scene for rasterization, without any selection state.
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            canvas_size: self.canvas_size,
            background: self.background,
            layers: self.paint_order().into_iter().cloned().collect(),
        }
    }
}

/// Parses `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(hex: &str) -> Option<Color32> {
    let digits = hex.trim().strip_prefix('#')?;
    if !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
    match digits.len() {
        6 => Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?)),
        8 => Some(Color32::from_rgba_unmultiplied(
            channel(0)?,
            channel(2)?,
            channel(4)?,
            channel(6)?,
        )),
        _ => None,
    }
}

pub fn to_hex_color(color: Color32) -> String {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    if a == 255 {
        format!("#{r:02x}{g:02x}{b:02x}")
    } else {
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            origin: pos2(
                crate::constants::WARDROBE_ORIGIN,
                crate::constants::WARDROBE_ORIGIN,
            ),
            step: crate::constants::WARDROBE_CASCADE_STEP,
            size: Vec2::splat(crate::constants::WARDROBE_LAYER_SIZE),
        }
    }
}
