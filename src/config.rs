//! Runtime configuration, read from `config.json` in the data directory.
//!
//! Every field has a default, so a partial file only overrides what it names.

use crate::assets::MaterializeOptions;
use crate::compositor::ExportSettings;
use crate::constants::*;
use crate::scene::{parse_hex_color, Placement};
use crate::viewport::Viewport;
use egui::{pos2, vec2, Color32};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlacementConfig {
    pub origin: [f32; 2],
    pub step: f32,
    pub size: [f32; 2],
}

impl PlacementConfig {
    /// Cascade used when a wardrobe item is dropped onto the collage.
    pub fn wardrobe() -> Self {
        Self {
            origin: [WARDROBE_ORIGIN, WARDROBE_ORIGIN],
            step: WARDROBE_CASCADE_STEP,
            size: [WARDROBE_LAYER_SIZE, WARDROBE_LAYER_SIZE],
        }
    }

    /// Cascade used for a batch of uploaded files.
    pub fn upload() -> Self {
        Self {
            origin: [UPLOAD_ORIGIN, UPLOAD_ORIGIN],
            step: UPLOAD_CASCADE_STEP,
            size: [UPLOAD_LAYER_SIZE, UPLOAD_LAYER_SIZE],
        }
    }

    pub fn to_placement(self) -> Placement {
        Placement {
            origin: pos2(self.origin[0], self.origin[1]),
            step: self.step,
            size: vec2(self.size[0], self.size[1]),
        }
    }
}

/// A placement table as written in the file. Fields it leaves out come from
/// the preset of the table it appears under.
#[derive(Deserialize)]
struct PlacementOverrides {
    origin: Option<[f32; 2]>,
    step: Option<f32>,
    size: Option<[f32; 2]>,
}

impl PlacementOverrides {
    fn over(self, preset: PlacementConfig) -> PlacementConfig {
        PlacementConfig {
            origin: self.origin.unwrap_or(preset.origin),
            step: self.step.unwrap_or(preset.step),
            size: self.size.unwrap_or(preset.size),
        }
    }
}

fn wardrobe_placement<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<PlacementConfig, D::Error> {
    PlacementOverrides::deserialize(deserializer).map(|o| o.over(PlacementConfig::wardrobe()))
}

fn upload_placement<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<PlacementConfig, D::Error> {
    PlacementOverrides::deserialize(deserializer).map(|o| o.over(PlacementConfig::upload()))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub min_viewport_width: f32,
    pub max_viewport_width: f32,
    pub container_padding: f32,
    pub swipe_threshold: f32,
    pub export_supersample: f32,
    pub export_max_width: u32,
    pub export_max_height: u32,
    pub export_jpeg_quality: u8,
    pub element_max_dimension: u32,
    pub element_jpeg_quality: u8,
    #[serde(deserialize_with = "wardrobe_placement")]
    pub wardrobe_placement: PlacementConfig,
    #[serde(deserialize_with = "upload_placement")]
    pub upload_placement: PlacementConfig,
    pub background: String,
    pub photo_background: String,
    pub storage_quota: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            canvas_width: LOGICAL_CANVAS_WIDTH,
            canvas_height: LOGICAL_CANVAS_HEIGHT,
            min_viewport_width: MIN_VIEWPORT_WIDTH,
            max_viewport_width: MAX_VIEWPORT_WIDTH,
            container_padding: VIEWPORT_CONTAINER_PADDING,
            swipe_threshold: SWIPE_THRESHOLD,
            export_supersample: EXPORT_SUPERSAMPLE,
            export_max_width: EXPORT_MAX_WIDTH,
            export_max_height: EXPORT_MAX_HEIGHT,
            export_jpeg_quality: EXPORT_JPEG_QUALITY,
            element_max_dimension: ELEMENT_MAX_DIMENSION,
            element_jpeg_quality: ELEMENT_JPEG_QUALITY,
            wardrobe_placement: PlacementConfig::wardrobe(),
            upload_placement: PlacementConfig::upload(),
            background: DEFAULT_BACKGROUND_HEX.to_string(),
            photo_background: PHOTO_BACKGROUND_HEX.to_string(),
            storage_quota: DEFAULT_STORAGE_QUOTA,
        }
    }
}

impl ComposerConfig {
    /// Reads the config at `path`. A missing file gives the defaults; an
    /// unreadable one is logged and also gives the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                log::warn!("could not read {}: {err}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("ignoring malformed {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            supersample: self.export_supersample,
            max_width: self.export_max_width,
            max_height: self.export_max_height,
            jpeg_quality: self.export_jpeg_quality,
        }
    }

    pub fn materialize_options(&self) -> MaterializeOptions {
        MaterializeOptions {
            max_width: self.element_max_dimension,
            max_height: self.element_max_dimension,
            jpeg_quality: self.element_jpeg_quality,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(
            vec2(self.canvas_width, self.canvas_height),
            self.min_viewport_width,
            self.max_viewport_width,
            self.container_padding,
        )
    }

    pub fn background_color(&self) -> Color32 {
        color_or(&self.background, DEFAULT_BACKGROUND_HEX)
    }

    pub fn photo_background_color(&self) -> Color32 {
        color_or(&self.photo_background, PHOTO_BACKGROUND_HEX)
    }
}

fn color_or(hex: &str, fallback: &str) -> Color32 {
    parse_hex_color(hex)
        .or_else(|| {
            log::warn!("invalid color {hex:?}, using {fallback}");
            parse_hex_color(fallback)
        })
        .unwrap_or(Color32::WHITE)
}
