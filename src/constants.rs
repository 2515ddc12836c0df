//! Centralized constants for canvas geometry, gestures, export and storage.
//!
//! Every default that [`crate::config::ComposerConfig`] exposes starts here, so the
//! numbers have one home and a name that says what they are for.

// =============================================================================
// CANVAS CONSTANTS
// =============================================================================

/// Width of the logical canvas in logical units.
pub const LOGICAL_CANVAS_WIDTH: f32 = 360.0;

/// Height of the logical canvas in logical units (9:16 with the width).
pub const LOGICAL_CANVAS_HEIGHT: f32 = 640.0;

/// Smallest on-screen width the canvas may shrink to.
pub const MIN_VIEWPORT_WIDTH: f32 = 280.0;

/// Largest on-screen width the canvas may grow to.
pub const MAX_VIEWPORT_WIDTH: f32 = 640.0;

/// Horizontal space reserved around the canvas inside its container.
pub const VIEWPORT_CONTAINER_PADDING: f32 = 16.0;

/// Background behind all collage layers.
pub const DEFAULT_BACKGROUND_HEX: &str = "#f8fafc";

/// Letterbox fill behind the photo layer.
pub const PHOTO_BACKGROUND_HEX: &str = "#ffffff";

// =============================================================================
// LAYER PLACEMENT CONSTANTS
// =============================================================================

/// Top-left offset of the first layer added from the wardrobe.
pub const WARDROBE_ORIGIN: f32 = 60.0;

/// Cascade step per existing layer when adding from the wardrobe.
pub const WARDROBE_CASCADE_STEP: f32 = 12.0;

/// Box size of a layer added from the wardrobe.
pub const WARDROBE_LAYER_SIZE: f32 = 220.0;

/// Top-left offset of the first file in an upload batch.
pub const UPLOAD_ORIGIN: f32 = 40.0;

/// Cascade step per file within an upload batch.
pub const UPLOAD_CASCADE_STEP: f32 = 20.0;

/// Box size of a layer created from an uploaded file.
pub const UPLOAD_LAYER_SIZE: f32 = 180.0;

/// Lower bound of the layer and photo scale sliders.
pub const MIN_SLIDER_SCALE: f32 = 0.5;

/// Upper bound of the layer and photo scale sliders.
pub const MAX_SLIDER_SCALE: f32 = 2.0;

/// Bound of the rotation sliders, in degrees, applied symmetrically.
pub const ROTATION_SLIDER_LIMIT: f32 = 180.0;

// =============================================================================
// GESTURE CONSTANTS
// =============================================================================

/// Minimum horizontal travel, in logical units, for a swipe to switch views.
pub const SWIPE_THRESHOLD: f32 = 40.0;

/// Side length of the square resize handles drawn at layer corners, in screen pixels.
pub const RESIZE_HANDLE_SIZE: f32 = 14.0;

// =============================================================================
// EXPORT CONSTANTS
// =============================================================================

/// Rasterization factor relative to the logical canvas resolution.
pub const EXPORT_SUPERSAMPLE: f32 = 2.0;

/// Width cap for storage-bound exports.
pub const EXPORT_MAX_WIDTH: u32 = 1080;

/// Height cap for storage-bound exports.
pub const EXPORT_MAX_HEIGHT: u32 = 1920;

/// JPEG quality for storage-bound exports (0.82 on a 0..1 scale).
pub const EXPORT_JPEG_QUALITY: u8 = 82;

/// Bounding box applied to transient element images before they are persisted.
pub const ELEMENT_MAX_DIMENSION: u32 = 800;

/// JPEG quality for persisted element images.
pub const ELEMENT_JPEG_QUALITY: u8 = 82;

/// Fill used when a layer's image cannot be resolved.
pub const PLACEHOLDER_RGBA: [u8; 4] = [228, 228, 231, 255];

// =============================================================================
// STORAGE CONSTANTS
// =============================================================================

/// Byte budget of the local record store, mirroring a browser storage quota.
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

/// Current persisted schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Title given to looks saved without a caption.
pub const UNTITLED_LOOK: &str = "Untitled";
