use crate::assets::ImageHandle;
use crate::transform::Transform;
use uuid::Uuid;

pub type LayerId = Uuid;

/// One placed image on the collage canvas.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub image: ImageHandle,
    pub transform: Transform,
    pub z_order: i64,
    pub display_name: Option<String>,
}

impl Layer {
    pub fn new(image: ImageHandle, transform: Transform, z_order: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            transform,
            z_order,
            display_name: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.display_name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

/// The single photo shown in photo mode. It is always centered and contained,
/// so only rotation and scale are adjustable.
#[derive(Clone, Debug)]
pub struct PhotoLayer {
    pub image: ImageHandle,
    pub rotation: f32,
    pub scale: f32,
}

impl PhotoLayer {
    pub fn new(image: ImageHandle) -> Self {
        Self {
            image,
            rotation: 0.0,
            scale: 1.0,
        }
    }

    pub fn reset(&mut self) {
        self.rotation = 0.0;
        self.scale = 1.0;
    }
}
