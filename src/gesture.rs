//! Pointer interpretation for the collage canvas.
//!
//! One gesture is active at a time. Moves and resizes are applied to the scene
//! live, so releasing the pointer only has to settle the final position. Every
//! gesture ends on pointer-up, wherever the pointer happens to be.

use crate::layer::LayerId;
use crate::scene::SceneStore;
use crate::transform::{Corner, TransformPatch};
use crate::viewport::Viewport;
use egui::{Pos2, Rect};

/// Which of the two editor views is showing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Collage,
    Photo,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Collage => ViewMode::Photo,
            ViewMode::Photo => ViewMode::Collage,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

/// What was under the pointer when it went down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Layer(LayerId),
    ResizeHandle(LayerId, Corner),
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureState {
    Idle,
    Dragging {
        id: LayerId,
        start_position: Pos2,
        pointer_origin: Pos2,
    },
    Resizing {
        id: LayerId,
        corner: Corner,
        start_rect: Rect,
        pointer_origin: Pos2,
    },
    Rotating {
        id: LayerId,
    },
    Swiping {
        origin: Pos2,
    },
}

/// Interprets pointer input into scene mutations. Pointer positions are in
/// screen space; everything stored is logical.
#[derive(Clone, Debug)]
pub struct GestureController {
    state: GestureState,
    swipe_threshold: f32,
}

impl GestureController {
    pub fn new(swipe_threshold: f32) -> Self {
        Self {
            state: GestureState::Idle,
            swipe_threshold,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == GestureState::Idle
    }

    /// Starts a gesture. Any layer press selects that layer first; a press on
    /// the background clears the selection.
    pub fn pointer_down(
        &mut self,
        scene: &mut SceneStore,
        viewport: &Viewport,
        screen_pos: Pos2,
        target: PointerTarget,
        kind: PointerKind,
    ) {
        if !self.is_idle() {
            log::debug!("pointer down during {:?}, committing it first", self.state);
            self.commit();
        }
        let pointer_origin = viewport.screen_to_logical(screen_pos);

        self.state = match target {
            PointerTarget::Layer(id) => match scene.get(id).map(|l| l.transform.position) {
                Some(start_position) => {
                    scene.set_active(Some(id));
                    GestureState::Dragging {
                        id,
                        start_position,
                        pointer_origin,
                    }
                }
                None => GestureState::Idle,
            },
            PointerTarget::ResizeHandle(id, corner) => match scene.get(id).map(|l| l.transform.content_rect()) {
                Some(start_rect) => {
                    scene.set_active(Some(id));
                    GestureState::Resizing {
                        id,
                        corner,
                        start_rect,
                        pointer_origin,
                    }
                }
                None => GestureState::Idle,
            },
            PointerTarget::Background => {
                scene.set_active(None);
                match kind {
                    PointerKind::Touch => GestureState::Swiping {
                        origin: pointer_origin,
                    },
                    PointerKind::Mouse => GestureState::Idle,
                }
            }
        };
    }

    pub fn pointer_move(&mut self, scene: &mut SceneStore, viewport: &Viewport, screen_pos: Pos2) {
        let pointer = viewport.screen_to_logical(screen_pos);
        match self.state {
            GestureState::Dragging {
                id,
                start_position,
                pointer_origin,
            } => {
                let patch = TransformPatch::position(start_position + (pointer - pointer_origin));
                apply(scene, id, &patch);
            }
            GestureState::Resizing {
                id,
                corner,
                start_rect,
                pointer_origin,
            } => {
                let Some(transform) = scene.get(id).map(|l| l.transform) else {
                    return;
                };
                let content = corner.drag(start_rect, pointer - pointer_origin);
                apply(scene, id, &TransformPatch::rect(transform.rect_for_content(content)));
            }
            GestureState::Idle | GestureState::Rotating { .. } | GestureState::Swiping { .. } => {}
        }
    }

    /// Ends the current gesture. Returns the view to switch to when the
    /// gesture was a qualifying swipe.
    pub fn pointer_up(
        &mut self,
        scene: &mut SceneStore,
        viewport: &Viewport,
        screen_pos: Pos2,
        mode: ViewMode,
    ) -> Option<ViewMode> {
        self.pointer_move(scene, viewport, screen_pos);
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        let GestureState::Swiping { origin } = state else {
            return None;
        };
        let delta = viewport.screen_to_logical(screen_pos) - origin;
        self.swipe_target(delta.x, delta.y, mode)
    }

    /// Decides whether a swipe of `(dx, dy)` logical units switches views.
    /// Swiping right in the collage reveals the photo, swiping left in the
    /// photo returns to the collage.
    pub fn swipe_target(&self, dx: f32, dy: f32, mode: ViewMode) -> Option<ViewMode> {
        if dx.abs() < self.swipe_threshold || dx.abs() <= dy.abs() {
            return None;
        }
        match (mode, dx > 0.0) {
            (ViewMode::Collage, true) => Some(ViewMode::Photo),
            (ViewMode::Photo, false) => Some(ViewMode::Collage),
            _ => None,
        }
    }

    /// Starts a rotation from the rotation control of layer `id`.
    pub fn begin_rotate(&mut self, scene: &mut SceneStore, id: LayerId) {
        if !self.is_idle() {
            self.commit();
        }
        if scene.set_active(Some(id)) {
            self.state = GestureState::Rotating { id };
        }
    }

    pub fn rotate_to(&mut self, scene: &mut SceneStore, degrees: f32) {
        if let GestureState::Rotating { id } = self.state {
            apply(scene, id, &TransformPatch::rotation(degrees));
        }
    }

    pub fn end_rotate(&mut self) {
        if matches!(self.state, GestureState::Rotating { .. }) {
            self.state = GestureState::Idle;
        }
    }

    /// Force-terminates whatever is in flight, keeping what was applied so far.
    /// A pending swipe is dropped without switching views.
    pub fn commit(&mut self) -> bool {
        let was_active = !self.is_idle();
        self.state = GestureState::Idle;
        was_active
    }
}

fn apply(scene: &mut SceneStore, id: LayerId, patch: &TransformPatch) {
    if let Err(err) = scene.update_layer(id, patch) {
        log::debug!("ignored gesture step for layer {id}: {err}");
    }
}
