//! Collage composition and export for the lookboard editor.

pub mod assets;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod error;
pub mod gesture;
pub mod layer;
pub mod look;
pub mod paths;
pub mod repository;
pub mod scene;
pub mod services;
pub mod session;
pub mod storage;
pub mod transform;
pub mod viewport;

pub use error::{ComposeError, Result};
