//! Seams to the collaborators that live outside the editor: remote image
//! fetching, background removal and image hosting.

use crate::compositor::encode_png;
use image::RgbaImage;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::Path;

/// Fetches the bytes behind a remote image URL.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>>;
}

/// Sends an encoded image and returns an encoded image with a transparent background.
pub trait BackgroundRemover {
    fn remove_background(&self, encoded: &[u8]) -> Result<Vec<u8>, String>;
}

/// Uploads a bitmap and returns a durable URL for it.
pub trait ImageHost: Send + Sync {
    fn upload(&self, bytes: &[u8], mime: &str) -> Result<String, String>;
}

/// Resolves `file://` URLs and bare absolute paths from the local disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileFetcher;

impl RemoteFetcher for LocalFileFetcher {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(path);
        if !path.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot fetch {url}: only local absolute paths are supported"),
            ));
        }
        fs::read(path)
    }
}

/// Fetcher for sessions without any network access.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineFetcher;

impl RemoteFetcher for OfflineFetcher {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("offline, cannot fetch {url}"),
        ))
    }
}

/// Offline background removal for studio shots: clears the region connected
/// to the image border whose color stays within `tolerance` of the top-left
/// pixel, and returns the result as PNG.
#[derive(Clone, Copy, Debug)]
pub struct EdgeFloodRemover {
    /// Maximum per-channel distance, 0-255.
    pub tolerance: u8,
}

impl Default for EdgeFloodRemover {
    fn default() -> Self {
        Self { tolerance: 24 }
    }
}

impl BackgroundRemover for EdgeFloodRemover {
    fn remove_background(&self, encoded: &[u8]) -> Result<Vec<u8>, String> {
        let mut pixels = image::load_from_memory(encoded)
            .map_err(|err| format!("cannot decode image: {err}"))?
            .to_rgba8();
        let cleared = clear_border_region(&mut pixels, self.tolerance);
        if cleared as u64 == u64::from(pixels.width()) * u64::from(pixels.height()) {
            return Err("image is a single flat color, nothing would remain".to_string());
        }
        log::debug!("cleared {cleared} background pixels");

        let mut out = Vec::new();
        encode_png(&pixels, &mut out).map_err(|err| err.to_string())?;
        Ok(out)
    }
}

/// BFS from every border pixel close to the seed color. Returns how many
/// pixels were made transparent.
fn clear_border_region(pixels: &mut RgbaImage, tolerance: u8) -> usize {
    let (w, h) = pixels.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }
    let seed = pixels.get_pixel(0, 0).0;
    let close = |p: [u8; 4]| {
        p[3] == 0
            || (0..3).all(|c| (p[c] as i16 - seed[c] as i16).unsigned_abs() <= tolerance as u16)
    };

    let mut mask = vec![false; (w * h) as usize];
    let mut queue = VecDeque::new();
    let border = (0..w)
        .flat_map(|x| [(x, 0), (x, h - 1)])
        .chain((0..h).flat_map(|y| [(0, y), (w - 1, y)]));
    for (x, y) in border {
        let idx = (y * w + x) as usize;
        if !mask[idx] && close(pixels.get_pixel(x, y).0) {
            mask[idx] = true;
            queue.push_back((x, y));
        }
    }

    while let Some((px, py)) = queue.pop_front() {
        let neighbors = [
            (px.wrapping_sub(1), py),
            (px + 1, py),
            (px, py.wrapping_sub(1)),
            (px, py + 1),
        ];
        for (nx, ny) in neighbors {
            if nx >= w || ny >= h {
                continue;
            }
            let idx = (ny * w + nx) as usize;
            if !mask[idx] && close(pixels.get_pixel(nx, ny).0) {
                mask[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    let mut cleared = 0;
    for (idx, pixel) in pixels.pixels_mut().enumerate() {
        if mask[idx] {
            pixel.0[3] = 0;
            cleared += 1;
        }
    }
    cleared
}
