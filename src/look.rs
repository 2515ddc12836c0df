//! Look records and the adapter that turns exported bitmaps into them.

use crate::assets::{AssetResolver, ImageHandle, StableImage};
use crate::compositor::EncodedBitmap;
use crate::constants::UNTITLED_LOOK;
use crate::services::ImageHost;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A saved composition as shown in the gallery. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Look {
    pub id: String,
    pub title: String,
    /// Unix milliseconds.
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collage: Option<StableImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<StableImage>,
    #[serde(default)]
    pub elements: Vec<LookElement>,
}

/// Snapshot of one layer image used in a look.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookElement {
    pub id: String,
    pub image: StableImage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Look {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty() || self.title.to_lowercase().contains(&query)
    }

    /// Decodes the stored bitmaps and element snapshots for display. Only the
    /// record is read, so this works after the session that made it is gone.
    /// Images that cannot be decoded come back as `None`.
    pub fn preview(&self, resolver: &AssetResolver, max_side: u32) -> LookPreview {
        let decode = |image: &StableImage| {
            resolver
                .decode_preview(&ImageHandle::from(image.clone()), max_side)
                .map_err(|err| log::warn!("look {}: {err}", self.id))
                .ok()
        };
        LookPreview {
            collage: self.collage.as_ref().and_then(decode),
            photo: self.photo.as_ref().and_then(decode),
            elements: self
                .elements
                .par_iter()
                .map(|element| ElementPreview {
                    id: element.id.clone(),
                    display_name: element.display_name.clone(),
                    pixels: decode(&element.image),
                })
                .collect(),
        }
    }
}

/// Pixels of a saved look, in the order the look lists them.
#[derive(Clone, Debug, Default)]
pub struct LookPreview {
    pub collage: Option<RgbaImage>,
    pub photo: Option<RgbaImage>,
    pub elements: Vec<ElementPreview>,
}

#[derive(Clone, Debug)]
pub struct ElementPreview {
    pub id: String,
    pub display_name: Option<String>,
    pub pixels: Option<RgbaImage>,
}

/// Trims a caption and falls back to the default title.
pub fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        UNTITLED_LOOK.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Likes and comments kept next to the looks, keyed by look id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LookMeta {
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub comments: Vec<LookComment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookComment {
    pub id: String,
    pub text: String,
    /// Unix milliseconds.
    pub date: i64,
}

/// A catalogued clothing item that can be dropped onto the collage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub id: String,
    pub image: StableImage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Everything a save produces before it becomes a [`Look`].
#[derive(Clone, Debug, Default)]
pub struct LookDraft {
    pub title: String,
    pub collage: Option<EncodedBitmap>,
    pub photo: Option<EncodedBitmap>,
    pub elements: Vec<LookElement>,
}

/// Builds look records from drafts.
///
/// With an [`ImageHost`] configured the bitmaps are uploaded and the record
/// keeps URLs; otherwise, or when an upload fails, the bitmaps are embedded.
#[derive(Clone, Default)]
pub struct LookPersistence {
    host: Option<Arc<dyn ImageHost>>,
}

impl LookPersistence {
    pub fn new(host: Option<Arc<dyn ImageHost>>) -> Self {
        Self { host }
    }

    pub fn build(&self, draft: LookDraft, now: DateTime<Utc>) -> Look {
        Look {
            id: Uuid::new_v4().to_string(),
            title: normalize_title(&draft.title),
            created_at: now.timestamp_millis(),
            collage: draft.collage.as_ref().map(|bitmap| self.stabilize(bitmap)),
            photo: draft.photo.as_ref().map(|bitmap| self.stabilize(bitmap)),
            elements: draft.elements,
        }
    }

    fn stabilize(&self, bitmap: &EncodedBitmap) -> StableImage {
        let embedded = || StableImage::Embedded(bitmap.to_embedded());
        let Some(host) = &self.host else {
            return embedded();
        };
        match host.upload(&bitmap.bytes, bitmap.format.mime()) {
            Ok(url) if !url.trim().is_empty() => StableImage::Remote(url),
            Ok(_) => {
                log::warn!("image host returned an empty URL, embedding the bitmap");
                embedded()
            }
            Err(err) => {
                log::warn!("upload failed, embedding the bitmap: {err}");
                embedded()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::BitmapFormat;

    struct FailingHost;

    impl ImageHost for FailingHost {
        fn upload(&self, _bytes: &[u8], _mime: &str) -> Result<String, String> {
            Err("503".to_string())
        }
    }

    struct FixedHost;

    impl ImageHost for FixedHost {
        fn upload(&self, bytes: &[u8], mime: &str) -> Result<String, String> {
            Ok(format!("https://img.example/{}-{}", mime.replace('/', "-"), bytes.len()))
        }
    }

    fn bitmap() -> EncodedBitmap {
        EncodedBitmap {
            bytes: vec![1, 2, 3],
            format: BitmapFormat::Jpeg,
            width: 1,
            height: 1,
            quality: Some(82),
        }
    }

    fn draft(title: &str) -> LookDraft {
        LookDraft {
            title: title.to_string(),
            collage: Some(bitmap()),
            photo: None,
            elements: Vec::new(),
        }
    }

    #[test]
    fn titles_are_trimmed_with_default() {
        let persistence = LookPersistence::default();
        let now = Utc::now();
        assert_eq!(persistence.build(draft("  Friday  "), now).title, "Friday");
        assert_eq!(persistence.build(draft("   "), now).title, "Untitled");
        assert_eq!(persistence.build(draft(""), now).created_at, now.timestamp_millis());
    }

    #[test]
    fn failed_upload_falls_back_to_embedding() {
        let look = LookPersistence::new(Some(Arc::new(FailingHost))).build(draft("a"), Utc::now());
        match look.collage {
            Some(StableImage::Embedded(image)) => {
                assert_eq!(image.mime, "image/jpeg");
                assert_eq!(&*image.bytes, &[1, 2, 3]);
            }
            other => panic!("expected embedded collage, got {other:?}"),
        }
        assert_eq!(look.photo, None);
    }

    #[test]
    fn uploaded_bitmaps_are_kept_as_urls() {
        let look = LookPersistence::new(Some(Arc::new(FixedHost))).build(draft("a"), Utc::now());
        assert_eq!(
            look.collage,
            Some(StableImage::Remote("https://img.example/image-jpeg-3".to_string()))
        );
    }

    fn png(width: u32, height: u32, rgba: [u8; 4]) -> StableImage {
        let pixels = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut bytes = Vec::new();
        crate::compositor::encode_png(&pixels, &mut bytes).unwrap();
        StableImage::Embedded(crate::assets::EmbeddedImage::new("image/png", bytes))
    }

    #[test]
    fn saved_looks_display_from_the_record_alone() {
        let look = Look {
            id: "l1".into(),
            title: "Saved".into(),
            created_at: 0,
            collage: Some(png(360, 640, [10, 20, 30, 255])),
            photo: Some(StableImage::Remote("https://img.example/gone.jpg".into())),
            elements: vec![
                LookElement {
                    id: "e1".into(),
                    image: png(1600, 400, [200, 0, 0, 255]),
                    display_name: Some("Scarf".into()),
                },
                LookElement {
                    id: "e2".into(),
                    image: StableImage::Remote("https://img.example/missing.png".into()),
                    display_name: None,
                },
            ],
        };
        // A fresh resolver stands in for a restarted app: no transient images.
        let resolver = AssetResolver::new(
            Arc::new(crate::services::OfflineFetcher),
            crate::assets::TransientStore::new(),
        );

        let preview = look.preview(&resolver, 320);
        let collage = preview.collage.unwrap();
        assert_eq!(collage.dimensions(), (180, 320));
        assert_eq!(collage.get_pixel(90, 160).0, [10, 20, 30, 255]);
        assert!(preview.photo.is_none());

        let ids: Vec<&str> = preview.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
        let scarf = preview.elements[0].pixels.as_ref().unwrap();
        assert_eq!(scarf.dimensions(), (320, 80));
        assert_eq!(preview.elements[0].display_name.as_deref(), Some("Scarf"));
        assert!(preview.elements[1].pixels.is_none());
    }

    #[test]
    fn look_json_uses_camel_case() {
        let look = Look {
            id: "l1".into(),
            title: "t".into(),
            created_at: 1_700_000_000_000,
            collage: Some(StableImage::Remote("https://img.example/c.jpg".into())),
            photo: None,
            elements: vec![LookElement {
                id: "e1".into(),
                image: StableImage::Remote("https://img.example/e.jpg".into()),
                display_name: Some("Coat".into()),
            }],
        };
        let json = serde_json::to_value(&look).unwrap();
        assert_eq!(json["createdAt"], 1_700_000_000_000i64);
        assert_eq!(json["elements"][0]["displayName"], "Coat");
        assert!(json.get("photo").is_none());
        let back: Look = serde_json::from_value(json).unwrap();
        assert_eq!(back, look);
    }
}
