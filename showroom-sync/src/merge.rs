//! Attach crop settings and the edit stamp to a content payload.
//!
//! [`prepare`] never touches the caller's value; it works on a deep copy.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use showroom_core::{CropLayout, CropMap, CropSettings};

use crate::SyncError;

/// Root side-map used by [`CropLayout::Gallery`].
pub const GALLERY_CROPS_KEY: &str = "galleryCrops";
/// Per-item field used by [`CropLayout::PerItem`].
pub const ITEM_CROP_KEY: &str = "imageCrop";
/// Field holding an item's image path under [`CropLayout::PerItem`].
pub const ITEM_IMAGE_KEY: &str = "image";
pub const LAST_UPDATED_KEY: &str = "lastUpdated";
pub const UPDATED_BY_KEY: &str = "updatedBy";

/// Who edited the document and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub by: String,
}

impl Stamp {
    pub fn now(by: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            by: by.into(),
        }
    }
}

/// Reject payloads that cannot be published: non-objects and `{}`.
pub fn validate_payload(payload: &Value) -> Result<(), SyncError> {
    match payload {
        Value::Object(map) if map.is_empty() => {
            Err(SyncError::Validation("payload is empty".to_string()))
        }
        Value::Object(_) => Ok(()),
        other => Err(SyncError::Validation(format!(
            "payload must be a JSON object, got {}",
            kind_of(other)
        ))),
    }
}

/// Check every crop, naming the offending image.
pub fn validate_crops(crops: &CropMap) -> Result<(), SyncError> {
    for (image, crop) in crops {
        if image.trim().is_empty() {
            return Err(SyncError::Validation("crop key is empty".to_string()));
        }
        crop.validate()
            .map_err(|reason| SyncError::Validation(format!("crop for '{image}': {reason}")))?;
    }
    Ok(())
}

/// Deep copy of `payload` with crops attached per `layout` and the stamp set.
///
/// Non-object payloads are returned unchanged; callers validate first.
pub fn prepare(payload: &Value, crops: &CropMap, layout: CropLayout, stamp: &Stamp) -> Value {
    let mut merged = payload.clone();
    let Value::Object(root) = &mut merged else {
        return merged;
    };

    if !crops.is_empty() {
        match layout {
            CropLayout::Gallery => attach_gallery_crops(root, crops),
            CropLayout::PerItem => {
                for value in root.values_mut() {
                    attach_item_crops(value, crops);
                }
            }
        }
    }

    root.insert(
        LAST_UPDATED_KEY.to_string(),
        Value::String(stamp.at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    root.insert(UPDATED_BY_KEY.to_string(), Value::String(stamp.by.clone()));
    merged
}

/// Copy of `payload` without `lastUpdated` / `updatedBy`.
pub fn strip_stamp(payload: &Value) -> Value {
    let mut stripped = payload.clone();
    if let Value::Object(root) = &mut stripped {
        root.remove(LAST_UPDATED_KEY);
        root.remove(UPDATED_BY_KEY);
    }
    stripped
}

/// Crop stored for `image` in an already-prepared gallery document.
pub fn gallery_crop(document: &Value, image: &str) -> Option<CropSettings> {
    let entry = document.get(GALLERY_CROPS_KEY)?.get(image)?;
    serde_json::from_value(entry.clone()).ok()
}

fn attach_gallery_crops(root: &mut Map<String, Value>, crops: &CropMap) {
    let side_map = root
        .entry(GALLERY_CROPS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !side_map.is_object() {
        *side_map = Value::Object(Map::new());
    }
    if let Value::Object(entries) = side_map {
        for (image, crop) in crops {
            entries.insert(image.clone(), crop_value(crop));
        }
    }
}

fn attach_item_crops(value: &mut Value, crops: &CropMap) {
    match value {
        Value::Array(items) => {
            for item in items {
                attach_item_crops(item, crops);
            }
        }
        Value::Object(fields) => {
            let crop = fields
                .get(ITEM_IMAGE_KEY)
                .and_then(Value::as_str)
                .and_then(|image| crops.get(image));
            if let Some(crop) = crop {
                let crop = crop_value(crop);
                fields.insert(ITEM_CROP_KEY.to_string(), crop);
            }
            for (key, nested) in fields.iter_mut() {
                if key != ITEM_CROP_KEY {
                    attach_item_crops(nested, crops);
                }
            }
        }
        _ => {}
    }
}

fn crop_value(crop: &CropSettings) -> Value {
    serde_json::json!({ "scale": crop.scale, "x": crop.x, "y": crop.y })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
