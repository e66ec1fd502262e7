//! Dry-run unified diff for `showroom diff`.

use serde_json::Value;
use similar::TextDiff;

use showroom_core::{ContentArea, ContentPath, CropMap};
use showroom_store::ContentStore;

use crate::{merge, SyncError};

/// What would change in one content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDiff {
    pub path: ContentPath,
    /// `None` when the stored document already matches.
    pub unified_diff: Option<String>,
}

impl ContentDiff {
    pub fn is_empty(&self) -> bool {
        self.unified_diff.is_none()
    }
}

/// Compare `local`, with `crops` merged in as a publish would, against what
/// the store holds for `area`.
///
/// The `lastUpdated` / `updatedBy` stamp is ignored on both sides. A missing
/// document diffs against an empty file. Nothing is written.
pub async fn diff_content(
    store: &dyn ContentStore,
    area: &ContentArea,
    local: &Value,
    crops: &CropMap,
) -> Result<ContentDiff, SyncError> {
    merge::validate_payload(local)?;
    merge::validate_crops(crops)?;

    let existing = match store.fetch(&area.path).await? {
        Some(file) => {
            let body: Value = serde_json::from_slice(&file.bytes)?;
            render(&merge::strip_stamp(&body))?
        }
        None => String::new(),
    };
    let prepared = merge::prepare(local, crops, area.crops, &merge::Stamp::now(""));
    let proposed = render(&merge::strip_stamp(&prepared))?;

    if existing == proposed {
        return Ok(ContentDiff {
            path: area.path.clone(),
            unified_diff: None,
        });
    }

    let old_header = format!("a/{}", area.path);
    let new_header = format!("b/{}", area.path);
    let unified = TextDiff::from_lines(&existing, &proposed)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(ContentDiff {
        path: area.path.clone(),
        unified_diff: Some(unified),
    })
}

fn render(value: &Value) -> Result<String, SyncError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use showroom_core::{CropLayout, CropSettings};
    use showroom_store::{LocalStore, PutRequest};
    use tempfile::TempDir;

    fn area() -> ContentArea {
        ContentArea {
            name: "site".to_string(),
            path: ContentPath::from("src/data/content.json"),
            crops: CropLayout::Gallery,
        }
    }

    async fn seed(store: &LocalStore, body: &Value) {
        let bytes = serde_json::to_vec_pretty(body).unwrap();
        store
            .put(PutRequest {
                path: &area().path,
                message: "seed",
                bytes: &bytes,
                version: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn identical_content_has_no_diff() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        seed(&store, &json!({"hero": "Hi"})).await;

        let diff = diff_content(&store, &area(), &json!({"hero": "Hi"}), &CropMap::new())
            .await
            .unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn stamp_changes_do_not_create_diff_noise() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        seed(
            &store,
            &json!({"hero": "Hi", "lastUpdated": "2026-01-01T00:00:00.000Z", "updatedBy": "Carrie"}),
        )
        .await;

        let local = json!({"hero": "Hi", "lastUpdated": "2026-02-02T00:00:00.000Z"});
        let diff = diff_content(&store, &area(), &local, &CropMap::new())
            .await
            .unwrap();
        assert!(diff.is_empty(), "{:?}", diff.unified_diff);
    }

    #[tokio::test]
    async fn edit_produces_unified_diff() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        seed(&store, &json!({"hero": "Hi"})).await;

        let diff = diff_content(&store, &area(), &json!({"hero": "Hello"}), &CropMap::new())
            .await
            .unwrap();
        let text = diff.unified_diff.expect("diff");
        assert!(text.contains("--- a/src/data/content.json"));
        assert!(text.contains("+++ b/src/data/content.json"));
        assert!(text.contains("-  \"hero\": \"Hi\""));
        assert!(text.contains("+  \"hero\": \"Hello\""));
    }

    #[tokio::test]
    async fn missing_document_diffs_against_empty() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let diff = diff_content(&store, &area(), &json!({"hero": "Hi"}), &CropMap::new())
            .await
            .unwrap();
        assert!(diff.unified_diff.expect("diff").contains("+{"));
    }

    #[tokio::test]
    async fn crops_are_merged_before_comparing() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let crops = CropMap::from([(
            "/images/a.png".to_string(),
            CropSettings {
                scale: 1.5,
                x: 20.0,
                y: 80.0,
            },
        )]);
        let local = json!({"gallery": ["/images/a.png"]});
        let published = merge::prepare(&local, &crops, area().crops, &merge::Stamp::now("Carrie"));
        seed(&store, &published).await;

        let same = diff_content(&store, &area(), &local, &crops).await.unwrap();
        assert!(same.is_empty(), "{:?}", same.unified_diff);

        let without = diff_content(&store, &area(), &local, &CropMap::new())
            .await
            .unwrap();
        assert!(without.unified_diff.expect("diff").contains("galleryCrops"));
    }

    #[tokio::test]
    async fn invalid_crop_is_rejected() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let crops = CropMap::from([("".to_string(), CropSettings::default())]);
        let err = diff_content(&store, &area(), &json!({"hero": "Hi"}), &crops)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
