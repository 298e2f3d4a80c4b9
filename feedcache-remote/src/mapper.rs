//! Wire format of the feed endpoint.
//!
//! ```json
//! {"items": [{"image_id": "...", "image_desc": "...", "image_loc": "...", "image_url": "..."}]}
//! ```
//!
//! `image_desc` and `image_loc` may be missing or null.

use feedcache_core::{FeedImage, RemoteError};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::http::HttpResponse;

const OK_STATUS: u16 = 200;

#[derive(Debug, Deserialize)]
struct Root {
    items: Vec<RemoteFeedItem>,
}

#[derive(Debug, Deserialize)]
struct RemoteFeedItem {
    image_id: Uuid,
    #[serde(default)]
    image_desc: Option<String>,
    #[serde(default)]
    image_loc: Option<String>,
    image_url: Url,
}

impl From<RemoteFeedItem> for FeedImage {
    fn from(item: RemoteFeedItem) -> Self {
        FeedImage::new(item.image_id, item.image_desc, item.image_loc, item.image_url)
    }
}

/// Maps a feed endpoint response to feed images.
pub struct FeedItemsMapper;

impl FeedItemsMapper {
    /// Map `body` received with `status`.
    ///
    /// Anything but a 200 carrying a well-formed payload is
    /// [`RemoteError::InvalidData`].
    pub fn map(body: &[u8], status: u16) -> Result<Vec<FeedImage>, RemoteError> {
        if status != OK_STATUS {
            debug!(status, "Feed endpoint returned non-200 status");
            return Err(RemoteError::InvalidData);
        }

        let root: Root = serde_json::from_slice(body).map_err(|e| {
            debug!(error = %e, "Feed payload failed to decode");
            RemoteError::InvalidData
        })?;

        Ok(root.items.into_iter().map(FeedImage::from).collect())
    }

    pub fn map_response(response: &HttpResponse) -> Result<Vec<FeedImage>, RemoteError> {
        Self::map(&response.body, response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn item_json(image: &FeedImage) -> serde_json::Value {
        let mut item = json!({
            "image_id": image.id,
            "image_url": image.url,
        });
        if let Some(description) = &image.description {
            item["image_desc"] = json!(description);
        }
        if let Some(location) = &image.location {
            item["image_loc"] = json!(location);
        }
        item
    }

    fn items_body(images: &[FeedImage]) -> Vec<u8> {
        let items: Vec<_> = images.iter().map(item_json).collect();
        serde_json::to_vec(&json!({ "items": items })).expect("json encodes")
    }

    fn make_image(description: Option<&str>, location: Option<&str>) -> FeedImage {
        FeedImage::new(
            Uuid::new_v4(),
            description.map(str::to_string),
            location.map(str::to_string),
            Url::parse("http://another-url.com").expect("valid url"),
        )
    }

    #[test]
    fn test_maps_items_on_200() {
        let images = vec![
            make_image(None, None),
            make_image(Some("a description"), Some("a location")),
        ];

        let mapped = FeedItemsMapper::map(&items_body(&images), 200).expect("should map");
        assert_eq!(mapped, images);
    }

    #[test]
    fn test_maps_empty_list() {
        let mapped = FeedItemsMapper::map(br#"{"items":[]}"#, 200).expect("should map");
        assert!(mapped.is_empty());
    }

    #[test]
    fn test_accepts_null_optionals() {
        let body = format!(
            r#"{{"items":[{{"image_id":"{}","image_desc":null,"image_loc":null,"image_url":"http://a-url.com/"}}]}}"#,
            Uuid::new_v4()
        );
        let mapped = FeedItemsMapper::map(body.as_bytes(), 200).expect("should map");
        assert_eq!(mapped[0].description, None);
        assert_eq!(mapped[0].location, None);
    }

    #[test]
    fn test_rejects_invalid_json_on_200() {
        assert_eq!(
            FeedItemsMapper::map(b"invalid json", 200),
            Err(RemoteError::InvalidData)
        );
    }

    #[test]
    fn test_rejects_missing_items_key() {
        assert_eq!(
            FeedItemsMapper::map(br#"{"images":[]}"#, 200),
            Err(RemoteError::InvalidData)
        );
    }

    #[test]
    fn test_map_response_reads_status_and_body() {
        let response = HttpResponse::new(200, br#"{"items":[]}"#.to_vec());
        assert_eq!(FeedItemsMapper::map_response(&response), Ok(Vec::new()));
    }

    proptest! {
        #[test]
        fn prop_rejects_non_200_status(status in 100u16..600u16) {
            prop_assume!(status != 200);
            prop_assert_eq!(
                FeedItemsMapper::map(br#"{"items":[]}"#, status),
                Err(RemoteError::InvalidData)
            );
        }
    }
}
