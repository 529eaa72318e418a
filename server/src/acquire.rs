//! Image acquisition for `/api/predict`
//!
//! JSON bodies: `imageUrl` if the key is present, else `image` (base64,
//! optionally a data URI). Multipart: file field `image` if present, else
//! `file`. Key presence decides; an unusable value fails later instead of
//! falling through to the next source.

use axum::body::Bytes;
use axum::extract::Multipart;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

/// Where the request's image comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    Base64(String),
    Upload { filename: String, bytes: Bytes },
}

impl ImageSource {
    /// Pick the source from a parsed JSON body
    ///
    /// Non-string values are taken as empty and rejected when fetched or
    /// decoded.
    pub fn from_json(body: &Value) -> Option<Self> {
        let field = |name: &str| {
            body.get(name)
                .map(|value| value.as_str().unwrap_or_default().to_string())
        };

        field("imageUrl")
            .map(Self::Url)
            .or_else(|| field("image").map(Self::Base64))
    }

    /// Pick the source from a multipart form
    ///
    /// The first `image` file field wins over any `file` field, and a chosen
    /// field with an empty filename means no image.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Option<Self>, ApiError> {
        let mut image: Option<Option<Self>> = None;
        let mut file: Option<Option<Self>> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
        {
            let slot = match field.name() {
                Some("image") if image.is_none() => &mut image,
                Some("file") if file.is_none() => &mut file,
                _ => continue,
            };

            // Fields without a filename parameter are form values, not files
            let filename = match field.file_name() {
                Some(f) => f.to_string(),
                None => continue,
            };

            if filename.is_empty() {
                *slot = Some(None);
                continue;
            }

            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            *slot = Some(Some(Self::Upload { filename, bytes }));
        }

        Ok(match image {
            Some(chosen) => chosen,
            None => file.flatten(),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => format!("URL {}", url),
            Self::Base64(data) => format!("base64 ({} chars)", data.len()),
            Self::Upload { filename, bytes } => {
                format!("upload '{}' ({} bytes)", filename, bytes.len())
            }
        }
    }

    /// Fetch or decode the encoded image bytes
    pub async fn into_bytes(self, client: &reqwest::Client) -> Result<Vec<u8>, ApiError> {
        match self {
            Self::Url(url) => download_image(client, &url).await,
            Self::Base64(data) => decode_base64_image(&data),
            Self::Upload { bytes, .. } => Ok(bytes.to_vec()),
        }
    }
}

/// Decode base64 image data. A data-URI prefix is dropped by keeping only
/// the segment after the first comma.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, ApiError> {
    let payload = if data.contains(',') {
        data.split(',').nth(1).unwrap_or_default()
    } else {
        data
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| ApiError::InvalidBase64(e.to_string()))
}

/// GET the image at `url`; transport errors and non-2xx statuses both fail
pub async fn download_image(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, ApiError> {
    if url.trim().is_empty() {
        return Err(ApiError::Download("no URL given".to_string()));
    }
    debug!("Downloading image from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ApiError::Download(e.to_string()))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Download(e.to_string()))?;

    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_takes_priority() {
        let body = json!({ "imageUrl": "http://x/leaf.jpg", "image": "aGk=" });
        assert_eq!(
            ImageSource::from_json(&body),
            Some(ImageSource::Url("http://x/leaf.jpg".into()))
        );
    }

    #[test]
    fn test_present_url_key_wins_even_when_empty() {
        let body = json!({ "imageUrl": "", "image": "aGk=" });
        assert_eq!(ImageSource::from_json(&body), Some(ImageSource::Url(String::new())));

        let body = json!({ "imageUrl": null });
        assert_eq!(ImageSource::from_json(&body), Some(ImageSource::Url(String::new())));
    }

    #[test]
    fn test_base64_fallback_and_absent() {
        let body = json!({ "image": "aGk=" });
        assert_eq!(
            ImageSource::from_json(&body),
            Some(ImageSource::Base64("aGk=".into()))
        );
        assert_eq!(
            ImageSource::from_json(&json!({ "image": 42 })),
            Some(ImageSource::Base64(String::new()))
        );

        assert_eq!(ImageSource::from_json(&json!({ "other": 1 })), None);
        assert_eq!(ImageSource::from_json(&json!(["imageUrl"])), None);
    }

    #[test]
    fn test_decode_strips_data_uri() {
        assert_eq!(decode_base64_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_image("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert_eq!(decode_base64_image("aGVs\nbG8=").unwrap(), b"hello");
        // Only the segment between the first and second comma is kept
        assert_eq!(decode_base64_image("data:x,aGVsbG8=,aGk=").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_base64_image("data:image/png;base64,***"),
            Err(ApiError::InvalidBase64(_))
        ));
    }

    #[tokio::test]
    async fn test_download_unreachable_host() {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let result = download_image(&client, "http://127.0.0.1:9/leaf.jpg").await;
        assert!(matches!(result, Err(ApiError::Download(_))));

        let result = download_image(&client, "").await;
        assert!(matches!(result, Err(ApiError::Download(_))));
    }
}
