// src/services/image_processor.rs
use std::io::Cursor;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use bytes::BytesMut;
use futures_util::StreamExt;
use image::ImageFormat as ImgFormat;
use log::debug;
use reqwest::{Client, Url, header};

use crate::errors::AnalyzerError;
use crate::models::ImageInput;

const MAX_DIMENSION: u32 = 8192;

pub struct ImageProcessor {
    max_bytes: usize,
    allowed_mime_types: Vec<String>,
    client: Client,
}

impl ImageProcessor {
    pub fn new(
        max_bytes: usize,
        allowed_mime_types: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalyzerError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            max_bytes,
            allowed_mime_types: allowed_mime_types
                .into_iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            client,
        })
    }

    pub fn is_allowed(&self, mime_type: &str) -> bool {
        let mime = mime_type.to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|m| *m == mime)
    }

    /// Size, type and header checks for an uploaded image.
    pub fn validate_upload(&self, data: &[u8], mime_type: &str) -> Result<(u32, u32), AnalyzerError> {
        if data.is_empty() {
            return Err(AnalyzerError::Validation("Uploaded image is empty".to_string()));
        }
        if data.len() > self.max_bytes {
            return Err(AnalyzerError::Validation("Image is too large".to_string()));
        }
        if !self.is_allowed(mime_type) {
            return Err(AnalyzerError::Validation(format!(
                "Unsupported image type: {}",
                mime_type
            )));
        }
        validate_image(data).map_err(AnalyzerError::Validation)
    }

    /// Downloads an image for the title fallback, enforcing scheme, size and
    /// type bounds; the client timeout bounds the whole transfer.
    pub async fn fetch(&self, image_url: &str) -> Result<ImageInput, AnalyzerError> {
        let url = Url::parse(image_url.trim())
            .map_err(|e| AnalyzerError::ImageFetch(format!("invalid image_url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AnalyzerError::ImageFetch(
                "image_url must be http or https".to_string(),
            ));
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AnalyzerError::ImageFetch(format!("failed to fetch image_url: {}", e)))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(AnalyzerError::ImageFetch(format!(
                "image_url returned {}",
                status.as_u16()
            )));
        }
        if response
            .content_length()
            .is_some_and(|len| len as usize > self.max_bytes)
        {
            return Err(AnalyzerError::ImageFetch("Image is too large".to_string()));
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut data = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AnalyzerError::ImageFetch(format!("failed to read image: {}", e)))?;
            data.extend_from_slice(&chunk);
            if data.len() > self.max_bytes {
                return Err(AnalyzerError::ImageFetch("Image is too large".to_string()));
            }
        }
        if data.is_empty() {
            return Err(AnalyzerError::ImageFetch(
                "image_url returned empty content".to_string(),
            ));
        }

        let mime_type = detect_mime_type(&data, &url, &content_type).ok_or_else(|| {
            AnalyzerError::ImageFetch("Unable to determine image mime type".to_string())
        })?;
        if !self.is_allowed(&mime_type) {
            return Err(AnalyzerError::ImageFetch(format!(
                "Unsupported image type: {}",
                mime_type
            )));
        }

        debug!("fetched {} bytes ({}) from {}", data.len(), mime_type, url);
        Ok(ImageInput {
            data: data.to_vec(),
            mime_type,
        })
    }
}

pub fn validate_image(data: &[u8]) -> Result<(u32, u32), String> {
    let (width, height) = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("Invalid image format: {}", e))?
        .into_dimensions()
        .map_err(|e| format!("Invalid image format: {}", e))?;

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(format!(
            "Image dimensions exceed {}x{}",
            MAX_DIMENSION, MAX_DIMENSION
        ));
    }

    Ok((width, height))
}

pub fn to_data_url(image: &ImageInput) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type,
        general_purpose::STANDARD.encode(&image.data)
    )
}

/// Header first, then magic bytes, then the URL's file extension.
fn detect_mime_type(data: &[u8], url: &Url, content_type: &str) -> Option<String> {
    let declared = content_type.split(';').next().unwrap_or("").trim();
    if !declared.is_empty() {
        return Some(declared.to_ascii_lowercase());
    }
    if let Some(mime) = image::guess_format(data).ok().and_then(format_mime) {
        return Some(mime.to_string());
    }
    ImgFormat::from_path(url.path())
        .ok()
        .and_then(format_mime)
        .map(str::to_string)
}

fn format_mime(format: ImgFormat) -> Option<&'static str> {
    match format {
        ImgFormat::Jpeg => Some("image/jpeg"),
        ImgFormat::Png => Some("image/png"),
        ImgFormat::WebP => Some("image/webp"),
        ImgFormat::Gif => Some("image/gif"),
        ImgFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes() -> Vec<u8> {
        let mut output = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(4, 3))
            .write_to(&mut Cursor::new(&mut output), ImgFormat::Png)
            .unwrap();
        output
    }

    fn processor(max_bytes: usize) -> ImageProcessor {
        ImageProcessor::new(
            max_bytes,
            vec!["image/jpeg".into(), "image/png".into(), "image/webp".into()],
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn upload_validation() {
        let p = processor(1024 * 1024);
        let png = png_bytes();
        assert_eq!(p.validate_upload(&png, "image/png").unwrap(), (4, 3));
        assert!(p.validate_upload(&[], "image/png").is_err());
        assert!(p.validate_upload(&png, "image/tiff").is_err());
        assert!(p.validate_upload(b"not an image", "image/png").is_err());
        assert!(processor(8).validate_upload(&png, "image/png").is_err());
    }

    #[test]
    fn data_url_encoding() {
        let image = ImageInput {
            data: vec![0xff, 0xd8, 0xff],
            mime_type: "image/jpeg".into(),
        };
        assert_eq!(to_data_url(&image), "data:image/jpeg;base64,/9j/");
    }

    #[tokio::test]
    async fn fetch_detects_mime_from_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .mount(&server)
            .await;

        let image = processor(1024 * 1024)
            .fetch(&format!("{}/item", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, png_bytes());
    }

    #[tokio::test]
    async fn fetch_enforces_bounds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let p = processor(1024);
        for route in ["/big.png", "/page", "/missing.png"] {
            let err = p.fetch(&format!("{}{}", server.uri(), route)).await.unwrap_err();
            assert!(matches!(err, AnalyzerError::ImageFetch(_)), "route {route}");
        }
        let err = p.fetch("ftp://example.com/a.png").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::ImageFetch(_)));
    }
}
