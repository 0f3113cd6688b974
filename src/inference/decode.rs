//! Image loading for the segmentation model.

use std::path::Path;

use image::RgbImage;

use crate::error::InferenceError;

/// Reads the image at `path` and converts it to 8-bit RGB.
///
/// Decoding runs on the blocking pool; large COCO images take long enough to
/// stall the runtime otherwise.
pub async fn load_rgb(path: &Path) -> Result<RgbImage, InferenceError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| InferenceError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|decoded| decoded.to_rgb8())
            .map_err(|source| InferenceError::ImageDecode {
                path: owned,
                source,
            })
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_rgb_png() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("img.png");
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(1, 1, image::Rgb([10, 20, 30]));
        img.save(&path).expect("save png");

        let loaded = load_rgb(&path).await.expect("load should succeed");
        assert_eq!(loaded.dimensions(), (4, 3));
        assert_eq!(loaded.get_pixel(1, 1), &image::Rgb([10, 20, 30]));
    }

    #[tokio::test]
    async fn test_load_rgb_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let result = load_rgb(&temp_dir.path().join("absent.jpg")).await;
        assert!(matches!(result, Err(InferenceError::ImageRead { .. })));
    }

    #[tokio::test]
    async fn test_load_rgb_garbage() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bad.jpg");
        std::fs::write(&path, b"definitely not an image").expect("write");

        let result = load_rgb(&path).await;
        assert!(matches!(result, Err(InferenceError::ImageDecode { .. })));
    }
}
