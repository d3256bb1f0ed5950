use std::path::{Path, PathBuf};

use crate::{
    composite::CompositedImage,
    foundation::error::{DecryptError, DecryptResult},
};

/// Output container for written mattes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 8-bit RGBA PNG.
    #[default]
    Png,
    /// 8-bit RGBA TIFF.
    Tiff,
    /// 32-bit float RGBA OpenEXR.
    Exr,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Tiff => "tif",
            Self::Exr => "exr",
        }
    }

    fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Tiff => image::ImageFormat::Tiff,
            Self::Exr => image::ImageFormat::OpenExr,
        }
    }
}

/// Write `img` to `path`.
///
/// The file is encoded next to its destination and renamed into place, so a
/// failed write never leaves a partial file behind.
pub fn write_image(path: &Path, img: &CompositedImage, format: OutputFormat) -> DecryptResult<()> {
    let dynamic = to_dynamic(img, format).ok_or_else(|| {
        DecryptError::write_failed(path, "pixel buffer does not match image dimensions")
    })?;

    let tmp = partial_path(path);
    let mut guard = TempFileGuard(Some(tmp.clone()));
    dynamic
        .save_with_format(&tmp, format.image_format())
        .map_err(|e| DecryptError::write_failed(path, e))?;
    std::fs::rename(&tmp, path).map_err(|e| DecryptError::write_failed(path, e))?;
    guard.0 = None;
    Ok(())
}

fn to_dynamic(img: &CompositedImage, format: OutputFormat) -> Option<image::DynamicImage> {
    match format {
        OutputFormat::Exr => {
            image::Rgba32FImage::from_raw(img.width, img.height, img.data.clone())
                .map(image::DynamicImage::ImageRgba32F)
        }
        OutputFormat::Png | OutputFormat::Tiff => {
            image::RgbaImage::from_raw(img.width, img.height, img.to_rgba8())
                .map(image::DynamicImage::ImageRgba8)
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{name}.partial"))
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}
