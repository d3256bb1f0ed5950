use std::path::Path;

use crate::{
    composite::{CompositedImage, premultiply_rgba_f32_in_place},
    foundation::error::{DecryptError, DecryptResult},
    io::{ExrImage, ImageSource},
};

/// Read a beauty render and return it premultiplied.
///
/// Single-layer formats go through `image`. Multi-layer EXR renders that
/// `image` cannot decode fall back to [`ExrImage`], using plain `R/G/B/A`
/// channels or the first `*.Combined.*` pass.
#[tracing::instrument]
pub fn read_beauty(path: &Path) -> DecryptResult<CompositedImage> {
    let is_exr = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exr"));

    let decoded = match image::open(path) {
        Ok(img) => {
            let rgba = img.to_rgba32f();
            let (width, height) = rgba.dimensions();
            CompositedImage {
                width,
                height,
                data: rgba.into_raw(),
                premultiplied: false,
            }
        }
        Err(e) if is_exr => {
            tracing::debug!("image crate could not decode beauty ({e}), reading exr channels");
            let exr = ExrImage::open(path)?;
            rgba_from_exr(&exr).map_err(|e| DecryptError::open_failed(path, e))?
        }
        Err(e) => return Err(DecryptError::open_failed(path, e)),
    };

    let mut beauty = decoded;
    premultiply_rgba_f32_in_place(&mut beauty.data);
    beauty.premultiplied = true;
    Ok(beauty)
}

/// Assemble straight RGBA from an EXR's colour channels. Missing alpha is 1.
pub fn rgba_from_exr(source: &dyn ImageSource) -> DecryptResult<CompositedImage> {
    let names = source.channel_names();
    let prefix = beauty_prefix(&names).ok_or_else(|| {
        DecryptError::channel_mismatch("no R/G/B or Combined channels for the beauty image")
    })?;

    let dims = source.dimensions();
    let r = source.read_channel(&format!("{prefix}R"))?;
    let g = source.read_channel(&format!("{prefix}G"))?;
    let b = source.read_channel(&format!("{prefix}B"))?;
    let alpha_name = format!("{prefix}A");
    let a = if names.contains(&alpha_name) {
        Some(source.read_channel(&alpha_name)?)
    } else {
        None
    };

    for plane in [&r, &g, &b].into_iter().chain(a.as_ref()) {
        dims.ensure_same(plane.dimensions())?;
    }

    let mut data = Vec::with_capacity(dims.pixel_count() * 4);
    for i in 0..dims.pixel_count() {
        let alpha = a.as_ref().map_or(1.0, |a| a.data[i]);
        data.extend_from_slice(&[r.data[i], g.data[i], b.data[i], alpha]);
    }
    Ok(CompositedImage {
        width: dims.width,
        height: dims.height,
        data,
        premultiplied: false,
    })
}

fn beauty_prefix(names: &[String]) -> Option<String> {
    let has = |n: &str| names.iter().any(|c| c == n);
    if has("R") && has("G") && has("B") {
        return Some(String::new());
    }
    names
        .iter()
        .filter_map(|n| n.strip_suffix("Combined.R"))
        .map(|stem| format!("{stem}Combined."))
        .find(|p| has(&format!("{p}G")) && has(&format!("{p}B")))
}
