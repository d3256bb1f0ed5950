//! Turning mattes into RGBA images.

use crate::{
    foundation::{
        core::Dimensions,
        error::{DecryptError, DecryptResult},
    },
    hash::{CryptoHash, hash_to_preview_color},
    matte::Matte,
};

pub type RgbaF32 = [f32; 4];

/// RGBA float image, row-major, 4 samples per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
    pub premultiplied: bool,
}

impl CompositedImage {
    /// Fully transparent premultiplied image.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; Dimensions::new(width, height).pixel_count() * 4],
            premultiplied: true,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> RgbaF32 {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Quantize to 8-bit, clamping to `[0, 1]`.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

/// Flat "clown" colouring: alpha is the matte, colour is the hash preview
/// colour premultiplied by alpha.
pub fn colorize_by_id(matte: &Matte, hash: CryptoHash) -> CompositedImage {
    let [r, g, b] = hash_to_preview_color(hash);
    let mut data = Vec::with_capacity(matte.alpha.len() * 4);
    for &a in &matte.alpha {
        data.extend_from_slice(&[r * a, g * a, b * a, a]);
    }
    CompositedImage {
        width: matte.width,
        height: matte.height,
        data,
        premultiplied: true,
    }
}

/// Cut a premultiplied beauty render with the matte.
///
/// Output colour is `beauty.rgb * matte`, output alpha is the matte.
pub fn colorize_by_beauty(matte: &Matte, beauty: &CompositedImage) -> DecryptResult<CompositedImage> {
    matte.dimensions().ensure_same(beauty.dimensions())?;
    if !beauty.premultiplied {
        return Err(DecryptError::validation(
            "beauty image must be premultiplied before merging",
        ));
    }

    let mut data = Vec::with_capacity(beauty.data.len());
    for (&a, px) in matte.alpha.iter().zip(beauty.data.chunks_exact(4)) {
        data.extend_from_slice(&[px[0] * a, px[1] * a, px[2] * a, a]);
    }
    Ok(CompositedImage {
        width: matte.width,
        height: matte.height,
        data,
        premultiplied: true,
    })
}

/// Prepare an image for writing.
///
/// With `alpha_over` the colour is un-premultiplied (straight alpha) and
/// fully transparent pixels are zeroed, so stacking the outputs with a
/// normal "over" blend in a layer-based editor reproduces the premultiplied
/// result. Without it the image is returned premultiplied.
pub fn finalize(mut image: CompositedImage, alpha_over: bool) -> CompositedImage {
    if !alpha_over {
        if !image.premultiplied {
            premultiply_rgba_f32_in_place(&mut image.data);
            image.premultiplied = true;
        }
        return image;
    }

    if image.premultiplied {
        unpremultiply_rgba_f32_in_place(&mut image.data);
        image.premultiplied = false;
    }
    image
}

/// Premultiplied source-over for one pixel.
pub fn over(dst: RgbaF32, src: RgbaF32) -> RgbaF32 {
    let sa = src[3].clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let inv = 1.0 - sa;
    [
        src[0] + dst[0] * inv,
        src[1] + dst[1] * inv,
        src[2] + dst[2] * inv,
        sa + dst[3] * inv,
    ]
}

/// `dst = src over dst` for two premultiplied images of equal size.
pub fn over_in_place(dst: &mut CompositedImage, src: &CompositedImage) -> DecryptResult<()> {
    dst.dimensions().ensure_same(src.dimensions())?;
    if !dst.premultiplied || !src.premultiplied {
        return Err(DecryptError::validation(
            "over_in_place expects premultiplied images",
        ));
    }
    for (d, s) in dst.data.chunks_exact_mut(4).zip(src.data.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

pub fn premultiply_rgba_f32_in_place(rgba: &mut [f32]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3];
        if a <= 0.0 {
            px[0] = 0.0;
            px[1] = 0.0;
            px[2] = 0.0;
            continue;
        }
        px[0] *= a;
        px[1] *= a;
        px[2] *= a;
    }
}

pub fn unpremultiply_rgba_f32_in_place(rgba: &mut [f32]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3];
        if a <= 0.0 {
            px[0] = 0.0;
            px[1] = 0.0;
            px[2] = 0.0;
            px[3] = 0.0;
            continue;
        }
        px[0] /= a;
        px[1] /= a;
        px[2] /= a;
    }
}
