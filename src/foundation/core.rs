use crate::foundation::error::{DecryptError, DecryptResult};

/// Width/height of an image or buffer in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Pixels per row.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl Dimensions {
    /// Build dimensions from `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by these dimensions.
    pub fn pixel_count(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Tuple form used in error messages.
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fail with `DimensionMismatch` unless `other` is equal to `self`.
    pub fn ensure_same(self, other: Self) -> DecryptResult<()> {
        if self != other {
            return Err(DecryptError::dimension_mismatch(
                self.as_tuple(),
                other.as_tuple(),
            ));
        }
        Ok(())
    }
}

/// Single-channel float buffer, row-major, one value per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Plane {
    /// Wrap `data`, checking its length against `width * height`.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> DecryptResult<Self> {
        let expected = Dimensions::new(width, height).pixel_count();
        if data.len() != expected {
            return Err(DecryptError::validation(format!(
                "plane of {width}x{height} expects {expected} samples, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Plane filled with a constant value.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; Dimensions::new(width, height).pixel_count()],
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_rejects_wrong_sample_count() {
        assert!(Plane::new(2, 2, vec![0.0; 3]).is_err());
        assert!(Plane::new(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn ensure_same_reports_both_sizes() {
        let err = Dimensions::new(4, 2)
            .ensure_same(Dimensions::new(2, 4))
            .unwrap_err();
        assert!(matches!(
            err,
            DecryptError::DimensionMismatch {
                expected: (4, 2),
                actual: (2, 4)
            }
        ));
    }

    #[test]
    fn empty_dimensions_have_no_pixels() {
        assert_eq!(Dimensions::new(0, 16).pixel_count(), 0);
    }
}
