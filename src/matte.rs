//! Coverage accumulation into per-object alpha mattes.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    foundation::{
        core::{Dimensions, Plane},
        error::{DecryptError, DecryptResult},
    },
    hash::CryptoHash,
    manifest::{Manifest, resolve_target},
};

/// Default tolerance when comparing id samples against a target hash.
pub const DEFAULT_EPSILON: f32 = 1e-6;

/// Rows handled by one parallel work item.
const BAND_ROWS: usize = 32;

/// One loaded (id, coverage) rank.
#[derive(Clone, Debug)]
pub struct RankPair {
    pub rank: usize,
    pub id: Plane,
    pub coverage: Plane,
}

/// A Cryptomatte layer with its rank data loaded.
///
/// Every plane has the layer's dimensions; only [`Layer::new`] builds one.
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    hash_prefix: String,
    width: u32,
    height: u32,
    rank_pairs: Vec<RankPair>,
}

impl Layer {
    /// Build a layer, checking every plane against `width x height`.
    pub fn new(
        name: impl Into<String>,
        hash_prefix: impl Into<String>,
        width: u32,
        height: u32,
        rank_pairs: Vec<RankPair>,
    ) -> DecryptResult<Self> {
        let name = name.into();
        let dims = Dimensions::new(width, height);
        if rank_pairs.is_empty() {
            return Err(DecryptError::validation(format!(
                "layer '{name}' has no rank pairs"
            )));
        }
        for pair in &rank_pairs {
            dims.ensure_same(pair.id.dimensions())?;
            dims.ensure_same(pair.coverage.dimensions())?;
        }
        Ok(Self {
            name,
            hash_prefix: hash_prefix.into(),
            width,
            height,
            rank_pairs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash_prefix(&self) -> &str {
        &self.hash_prefix
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Rank pairs in ascending rank order.
    pub fn rank_pairs(&self) -> &[RankPair] {
        &self.rank_pairs
    }
}

/// Single-channel alpha mask in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matte {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<f32>,
}

impl Matte {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Number of pixels with non-zero alpha.
    pub fn covered_pixels(&self) -> usize {
        self.alpha.iter().filter(|&&a| a > 0.0).count()
    }
}

/// Strategy for extracting many names from one layer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// One pass per name, ids compared within `epsilon`.
    Tolerant,
    /// One pass for all names, ids compared bit-exactly through a reverse index.
    #[default]
    SinglePass,
}

/// Accumulate the coverage of every rank whose id is within `epsilon` of
/// `target`, clamped to `[0, 1]`.
pub fn extract_matte(layer: &Layer, target: CryptoHash, epsilon: f32) -> Matte {
    accumulate(layer, target, epsilon, &HashSet::new())
}

/// [`extract_matte`], except ids whose bits are in `exclude` never match.
fn accumulate(layer: &Layer, target: CryptoHash, epsilon: f32, exclude: &HashSet<u32>) -> Matte {
    let width = layer.width as usize;
    let mut alpha = vec![0.0f32; layer.dimensions().pixel_count()];
    let t = target.value();

    if width > 0 {
        alpha
            .par_chunks_mut(width * BAND_ROWS)
            .enumerate()
            .for_each(|(band, out)| {
                let start = band * width * BAND_ROWS;
                let end = start + out.len();
                for pair in &layer.rank_pairs {
                    let ids = &pair.id.data[start..end];
                    let cov = &pair.coverage.data[start..end];
                    for ((acc, &id), &c) in out.iter_mut().zip(ids).zip(cov) {
                        if (id - t).abs() <= epsilon && !exclude.contains(&id.to_bits()) {
                            *acc += c;
                        }
                    }
                }
                for a in out.iter_mut() {
                    *a = a.clamp(0.0, 1.0);
                }
            });
    }

    Matte {
        width: layer.width,
        height: layer.height,
        alpha,
    }
}

/// Extract one matte per name, resolving each through the manifest (live
/// hash as fallback). Names are processed in parallel.
///
/// With a manifest, an id equal to another entry's hash belongs to that entry
/// and is never counted for a different target, however close the two are.
pub fn extract_all_mattes<S: AsRef<str> + Sync>(
    layer: &Layer,
    names: &[S],
    manifest: Option<&Manifest>,
    epsilon: f32,
) -> BTreeMap<String, Matte> {
    let known: HashSet<u32> = manifest
        .map(|m| m.entries().map(|e| e.hash.bits()).collect())
        .unwrap_or_default();

    names
        .par_iter()
        .map(|name| {
            let name = name.as_ref();
            let target = resolve_target(name, manifest);
            tracing::trace!(name, hash = %target.hash, source = ?target.source, "resolved target");
            let mut exclude = known.clone();
            exclude.remove(&target.hash.bits());
            (name.to_string(), accumulate(layer, target.hash, epsilon, &exclude))
        })
        .collect()
}

/// Extract a matte for every manifest name in one sweep over the ranks.
///
/// Ids are looked up bit-exactly in a reverse index. Names whose hash never
/// appears still get an all-zero matte; names sharing a hash share a matte.
pub fn extract_all_single_pass(layer: &Layer, manifest: &Manifest) -> BTreeMap<String, Matte> {
    let mut by_bits = HashMap::<u32, usize>::with_capacity(manifest.len());
    let mut names = Vec::with_capacity(manifest.len());
    for entry in manifest.entries() {
        let next = by_bits.len();
        let slot = *by_bits.entry(entry.hash.bits()).or_insert(next);
        if slot != next {
            tracing::warn!(
                name = %entry.name,
                hash = %entry.hash,
                "manifest names share a hash, their mattes will be identical"
            );
        }
        names.push((entry.name, slot));
    }

    let width = layer.width as usize;
    let height = layer.height as usize;
    let band_len = width * BAND_ROWS;
    let bands = if width == 0 { 0 } else { height.div_ceil(BAND_ROWS) };

    let band_buffers: Vec<HashMap<usize, Vec<f32>>> = (0..bands)
        .into_par_iter()
        .map(|band| {
            let start = band * band_len;
            let end = (start + band_len).min(width * height);
            let mut local = HashMap::<usize, Vec<f32>>::new();
            for pair in &layer.rank_pairs {
                let ids = &pair.id.data[start..end];
                let cov = &pair.coverage.data[start..end];
                for (px, (&id, &c)) in ids.iter().zip(cov).enumerate() {
                    if c == 0.0 {
                        continue;
                    }
                    if let Some(&slot) = by_bits.get(&id.to_bits()) {
                        local.entry(slot).or_insert_with(|| vec![0.0; end - start])[px] += c;
                    }
                }
            }
            local
        })
        .collect();

    let mut alphas: Vec<Vec<f32>> = vec![Vec::new(); by_bits.len()];
    for (band, buffers) in band_buffers.into_iter().enumerate() {
        let start = band * band_len;
        for (slot, values) in buffers {
            let full = &mut alphas[slot];
            if full.is_empty() {
                full.resize(width * height, 0.0);
            }
            full[start..start + values.len()].copy_from_slice(&values);
        }
    }
    for alpha in &mut alphas {
        if alpha.is_empty() {
            alpha.resize(width * height, 0.0);
        }
        for a in alpha.iter_mut() {
            *a = a.clamp(0.0, 1.0);
        }
    }

    names
        .into_iter()
        .map(|(name, slot)| {
            (
                name,
                Matte {
                    width: layer.width,
                    height: layer.height,
                    alpha: alphas[slot].clone(),
                },
            )
        })
        .collect()
}
