//! An opened Cryptomatte image: layer index, manifests and rank loading.

use std::{collections::BTreeMap, path::Path};

use crate::{
    foundation::{
        core::Dimensions,
        error::{DecryptError, DecryptResult},
    },
    io::{ExrImage, ImageSource},
    layers::{LayerIndex, LayerInfo},
    manifest::{Manifest, load_manifest},
    matte::{Layer, MatchMode, Matte, RankPair, extract_all_mattes, extract_all_single_pass},
};

/// Scoped access to one image. Consumed by [`CryptomatteImage::close`].
#[derive(Debug)]
pub struct CryptomatteImage<S: ImageSource = ExrImage> {
    source: S,
    index: LayerIndex,
    manifests: BTreeMap<String, Manifest>,
}

impl CryptomatteImage<ExrImage> {
    /// Open an OpenEXR file.
    pub fn open(path: &Path) -> DecryptResult<Self> {
        Ok(Self::from_source(ExrImage::open(path)?))
    }
}

impl<S: ImageSource> CryptomatteImage<S> {
    /// Index layers and parse manifests of an already opened image.
    pub fn from_source(source: S) -> Self {
        let channels = source.channel_names();
        let index = LayerIndex::discover(&channels, source.metadata());

        let mut manifests = BTreeMap::new();
        for layer in index.layers() {
            match load_manifest(source.metadata(), &layer.hash_prefix, source.location()) {
                Some(m) => {
                    tracing::debug!(layer = %layer.name, entries = m.len(), "manifest loaded");
                    manifests.insert(layer.name.clone(), m);
                }
                None => tracing::info!(
                    layer = %layer.name,
                    "no manifest, names will be resolved by hashing"
                ),
            }
        }

        Self {
            source,
            index,
            manifests,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.source.dimensions()
    }

    /// Layer names in discovery order.
    pub fn layer_names(&self) -> Vec<&str> {
        self.index.layer_names()
    }

    pub fn layer_info(&self, layer: &str) -> DecryptResult<&LayerInfo> {
        self.index
            .get(layer)
            .ok_or_else(|| DecryptError::UnknownLayer(layer.to_string()))
    }

    pub fn manifest(&self, layer: &str) -> Option<&Manifest> {
        self.manifests.get(layer)
    }

    /// Manifest of `layer`, or `ManifestMissing`.
    pub fn require_manifest(&self, layer: &str) -> DecryptResult<&Manifest> {
        self.layer_info(layer)?;
        self.manifests
            .get(layer)
            .ok_or_else(|| DecryptError::ManifestMissing(layer.to_string()))
    }

    /// Read the rank channels of `layer`.
    pub fn load_layer(&self, layer: &str) -> DecryptResult<Layer> {
        let info = self.layer_info(layer)?;
        let dims = self.dimensions();
        let mut rank_pairs = Vec::with_capacity(info.ranks.len());
        for rank in &info.ranks {
            rank_pairs.push(RankPair {
                rank: rank.rank,
                id: self.source.read_channel(&rank.id_channel)?,
                coverage: self.source.read_channel(&rank.coverage_channel)?,
            });
        }
        Layer::new(
            info.name.clone(),
            info.hash_prefix.clone(),
            dims.width,
            dims.height,
            rank_pairs,
        )
    }

    /// Mattes for `names` (all manifest names when `None`).
    ///
    /// `MatchMode::SinglePass` matches ids bit-exactly, `epsilon` only
    /// applies to `MatchMode::Tolerant`.
    pub fn extract(
        &self,
        layer: &str,
        names: Option<&[String]>,
        mode: MatchMode,
        epsilon: f32,
    ) -> DecryptResult<BTreeMap<String, Matte>> {
        let loaded = self.load_layer(layer)?;
        let manifest = self.manifest(layer);
        match (names, mode, manifest) {
            (None, MatchMode::SinglePass, Some(m)) => Ok(extract_all_single_pass(&loaded, m)),
            (None, MatchMode::Tolerant, Some(m)) => {
                let all: Vec<&str> = m.names().collect();
                Ok(extract_all_mattes(&loaded, &all, Some(m), epsilon))
            }
            (None, _, None) => Err(DecryptError::ManifestMissing(layer.to_string())),
            (Some(names), MatchMode::SinglePass, manifest) => {
                Ok(extract_all_mattes(&loaded, names, manifest, 0.0))
            }
            (Some(names), MatchMode::Tolerant, manifest) => {
                Ok(extract_all_mattes(&loaded, names, manifest, epsilon))
            }
        }
    }

    /// Release the image.
    pub fn close(self) {
        tracing::trace!(layers = self.index.layers().len(), "closing cryptomatte image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Plane,
        hash::{hash_name, layer_hash},
        io::MemoryImage,
        manifest::metadata_key,
        matte::DEFAULT_EPSILON,
    };

    fn sample_image(with_manifest: bool) -> MemoryImage {
        let prefix = layer_hash("CryptoObject");
        let mut img = MemoryImage::new(2, 1)
            .with_metadata(metadata_key(&prefix, "name"), "CryptoObject")
            .with_channel("CryptoObject00.R", Plane::new(2, 1, vec![1.0, hash_name("Cube").value()]).unwrap())
            .unwrap()
            .with_channel("CryptoObject00.G", Plane::filled(2, 1, 0.75))
            .unwrap()
            .with_channel("CryptoObject00.B", Plane::filled(2, 1, 0.0))
            .unwrap()
            .with_channel("CryptoObject00.A", Plane::filled(2, 1, 0.25))
            .unwrap();
        if with_manifest {
            img = img.with_metadata(metadata_key(&prefix, "manifest"), r#"{"Sphere": "3f800000"}"#);
        }
        img
    }

    #[test]
    fn discovers_layers_and_manifest() {
        let session = CryptomatteImage::from_source(sample_image(true));
        assert_eq!(session.layer_names(), vec!["CryptoObject"]);
        assert_eq!(session.manifest("CryptoObject").unwrap().len(), 1);
        assert_eq!(session.load_layer("CryptoObject").unwrap().rank_pairs().len(), 2);
        session.close();
    }

    #[test]
    fn extract_all_uses_manifest_names() {
        let session = CryptomatteImage::from_source(sample_image(true));
        for mode in [MatchMode::Tolerant, MatchMode::SinglePass] {
            let mattes = session
                .extract("CryptoObject", None, mode, DEFAULT_EPSILON)
                .unwrap();
            assert_eq!(mattes.keys().collect::<Vec<_>>(), vec!["Sphere"]);
            assert_eq!(mattes["Sphere"].alpha, vec![0.75, 0.0]);
        }
    }

    #[test]
    fn explicit_names_fall_back_to_live_hash() {
        let session = CryptomatteImage::from_source(sample_image(false));
        let names = vec!["Cube".to_string()];
        let mattes = session
            .extract("CryptoObject", Some(&names), MatchMode::Tolerant, DEFAULT_EPSILON)
            .unwrap();
        assert_eq!(mattes["Cube"].alpha, vec![0.0, 0.75]);
    }

    #[test]
    fn single_pass_with_explicit_names_is_bit_exact() {
        let cube = hash_name("Cube").value();
        let drifted = f32::from_bits(cube.to_bits() + 1);
        let prefix = layer_hash("CryptoObject");
        let img = MemoryImage::new(2, 1)
            .with_metadata(metadata_key(&prefix, "name"), "CryptoObject")
            .with_channel("CryptoObject00.R", Plane::new(2, 1, vec![cube, drifted]).unwrap())
            .unwrap()
            .with_channel("CryptoObject00.G", Plane::filled(2, 1, 1.0))
            .unwrap()
            .with_channel("CryptoObject00.B", Plane::filled(2, 1, 0.0))
            .unwrap()
            .with_channel("CryptoObject00.A", Plane::filled(2, 1, 0.0))
            .unwrap();
        let session = CryptomatteImage::from_source(img);
        let names = vec!["Cube".to_string()];

        let exact = session
            .extract("CryptoObject", Some(&names), MatchMode::SinglePass, DEFAULT_EPSILON)
            .unwrap();
        assert_eq!(exact["Cube"].alpha, vec![1.0, 0.0]);

        let tolerant = session
            .extract(
                "CryptoObject",
                Some(&names),
                MatchMode::Tolerant,
                (drifted - cube).abs(),
            )
            .unwrap();
        assert_eq!(tolerant["Cube"].alpha, vec![1.0, 1.0]);
    }

    #[test]
    fn missing_manifest_and_unknown_layer_are_errors() {
        let session = CryptomatteImage::from_source(sample_image(false));
        assert!(matches!(
            session.extract("CryptoObject", None, MatchMode::Tolerant, DEFAULT_EPSILON),
            Err(DecryptError::ManifestMissing(_))
        ));
        assert!(matches!(
            session.require_manifest("CryptoObject"),
            Err(DecryptError::ManifestMissing(_))
        ));
        assert!(matches!(
            session.load_layer("Nope"),
            Err(DecryptError::UnknownLayer(_))
        ));
    }
}
