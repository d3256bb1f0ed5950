#![allow(dead_code)]

use std::path::{Path, PathBuf};

use exr::prelude::*;
use smallvec::SmallVec;

/// A single-part float EXR under construction.
pub struct ExrFixture {
    pub width: usize,
    pub height: usize,
    pub channels: Vec<(String, Vec<f32>)>,
    pub attributes: Vec<(String, String)>,
}

impl ExrFixture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            channels: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn channel(mut self, name: &str, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), self.width * self.height, "channel {name}");
        self.channels.push((name.to_string(), data));
        self
    }

    pub fn constant(self, name: &str, value: f32) -> Self {
        let n = self.width * self.height;
        self.channel(name, vec![value; n])
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a Cryptomatte layer: `ranks` are `(ids, coverages)` per rank,
    /// packed two per `NN.RGBA` group. `manifest` is embedded when given.
    pub fn crypto_layer(
        mut self,
        name: &str,
        ranks: &[(Vec<f32>, Vec<f32>)],
        manifest: Option<&str>,
        lowercase: bool,
    ) -> Self {
        let prefix = decryptomatte::layer_hash(name);
        self = self
            .attribute(&format!("cryptomatte/{prefix}/name"), name)
            .attribute(&format!("cryptomatte/{prefix}/hash"), "MurmurHash3_32")
            .attribute(
                &format!("cryptomatte/{prefix}/conversion"),
                "uint32_to_float32",
            );
        if let Some(manifest) = manifest {
            self = self.attribute(&format!("cryptomatte/{prefix}/manifest"), manifest);
        }

        let n = self.width * self.height;
        let components = if lowercase {
            ["r", "g", "b", "a"]
        } else {
            ["R", "G", "B", "A"]
        };
        for (group, pair) in ranks.chunks(2).enumerate() {
            let empty = (vec![0.0; n], vec![0.0; n]);
            let second = pair.get(1).unwrap_or(&empty);
            self = self
                .channel(&format!("{name}{group:02}.{}", components[0]), pair[0].0.clone())
                .channel(&format!("{name}{group:02}.{}", components[1]), pair[0].1.clone())
                .channel(&format!("{name}{group:02}.{}", components[2]), second.0.clone())
                .channel(&format!("{name}{group:02}.{}", components[3]), second.1.clone());
        }
        self
    }

    pub fn write(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }

        let list: SmallVec<[AnyChannel<FlatSamples>; 4]> = self
            .channels
            .iter()
            .map(|(name, data)| AnyChannel::new(name.as_str(), FlatSamples::F32(data.clone())))
            .collect();

        let mut attributes = LayerAttributes::default();
        for (key, value) in &self.attributes {
            attributes.other.insert(
                Text::from(key.as_str()),
                AttributeValue::Text(Text::from(value.as_str())),
            );
        }

        let layer = Layer::new(
            (self.width, self.height),
            attributes,
            Encoding::FAST_LOSSLESS,
            AnyChannels::sort(list),
        );
        Image::from_layer(layer).write().to_file(path).unwrap();
    }
}

/// Fresh, empty directory under `target/`.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("it").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn constant(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}
