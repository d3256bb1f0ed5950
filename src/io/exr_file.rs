use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use exr::{meta::attribute::AttributeValue, prelude::*};

use crate::{
    foundation::{
        core::{Dimensions, Plane},
        error::{DecryptError, DecryptResult},
    },
    io::ImageSource,
    manifest::Metadata,
};

/// A fully decoded OpenEXR file: every channel of every part plus all text
/// attributes.
///
/// Channels of multi-part files are named `<part>.<channel>`.
#[derive(Clone, Debug)]
pub struct ExrImage {
    path: PathBuf,
    dimensions: Dimensions,
    channels: Vec<(String, Plane)>,
    metadata: Metadata,
}

impl ExrImage {
    #[tracing::instrument]
    pub fn open(path: &Path) -> DecryptResult<Self> {
        let image = exr::prelude::read()
            .no_deep_data()
            .largest_resolution_level()
            .all_channels()
            .all_layers()
            .all_attributes()
            .from_file(path)
            .map_err(|e| DecryptError::open_failed(path, e))?;

        let mut metadata = BTreeMap::new();
        collect_text_attributes(&image.attributes.other, &mut metadata);

        let multi_part = image.layer_data.len() > 1;
        let mut dimensions = None;
        let mut channels = Vec::new();
        for layer in &image.layer_data {
            collect_text_attributes(&layer.attributes.other, &mut metadata);

            let (width, height) = (layer.size.0, layer.size.1);
            let width = u32::try_from(width)
                .map_err(|_| DecryptError::open_failed(path, "image width exceeds u32"))?;
            let height = u32::try_from(height)
                .map_err(|_| DecryptError::open_failed(path, "image height exceeds u32"))?;
            let dims = *dimensions.get_or_insert(Dimensions::new(width, height));
            if dims != Dimensions::new(width, height) {
                tracing::warn!(
                    part = ?layer.attributes.layer_name.as_ref().map(ToString::to_string),
                    "exr part has a different resolution than the first part"
                );
            }

            let part = layer
                .attributes
                .layer_name
                .as_ref()
                .map(ToString::to_string)
                .filter(|_| multi_part);
            for channel in &layer.channel_data.list {
                let name = match &part {
                    Some(part) => format!("{part}.{}", channel.name),
                    None => channel.name.to_string(),
                };
                let data: Vec<f32> = channel.sample_data.values_as_f32().collect();
                match Plane::new(width, height, data) {
                    Ok(plane) => channels.push((name, plane)),
                    Err(_) => tracing::warn!(channel = %name, "skipping subsampled exr channel"),
                }
            }
        }

        let dimensions = dimensions
            .ok_or_else(|| DecryptError::open_failed(path, "exr file contains no image parts"))?;
        tracing::debug!(
            channels = channels.len(),
            attributes = metadata.len(),
            width = dimensions.width,
            height = dimensions.height,
            "opened exr"
        );

        Ok(Self {
            path: path.to_path_buf(),
            dimensions,
            channels,
            metadata,
        })
    }
}

fn collect_text_attributes<K: ToString>(
    attributes: &std::collections::HashMap<K, AttributeValue>,
    out: &mut Metadata,
) {
    for (key, value) in attributes {
        if let AttributeValue::Text(text) = value {
            out.insert(key.to_string(), text.to_string());
        }
    }
}

impl ImageSource for ExrImage {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|(n, _)| n.clone()).collect()
    }

    fn read_channel(&self, name: &str) -> DecryptResult<Plane> {
        self.channels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| {
                DecryptError::channel_mismatch(format!(
                    "'{}' has no channel named '{name}'",
                    self.path.display()
                ))
            })
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn location(&self) -> Option<&Path> {
        self.path.parent()
    }
}
