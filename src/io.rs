//! Image access behind the decode engine.
//!
//! The engine only needs channel names, single channels as float planes and
//! string metadata. [`ImageSource`] is that seam; [`ExrImage`] reads OpenEXR
//! files and [`MemoryImage`] wraps buffers decoded elsewhere.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{
    foundation::{
        core::{Dimensions, Plane},
        error::{DecryptError, DecryptResult},
    },
    manifest::Metadata,
};

pub mod beauty;
pub mod exr_file;
pub mod output;

pub use beauty::read_beauty;
pub use exr_file::ExrImage;
pub use output::{OutputFormat, write_image};

/// Read access to a multi-channel image.
pub trait ImageSource {
    fn dimensions(&self) -> Dimensions;

    /// Channel names in file order.
    fn channel_names(&self) -> Vec<String>;

    fn read_channel(&self, name: &str) -> DecryptResult<Plane>;

    fn metadata(&self) -> &Metadata;

    /// Directory used to resolve relative sidecar files.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// In-memory image: named planes plus metadata.
#[derive(Clone, Debug)]
pub struct MemoryImage {
    dimensions: Dimensions,
    channels: Vec<(String, Plane)>,
    metadata: Metadata,
    location: Option<PathBuf>,
}

impl MemoryImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dimensions: Dimensions::new(width, height),
            channels: Vec::new(),
            metadata: BTreeMap::new(),
            location: None,
        }
    }

    /// Add or replace a channel. The plane must match the image size.
    pub fn with_channel(mut self, name: impl Into<String>, plane: Plane) -> DecryptResult<Self> {
        self.dimensions.ensure_same(plane.dimensions())?;
        let name = name.into();
        match self.channels.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = plane,
            None => self.channels.push((name, plane)),
        }
        Ok(self)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.location = Some(dir.into());
        self
    }
}

impl ImageSource for MemoryImage {
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
            .ok_or_else(|| DecryptError::channel_mismatch(format!("no channel named '{name}'")))
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
}
