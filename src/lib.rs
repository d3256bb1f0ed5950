//! Cryptomatte decoding.
//!
//! Cryptomatte renders store, per pixel, ranked `(id, coverage)` pairs in
//! extra image channels plus a manifest mapping object names to ids. This
//! crate turns that data back into one alpha matte per object:
//!
//! - Open an image as a [`CryptomatteImage`] (OpenEXR via [`ExrImage`], or any
//!   [`ImageSource`])
//! - List its layers and manifest names
//! - Extract [`Matte`]s and colour them with [`colorize_by_id`] or
//!   [`colorize_by_beauty`]
//! - Or run the whole thing with [`extract_to_images`]
//!
//! The library logs through `tracing` and never installs a subscriber.
#![forbid(unsafe_code)]

mod foundation;

pub mod composite;
pub mod hash;
pub mod io;
pub mod layers;
pub mod manifest;
pub mod matte;
pub mod pipeline;
pub mod session;

pub use crate::foundation::core::{Dimensions, Plane};
pub use crate::foundation::error::{DecryptError, DecryptResult};

pub use crate::composite::{CompositedImage, colorize_by_beauty, colorize_by_id, finalize};
pub use crate::hash::{
    CryptoHash, hash_name, hash_to_hex, hash_to_preview_color, hex_to_hash, layer_hash,
};
pub use crate::io::{ExrImage, ImageSource, MemoryImage, OutputFormat, read_beauty, write_image};
pub use crate::layers::{LayerIndex, LayerInfo, RankChannels};
pub use crate::manifest::{
    HashSource, Manifest, Metadata, ResolvedTarget, normalize_channel_suffix, parse_manifest,
    resolve_target,
};
pub use crate::matte::{
    DEFAULT_EPSILON, Layer, MatchMode, Matte, RankPair, extract_all_mattes,
    extract_all_single_pass, extract_matte,
};
pub use crate::pipeline::{
    ExtractReport, ExtractSettings, FailedMatte, WrittenMatte, extract_session_to_images,
    extract_to_images, file_safe_name, list_layers, list_names,
};
pub use crate::session::CryptomatteImage;
