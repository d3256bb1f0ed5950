//! Manifest parsing and name → hash resolution.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{
    foundation::error::DecryptError,
    hash::{CryptoHash, hash_name, hex_to_hash, layer_hash},
};

/// Image metadata as string key/value pairs.
pub type Metadata = BTreeMap<String, String>;

pub const METADATA_PREFIX: &str = "cryptomatte/";
pub const EXPECTED_HASH: &str = "MurmurHash3_32";
pub const EXPECTED_CONVERSION: &str = "uint32_to_float32";

/// Where a manifest was read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestOrigin {
    Embedded,
    Sidecar(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ManifestEntry {
    pub name: String,
    pub hash: CryptoHash,
}

/// Result of parsing one `name: value` pair of a manifest.
#[derive(Clone, Debug, PartialEq)]
pub enum ManifestEntryParse {
    Entry(ManifestEntry),
    Skip(SkippedEntry),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// Immutable name → hash table of one Cryptomatte layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    entries: BTreeMap<String, CryptoHash>,
    skipped: Vec<SkippedEntry>,
    origin: ManifestOrigin,
}

impl Manifest {
    pub fn get(&self, name: &str) -> Option<CryptoHash> {
        self.entries.get(name).copied()
    }

    /// Names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
        self.entries.iter().map(|(name, &hash)| ManifestEntry {
            name: name.clone(),
            hash,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    pub fn origin(&self) -> &ManifestOrigin {
        &self.origin
    }
}

/// Parse a JSON manifest (`{"name": "3f800000", ...}`).
///
/// Bad entries are skipped and logged; a document that is not a JSON object
/// produces an empty manifest with a single skip record.
pub fn parse_manifest(raw: &str) -> Manifest {
    parse_manifest_with_origin(raw, ManifestOrigin::Embedded)
}

fn parse_manifest_with_origin(raw: &str, origin: ManifestOrigin) -> Manifest {
    let mut manifest = Manifest {
        entries: BTreeMap::new(),
        skipped: Vec::new(),
        origin,
    };

    let object = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            let reason = format!("manifest is not a JSON object (found {})", json_kind(&other));
            tracing::warn!("{reason}");
            manifest.skipped.push(SkippedEntry {
                name: String::new(),
                reason,
            });
            return manifest;
        }
        Err(e) => {
            let reason = format!("manifest is not valid JSON: {e}");
            tracing::warn!("{reason}");
            manifest.skipped.push(SkippedEntry {
                name: String::new(),
                reason,
            });
            return manifest;
        }
    };

    for (name, value) in object {
        match parse_entry(name, &value) {
            ManifestEntryParse::Entry(entry) => {
                manifest.entries.insert(entry.name, entry.hash);
            }
            ManifestEntryParse::Skip(skip) => {
                tracing::warn!(name = %skip.name, "skipping manifest entry: {}", skip.reason);
                manifest.skipped.push(skip);
            }
        }
    }
    manifest
}

/// Parse a single manifest pair.
pub fn parse_entry(name: String, value: &serde_json::Value) -> ManifestEntryParse {
    let Some(hex) = value.as_str() else {
        return ManifestEntryParse::Skip(SkippedEntry {
            name,
            reason: format!("expected a hex string, found {}", json_kind(value)),
        });
    };
    match hex_to_hash(hex) {
        Ok(hash) => ManifestEntryParse::Entry(ManifestEntry { name, hash }),
        Err(DecryptError::MalformedHash(reason)) => {
            ManifestEntryParse::Skip(SkippedEntry { name, reason })
        }
        Err(other) => ManifestEntryParse::Skip(SkippedEntry {
            name,
            reason: other.to_string(),
        }),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// How a target hash was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashSource {
    Manifest,
    LiveHash,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedTarget {
    pub hash: CryptoHash,
    pub source: HashSource,
}

/// Resolve `name` to the id to match: manifest entry first, live hash second.
pub fn resolve_target(name: &str, manifest: Option<&Manifest>) -> ResolvedTarget {
    if let Some(hash) = manifest.and_then(|m| m.get(name)) {
        return ResolvedTarget {
            hash,
            source: HashSource::Manifest,
        };
    }
    ResolvedTarget {
        hash: hash_name(name),
        source: HashSource::LiveHash,
    }
}

/// `CryptoMaterial00.r` → `CryptoMaterial00.R`. Only the suffix changes.
pub fn normalize_channel_suffix(channel_name: &str) -> String {
    if let Some(stem) = channel_name.strip_suffix(|c: char| matches!(c, 'r' | 'g' | 'b' | 'a'))
        && let Some(base) = stem.strip_suffix('.')
    {
        let last = channel_name[stem.len()..].to_ascii_uppercase();
        return format!("{base}.{last}");
    }
    channel_name.to_string()
}

/// Metadata key `cryptomatte/<prefix>/<field>`.
pub fn metadata_key(prefix: &str, field: &str) -> String {
    format!("{METADATA_PREFIX}{prefix}/{field}")
}

/// A layer declared through `cryptomatte/<prefix>/name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerDeclaration {
    pub prefix: String,
    pub name: String,
}

/// All layers declared in the metadata, in key order.
pub fn declared_layers(metadata: &Metadata) -> Vec<LayerDeclaration> {
    let mut out = Vec::new();
    for (key, value) in metadata {
        let Some(rest) = key.strip_prefix(METADATA_PREFIX) else {
            continue;
        };
        let Some(prefix) = rest.strip_suffix("/name") else {
            continue;
        };
        if prefix.is_empty() || prefix.contains('/') {
            continue;
        }

        let expected = layer_hash(value);
        if expected != prefix {
            tracing::warn!(
                layer = %value,
                key = %prefix,
                expected = %expected,
                "cryptomatte metadata key does not match the layer name hash"
            );
        }
        check_conventions(metadata, prefix, value);
        out.push(LayerDeclaration {
            prefix: prefix.to_string(),
            name: value.clone(),
        });
    }
    out
}

fn check_conventions(metadata: &Metadata, prefix: &str, layer: &str) {
    if let Some(hash) = metadata.get(&metadata_key(prefix, "hash"))
        && hash != EXPECTED_HASH
    {
        tracing::warn!(layer, hash = %hash, "unexpected cryptomatte hash function");
    }
    if let Some(conv) = metadata.get(&metadata_key(prefix, "conversion"))
        && conv != EXPECTED_CONVERSION
    {
        tracing::warn!(layer, conversion = %conv, "unexpected cryptomatte conversion");
    }
}

/// Load the manifest for `prefix`: embedded text first, then the sidecar
/// file named by `manif_file` (relative to `image_dir`).
///
/// `None` means no manifest is available; callers fall back to live hashing.
pub fn load_manifest(metadata: &Metadata, prefix: &str, image_dir: Option<&Path>) -> Option<Manifest> {
    if let Some(raw) = metadata.get(&metadata_key(prefix, "manifest")) {
        return Some(parse_manifest(raw));
    }

    let sidecar = metadata.get(&metadata_key(prefix, "manif_file"))?;
    let path = match image_dir {
        Some(dir) => dir.join(sidecar),
        None => PathBuf::from(sidecar),
    };
    match std::fs::read_to_string(&path) {
        Ok(raw) => Some(parse_manifest_with_origin(
            &raw,
            ManifestOrigin::Sidecar(path),
        )),
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read sidecar manifest: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_entries() {
        let m = parse_manifest(r#"{"Sphere": "3f800000", "Cube": "40000000"}"#);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("Sphere").unwrap().value(), 1.0);
        assert_eq!(m.get("Cube").unwrap().value(), 2.0);
        assert!(m.skipped().is_empty());
        assert_eq!(m.names().collect::<Vec<_>>(), vec!["Cube", "Sphere"]);
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let m = parse_manifest(r#"{"Good": "3f800000", "Bad": "nothex", "Long": "123456789", "Num": 5}"#);
        assert_eq!(m.len(), 1);
        assert!(m.get("Good").is_some());
        let mut skipped: Vec<_> = m.skipped().iter().map(|s| s.name.as_str()).collect();
        skipped.sort_unstable();
        assert_eq!(skipped, vec!["Bad", "Long", "Num"]);
    }

    #[test]
    fn non_object_manifest_is_empty() {
        let m = parse_manifest("[1, 2, 3]");
        assert!(m.is_empty());
        assert_eq!(m.skipped().len(), 1);

        let m = parse_manifest("{not json");
        assert!(m.is_empty());
        assert_eq!(m.skipped().len(), 1);
    }

    #[test]
    fn resolve_prefers_manifest_then_live_hash() {
        let m = parse_manifest(r#"{"Sphere": "3f800000"}"#);

        let hit = resolve_target("Sphere", Some(&m));
        assert_eq!(hit.source, HashSource::Manifest);
        assert_eq!(hit.hash.bits(), 0x3f80_0000);

        let miss = resolve_target("Cube", Some(&m));
        assert_eq!(miss.source, HashSource::LiveHash);
        assert_eq!(miss.hash, hash_name("Cube"));

        let none = resolve_target("Sphere", None);
        assert_eq!(none.source, HashSource::LiveHash);
        assert_eq!(none.hash, hash_name("Sphere"));
    }

    #[test]
    fn normalizes_lowercase_suffix_only() {
        assert_eq!(normalize_channel_suffix("CryptoMaterial.r"), "CryptoMaterial.R");
        assert_eq!(normalize_channel_suffix("View.crypto00.a"), "View.crypto00.A");
        assert_eq!(normalize_channel_suffix("CryptoMaterial.G"), "CryptoMaterial.G");
        assert_eq!(normalize_channel_suffix("bar"), "bar");
        assert_eq!(normalize_channel_suffix("r"), "r");
        assert_eq!(normalize_channel_suffix(".b"), ".B");
        assert_eq!(normalize_channel_suffix("depth.z"), "depth.z");
    }

    #[test]
    fn declared_layers_reads_name_keys() {
        let mut md = Metadata::new();
        let key = layer_hash("CryptoObject");
        md.insert(metadata_key(&key, "name"), "CryptoObject".to_string());
        md.insert(metadata_key(&key, "hash"), EXPECTED_HASH.to_string());
        md.insert("cryptomatte/nested/x/name".to_string(), "Nope".to_string());
        md.insert("owner".to_string(), "someone".to_string());

        let layers = declared_layers(&md);
        assert_eq!(
            layers,
            vec![LayerDeclaration {
                prefix: key,
                name: "CryptoObject".to_string()
            }]
        );
    }

    #[test]
    fn load_manifest_prefers_embedded_and_reports_missing() {
        let mut md = Metadata::new();
        assert!(load_manifest(&md, "abcdef0", None).is_none());

        md.insert(metadata_key("abcdef0", "manifest"), r#"{"A": "3f800000"}"#.to_string());
        let m = load_manifest(&md, "abcdef0", None).unwrap();
        assert_eq!(m.origin(), &ManifestOrigin::Embedded);
        assert!(m.get("A").is_some());
    }

    #[test]
    fn load_manifest_reads_sidecar() {
        let dir = PathBuf::from("target").join("manifest_sidecar");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("layer.json"), r#"{"Side": "40400000"}"#).unwrap();

        let mut md = Metadata::new();
        md.insert(metadata_key("1234567", "manif_file"), "layer.json".to_string());
        let m = load_manifest(&md, "1234567", Some(&dir)).unwrap();
        assert_eq!(m.get("Side").unwrap().value(), 3.0);
        assert!(matches!(m.origin(), ManifestOrigin::Sidecar(_)));

        md.insert(metadata_key("1234567", "manif_file"), "missing.json".to_string());
        assert!(load_manifest(&md, "1234567", Some(&dir)).is_none());
    }
}
