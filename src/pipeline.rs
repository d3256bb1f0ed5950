use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::{
    composite::{CompositedImage, colorize_by_beauty, colorize_by_id, finalize, over_in_place},
    foundation::error::{DecryptError, DecryptResult},
    hash::{CryptoHash, hash_to_hex},
    io::{ImageSource, OutputFormat, read_beauty, write_image},
    manifest::resolve_target,
    matte::{DEFAULT_EPSILON, MatchMode},
    session::CryptomatteImage,
};

/// Settings of an "extract everything" run. Loadable from JSON.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    /// Image holding the Cryptomatte channels.
    pub input: PathBuf,
    /// Optional beauty render used to colour the mattes.
    pub beauty: Option<PathBuf>,
    /// Output directory. Defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    pub format: OutputFormat,
    /// Write straight-alpha images that stack correctly with "over".
    pub alpha_over: bool,
    /// Names to extract. Empty means every manifest name.
    pub names: Vec<String>,
    /// Layers to extract. Empty means every layer.
    pub layers: Vec<String>,
    /// Id tolerance of `MatchMode::Tolerant`.
    pub epsilon: f32,
    /// Defaults to bit-exact matching.
    pub match_mode: MatchMode,
    /// Worker threads. `None` uses the rayon default.
    pub threads: Option<usize>,
    /// Also write one image with every clown matte stacked per layer.
    pub preview: bool,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            beauty: None,
            output_dir: None,
            format: OutputFormat::Png,
            alpha_over: false,
            names: Vec::new(),
            layers: Vec::new(),
            epsilon: DEFAULT_EPSILON,
            match_mode: MatchMode::SinglePass,
            threads: None,
            preview: false,
        }
    }
}

impl ExtractSettings {
    pub fn validate(&self) -> DecryptResult<()> {
        if self.input.as_os_str().is_empty() {
            return Err(DecryptError::validation("input image path is required"));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(DecryptError::validation(
                "epsilon must be a finite, non-negative number",
            ));
        }
        if let Some(n) = self.threads
            && n == 0
        {
            return Err(DecryptError::validation("threads must be >= 1 when set"));
        }
        Ok(())
    }

    /// Explicit output dir, else the input's directory.
    pub fn resolved_output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => self
                .input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// One written file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenMatte {
    pub layer: String,
    pub name: String,
    pub path: PathBuf,
}

/// One failure that did not stop the batch.
#[derive(Debug)]
pub struct FailedMatte {
    pub layer: String,
    pub name: Option<String>,
    pub error: DecryptError,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub written: Vec<WrittenMatte>,
    pub failed: Vec<FailedMatte>,
}

impl ExtractReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write one image per matte of every layer of `settings.input`.
///
/// Opening the input, reading the beauty or creating the output directory
/// fail the whole run. Per-layer and per-matte failures are collected in the
/// report.
#[tracing::instrument(skip(settings), fields(input = %settings.input.display()))]
pub fn extract_to_images(settings: &ExtractSettings) -> DecryptResult<ExtractReport> {
    settings.validate()?;
    let session = CryptomatteImage::open(&settings.input)?;
    let report = extract_session_to_images(&session, settings)?;
    session.close();
    Ok(report)
}

/// Same as [`extract_to_images`] for an already opened session.
pub fn extract_session_to_images<S: ImageSource + Sync>(
    session: &CryptomatteImage<S>,
    settings: &ExtractSettings,
) -> DecryptResult<ExtractReport> {
    settings.validate()?;

    let beauty = match &settings.beauty {
        Some(path) => Some(read_beauty(path)?),
        None => None,
    };

    let out_dir = settings.resolved_output_dir();
    std::fs::create_dir_all(&out_dir).map_err(|e| DecryptError::write_failed(&out_dir, e))?;

    let pool = build_thread_pool(settings.threads)?;
    let mut report = ExtractReport::default();

    let all_layers: Vec<String> = session.layer_names().iter().map(|s| s.to_string()).collect();
    let layers: Vec<String> = if settings.layers.is_empty() {
        all_layers.clone()
    } else {
        settings.layers.clone()
    };
    let prefix_layer = all_layers.len() > 1;

    // Output stems already taken in this run. Preview names are reserved
    // first so an object called "preview" cannot take them.
    let mut used_stems = HashSet::new();
    if settings.preview {
        for layer in &layers {
            used_stems.insert(preview_stem(layer));
        }
    }

    for layer in &layers {
        let names = (!settings.names.is_empty()).then_some(settings.names.as_slice());
        let mattes = match pool.install(|| {
            session.extract(layer, names, settings.match_mode, settings.epsilon)
        }) {
            Ok(m) => m,
            Err(error) => {
                tracing::warn!(layer = %layer, "skipping layer: {error}");
                report.failed.push(FailedMatte {
                    layer: layer.clone(),
                    name: None,
                    error,
                });
                continue;
            }
        };

        let manifest = session.manifest(layer);
        let dims = session.dimensions();
        let mut preview = settings
            .preview
            .then(|| CompositedImage::transparent(dims.width, dims.height));

        for (name, matte) in &mattes {
            tracing::debug!(layer = %layer, name = %name, covered = matte.covered_pixels(), "writing matte");
            let hash = resolve_target(name, manifest).hash;

            if let Some(preview) = preview.as_mut() {
                let clown = colorize_by_id(matte, hash);
                if let Err(error) = over_in_place(preview, &clown) {
                    tracing::warn!(layer = %layer, "preview disabled: {error}");
                }
            }

            let composed = match &beauty {
                Some(beauty) => colorize_by_beauty(matte, beauty),
                None => Ok(colorize_by_id(matte, hash)),
            };
            let file_stem = unique_stem(
                &mut used_stems,
                output_stem(prefix_layer.then_some(layer.as_str()), name),
                hash,
            );
            let path = out_dir.join(format!("{file_stem}.{}", settings.format.extension()));
            let result = composed.and_then(|img| {
                write_image(&path, &finalize(img, settings.alpha_over), settings.format)
            });

            match result {
                Ok(()) => report.written.push(WrittenMatte {
                    layer: layer.clone(),
                    name: name.clone(),
                    path,
                }),
                Err(error) => {
                    tracing::warn!(layer = %layer, name = %name, "matte failed: {error}");
                    report.failed.push(FailedMatte {
                        layer: layer.clone(),
                        name: Some(name.clone()),
                        error,
                    });
                }
            }
        }

        if let Some(preview) = preview {
            let path = out_dir.join(format!(
                "{}.{}",
                preview_stem(layer),
                settings.format.extension()
            ));
            if let Err(error) = write_image(&path, &finalize(preview, settings.alpha_over), settings.format) {
                report.failed.push(FailedMatte {
                    layer: layer.clone(),
                    name: None,
                    error,
                });
            }
        }
    }

    tracing::info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "matte extraction finished"
    );
    Ok(report)
}

/// Layer names of an image, in discovery order.
pub fn list_layers(path: &Path) -> DecryptResult<Vec<String>> {
    let session = CryptomatteImage::open(path)?;
    let names = session.layer_names().into_iter().map(str::to_string).collect();
    session.close();
    Ok(names)
}

/// Manifest names of `layer` (or of every layer), as `(layer, name)` pairs.
pub fn list_names(path: &Path, layer: Option<&str>) -> DecryptResult<Vec<(String, String)>> {
    let session = CryptomatteImage::open(path)?;
    let layers: Vec<String> = match layer {
        Some(l) => vec![session.layer_info(l)?.name.clone()],
        None => session.layer_names().into_iter().map(str::to_string).collect(),
    };

    let mut out = Vec::new();
    for layer in layers {
        match session.require_manifest(&layer) {
            Ok(manifest) => {
                out.extend(manifest.names().map(|n| (layer.clone(), n.to_string())));
            }
            Err(DecryptError::ManifestMissing(_)) => {
                tracing::warn!(layer = %layer, "layer has no manifest");
            }
            Err(e) => return Err(e),
        }
    }
    session.close();
    Ok(out)
}

fn output_stem(layer: Option<&str>, name: &str) -> String {
    match layer {
        Some(layer) => format!("{}_{}", file_safe_name(layer), file_safe_name(name)),
        None => file_safe_name(name),
    }
}

fn preview_stem(layer: &str) -> String {
    format!("{}_preview", file_safe_name(layer))
}

/// Claim `stem` in `used`. Taken stems get the hash appended, then a counter.
fn unique_stem(used: &mut HashSet<String>, stem: String, hash: CryptoHash) -> String {
    if used.insert(stem.clone()) {
        return stem;
    }
    let tagged = format!("{stem}_{}", hash_to_hex(hash));
    let mut candidate = tagged.clone();
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        candidate = format!("{tagged}_{n}");
        n += 1;
    }
    tracing::warn!(stem = %stem, renamed = %candidate, "output name already used in this run");
    candidate
}

/// Turn an object name into something usable as a file name.
pub fn file_safe_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_thread_pool(threads: Option<usize>) -> DecryptResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| DecryptError::validation(format!("failed to build rayon thread pool: {e}")))
}
