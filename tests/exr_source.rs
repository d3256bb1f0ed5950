mod support;

use decryptomatte::{
    CryptomatteImage, DEFAULT_EPSILON, DecryptError, ExrImage, ImageSource, MatchMode,
    hash_name, layer_hash,
};
use support::{ExrFixture, constant, scratch_dir};

#[test]
fn exr_channels_and_metadata_round_trip() {
    let dir = scratch_dir("exr_source_roundtrip");
    let path = dir.join("object.exr");
    ExrFixture::new(3, 2)
        .constant("R", 0.25)
        .channel("G", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
        .attribute("cryptomatte/abc1234/name", "CryptoObject")
        .write(&path);

    let img = ExrImage::open(&path).unwrap();
    assert_eq!(img.dimensions().as_tuple(), (3, 2));

    let mut channels = img.channel_names();
    channels.sort();
    assert_eq!(channels, vec!["G", "R"]);
    assert_eq!(
        img.metadata().get("cryptomatte/abc1234/name").map(String::as_str),
        Some("CryptoObject")
    );

    let g = img.read_channel("G").unwrap();
    assert_eq!(g.data, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    assert!(img.read_channel("Z").is_err());
    assert_eq!(img.location(), Some(dir.as_path()));
}

#[test]
fn missing_file_is_an_open_error() {
    let dir = scratch_dir("exr_source_missing");
    let err = ExrImage::open(&dir.join("nope.exr")).unwrap_err();
    assert!(matches!(err, DecryptError::ImageOpenFailed { .. }));
}

#[test]
fn opening_a_cryptomatte_file_lists_layers_and_names() {
    let (w, h) = (4, 4);
    let dir = scratch_dir("exr_source_session");
    let path = dir.join("crypto.exr");
    let manifest = r#"{"Sphere": "3f800000", "Cube": "40000000"}"#;
    ExrFixture::new(w, h)
        .constant("R", 0.5)
        .constant("G", 0.5)
        .constant("B", 0.5)
        .constant("A", 1.0)
        .crypto_layer(
            "CryptoObject",
            &[
                (constant(w, h, 1.0), constant(w, h, 0.5)),
                (constant(w, h, 2.0), constant(w, h, 0.25)),
                (constant(w, h, 0.0), constant(w, h, 0.0)),
            ],
            Some(manifest),
            false,
        )
        .write(&path);

    let session = CryptomatteImage::open(&path).unwrap();
    assert_eq!(session.layer_names(), vec!["CryptoObject"]);
    assert_eq!(
        session.layer_info("CryptoObject").unwrap().hash_prefix,
        layer_hash("CryptoObject")
    );

    let layer = session.load_layer("CryptoObject").unwrap();
    assert_eq!(layer.rank_pairs().len(), 4);
    let ranks: Vec<usize> = layer.rank_pairs().iter().map(|p| p.rank).collect();
    assert_eq!(ranks, vec![0, 1, 2, 3]);

    let mut names: Vec<&str> = session.manifest("CryptoObject").unwrap().names().collect();
    names.sort();
    assert_eq!(names, vec!["Cube", "Sphere"]);

    let mattes = session
        .extract("CryptoObject", None, MatchMode::Tolerant, DEFAULT_EPSILON)
        .unwrap();
    assert!(mattes["Sphere"].alpha.iter().all(|&a| a == 0.5));
    assert!(mattes["Cube"].alpha.iter().all(|&a| a == 0.25));
    session.close();
}

#[test]
fn lowercase_channels_and_sidecar_manifest() {
    let (w, h) = (2, 2);
    let dir = scratch_dir("exr_source_sidecar");
    let path = dir.join("blender.exr");
    let prefix = layer_hash("ViewLayer.CryptoMaterial");
    let cube = hash_name("Cube");

    std::fs::write(
        dir.join("materials.json"),
        format!(r#"{{"Cube": "{cube}"}}"#),
    )
    .unwrap();

    ExrFixture::new(w, h)
        .crypto_layer(
            "ViewLayer.CryptoMaterial",
            &[(vec![cube.value(), 0.0, cube.value(), 0.0], constant(w, h, 1.0))],
            None,
            true,
        )
        .attribute(
            &format!("cryptomatte/{prefix}/manif_file"),
            "materials.json",
        )
        .write(&path);

    let session = CryptomatteImage::open(&path).unwrap();
    assert_eq!(session.layer_names(), vec!["ViewLayer.CryptoMaterial"]);
    let manifest = session.require_manifest("ViewLayer.CryptoMaterial").unwrap();
    assert_eq!(manifest.get("Cube"), Some(cube));

    let mattes = session
        .extract(
            "ViewLayer.CryptoMaterial",
            None,
            MatchMode::SinglePass,
            DEFAULT_EPSILON,
        )
        .unwrap();
    assert_eq!(mattes["Cube"].alpha, vec![1.0, 0.0, 1.0, 0.0]);
}
