//! Model bundle round trips and the checks that keep weights and labels paired

use sign_translate::{
    bundle::{Normalization, LABELS_FILE, MANIFEST_FILE, MODEL_FILE},
    error::{Result, TranslateError},
    labels::labels_from_dataset,
    Backbone, BundleOptions, InputGeometry, LabelCodec, ModelBundle, SamplingStrategy,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn weights(dir: &Path) -> PathBuf {
    let path = dir.join("export.onnx");
    std::fs::write(&path, b"fake onnx weights").unwrap();
    path
}

fn create(dir: &Path, labels: &[&str]) -> Result<ModelBundle> {
    let codec = LabelCodec::fit(labels.iter().copied())?;
    ModelBundle::create(&dir.join("bundle"), &weights(dir), &codec, &BundleOptions::default())
}

fn assert_model_load(result: Result<ModelBundle>) {
    match result {
        Err(TranslateError::ModelLoad(_)) => {},
        Err(other) => panic!("expected ModelLoad, got {other}"),
        Ok(_) => panic!("expected ModelLoad, bundle loaded"),
    }
}

#[test]
fn test_create_then_load() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let options = BundleOptions {
        backbone: Backbone::R2Plus1d18,
        input: InputGeometry {
            frames: 8,
            height: 128,
            width: 171,
        },
        sampling: SamplingStrategy::Leading,
        normalization: Some(Normalization {
            mean: [0.43, 0.39, 0.37],
            std: [0.22, 0.21, 0.22],
        }),
    };
    let codec = LabelCodec::fit(["sorry", "hello", "thank you", "hello"])?;
    ModelBundle::create(&dir.path().join("bundle"), &weights(dir.path()), &codec, &options)?;

    let bundle = ModelBundle::load(&dir.path().join("bundle"))?;
    let manifest = bundle.manifest();
    assert_eq!(manifest.backbone, Backbone::R2Plus1d18);
    assert_eq!(manifest.num_classes, 3);
    assert_eq!(manifest.sampling, SamplingStrategy::Leading);
    assert_eq!(bundle.input_shape(), [1, 3, 8, 128, 171]);
    assert_eq!(bundle.labels().classes(), ["hello", "sorry", "thank you"]);
    assert_eq!(bundle.model_bytes()?, b"fake onnx weights");

    let preprocessing = bundle.preprocessing_config();
    assert_eq!(preprocessing.target_size, [128, 171]);
    assert_eq!(preprocessing.normalization_mean, [0.43, 0.39, 0.37]);
    Ok(())
}

#[test]
fn test_edited_labels_are_rejected() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let bundle = create(dir.path(), &["a", "b", "c"])?;
    std::fs::write(
        bundle.root().join(LABELS_FILE),
        br#"{"classes": ["a", "b", "x"]}"#,
    )
    .unwrap();
    assert_model_load(ModelBundle::load(bundle.root()));
    Ok(())
}

#[test]
fn test_class_count_mismatch_is_rejected() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let bundle = create(dir.path(), &["a", "b", "c"])?;
    let manifest_path = bundle.root().join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
    manifest["num_classes"] = serde_json::json!(400);
    std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

    assert_model_load(ModelBundle::load(bundle.root()));
    Ok(())
}

#[test]
fn test_unknown_schema_version_is_rejected() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let bundle = create(dir.path(), &["a", "b"])?;
    let manifest_path = bundle.root().join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
    manifest["schema_version"] = serde_json::json!(99);
    std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

    assert_model_load(ModelBundle::load(bundle.root()));
    Ok(())
}

#[test]
fn test_swapped_weights_fail_when_read() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let bundle = create(dir.path(), &["a", "b"])?;
    std::fs::write(bundle.root().join(MODEL_FILE), b"other weights").unwrap();

    // The manifest itself is still consistent
    let reloaded = ModelBundle::load(bundle.root())?;
    assert!(matches!(reloaded.model_bytes(), Err(TranslateError::ModelLoad(_))));
    Ok(())
}

#[test]
fn test_missing_files() -> Result<()> {
    let dir = TempDir::new().unwrap();
    assert_model_load(ModelBundle::load(&dir.path().join("nothing")));

    let bundle = create(dir.path(), &["a", "b"])?;
    std::fs::remove_file(bundle.root().join(MODEL_FILE)).unwrap();
    assert_model_load(ModelBundle::load(bundle.root()));
    Ok(())
}

#[test]
fn test_output_width_check() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let bundle = create(dir.path(), &["a", "b", "c"])?;
    assert!(bundle.validate_output_width(Some(3)).is_ok());
    assert!(bundle.validate_output_width(None).is_ok());
    assert!(matches!(
        bundle.validate_output_width(Some(2)),
        Err(TranslateError::ModelLoad(_))
    ));
    Ok(())
}

#[test]
fn test_labels_fitted_from_nested_dataset() -> Result<()> {
    let dir = TempDir::new().unwrap();
    for clip in [
        "Greetings/1. Hello/a.mov",
        "Greetings/1. Hello/b.mov",
        "Greetings/3. Good morning/a.mov",
        "Feelings/12. Sorry/x.mov",
        "Feelings/12. Sorry/ignored.mp4",
    ] {
        let path = dir.path().join(clip);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"clip").unwrap();
    }

    let labels = labels_from_dataset(dir.path())?;
    assert_eq!(labels.len(), 4);

    let codec = LabelCodec::fit(labels)?;
    // Folder names keep their leading space once digits and dots are removed
    assert_eq!(codec.classes(), [" Good morning", " Hello", " Sorry"]);
    for label in codec.classes() {
        assert_eq!(codec.decode(codec.encode(label)?)?, label);
    }
    assert!(matches!(codec.encode("Hello"), Err(TranslateError::UnknownLabel(_))));
    assert!(matches!(
        codec.decode(3),
        Err(TranslateError::IndexOutOfRange { index: 3, len: 3 })
    ));
    Ok(())
}
