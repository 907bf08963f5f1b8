mod common;

use common::{Fixture, RecordingToolbox, TestBackend};
use std::path::Path;

use cordreg_core::image::statistics::normalized_cross_correlation;
use cordreg_core::interpolation::InterpolationKind;
use cordreg_io::{read_geometry, read_volume};
use cordreg_registration::cache::{CURVE2STRAIGHT, STRAIGHT2CURVE, STRAIGHT_REF};
use cordreg_registration::toolbox::TransformOps;
use cordreg_registration::{
    CachePolicy, NativeToolbox, Pipeline, PipelineConfig, Reference, TransformChain, Warp, WarpRef,
};

fn ncc(a: &Path, b: &Path) -> f64 {
    let (a, _) = read_volume(a).unwrap();
    let (b, _) = read_volume(b).unwrap();
    normalized_cross_correlation(&a, &b).unwrap()
}

#[test]
fn test_template_reference_end_to_end() {
    let fixture = Fixture::new();
    let config = fixture.config().with_cache(CachePolicy::Disabled);
    let toolbox = NativeToolbox::<TestBackend>::default();

    let outputs = Pipeline::new(&config, &toolbox).run().unwrap();

    assert_eq!(outputs.files().len(), 7);
    for file in outputs.files() {
        assert!(file.starts_with(&fixture.output_dir), "{} outside the output folder", file.display());
        assert!(file.is_file());
    }
    let straightening = outputs.straightening.as_ref().unwrap();
    assert!(straightening.curve2straight.ends_with(CURVE2STRAIGHT));

    // Resampled volumes live on the grid of their destination.
    let template = fixture.template_dir.join("template").join("PAM50_t2.nii.gz");
    assert!(read_geometry(&outputs.anat2template)
        .unwrap()
        .same_space(&read_geometry(&template).unwrap(), 1e-4));
    assert!(read_geometry(&outputs.template2anat)
        .unwrap()
        .same_space(&read_geometry(&fixture.anatomical).unwrap(), 1e-4));

    let before = ncc(&fixture.anatomical, &template);
    let after = ncc(&outputs.anat2template, &template);
    assert!(after > 0.9, "anat2template NCC {after:.3}");
    assert!(after > before, "registration did not improve alignment ({before:.3} -> {after:.3})");
    let back = ncc(&outputs.template2anat, &fixture.anatomical);
    assert!(back > 0.9, "template2anat NCC {back:.3}");
}

#[test]
fn test_subject_reference_end_to_end() {
    let fixture = Fixture::new();
    let config = fixture.config().with_reference(Reference::Subject);
    let toolbox = NativeToolbox::<TestBackend>::default();

    let outputs = Pipeline::new(&config, &toolbox).run().unwrap();

    assert!(outputs.straightening.is_none());
    assert!(!fixture.output_dir.join(CURVE2STRAIGHT).exists());
    let template = fixture.template_dir.join("template").join("PAM50_t2.nii.gz");
    let back = ncc(&outputs.template2anat, &fixture.anatomical);
    assert!(back > 0.85, "template2anat NCC {back:.3}");
    let forward = ncc(&outputs.anat2template, &template);
    assert!(forward > 0.85, "anat2template NCC {forward:.3}");
}

#[test]
fn test_straightening_is_reused_from_output_folder() {
    let fixture = Fixture::new();
    let config = fixture.config();
    assert_eq!(config.cache, CachePolicy::Sibling(fixture.output_dir.clone()));

    let first = RecordingToolbox::new();
    Pipeline::new(&config, &first).run().unwrap();
    assert_eq!(first.count("straighten"), 1);
    for name in [CURVE2STRAIGHT, STRAIGHT2CURVE, STRAIGHT_REF] {
        assert!(fixture.output_dir.join(name).is_file());
    }

    let second = RecordingToolbox::new();
    let outputs = Pipeline::new(&config, &second).run().unwrap();
    assert_eq!(second.count("straighten"), 0);
    assert_eq!(second.count("register"), 2);
    assert!(outputs.anat2template.is_file());
}

/// Warp `input` through the single dense field `warp` onto `reference`.
fn warp_through(toolbox: &NativeToolbox<TestBackend>, input: &Path, warp: &Path, reference: &Path, output: &Path) {
    let chain: TransformChain = [WarpRef::forward(Warp::new(warp).unwrap())].into_iter().collect();
    toolbox
        .apply(input, output, reference, &chain, InterpolationKind::Linear)
        .unwrap();
}

/// Anatomical image sent to the template and back through the published
/// warps; returns its correlation with the original.
fn round_trip_ncc(fixture: &Fixture, config: &PipelineConfig) -> f64 {
    let toolbox = NativeToolbox::<TestBackend>::default();
    let outputs = Pipeline::new(config, &toolbox).run().unwrap();

    let template = fixture.template_dir.join("template").join("PAM50_t2.nii.gz");
    let there = fixture.dir.path().join("anat_in_template.nii.gz");
    let back = fixture.dir.path().join("anat_round_trip.nii.gz");
    warp_through(&toolbox, &fixture.anatomical, &outputs.warp_anat2template, &template, &there);
    warp_through(&toolbox, &there, &outputs.warp_template2anat, &fixture.anatomical, &back);
    ncc(&back, &fixture.anatomical)
}

#[test]
fn test_template_reference_warps_undo_each_other() {
    let fixture = Fixture::new();
    let config = fixture.config().with_cache(CachePolicy::Disabled);
    let score = round_trip_ncc(&fixture, &config);
    assert!(score > 0.95, "round trip NCC {score:.4}");
}

#[test]
fn test_subject_reference_warps_undo_each_other() {
    let fixture = Fixture::new();
    let config = fixture.config().with_reference(Reference::Subject);
    let score = round_trip_ncc(&fixture, &config);
    assert!(score > 0.95, "round trip NCC {score:.4}");
}
