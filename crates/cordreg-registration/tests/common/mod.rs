//! Synthetic subject and template volumes plus a recording toolbox.

#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn_ndarray::NdArray;
use cordreg_core::geometry::{Point3, Spacing3};
use cordreg_core::image::ImageGeometry;
use cordreg_core::interpolation::InterpolationKind;
use cordreg_core::label::{LabelSet, Landmark};
use cordreg_core::Orientation;
use cordreg_io::{write_labels, write_volume};
use cordreg_registration::cache::StraighteningArtifacts;
use cordreg_registration::chain::{StepTransform, TransformChain};
use cordreg_registration::plan::RegistrationStep;
use cordreg_registration::toolbox::{ImageOps, Registrar, Straightener, TransformOps};
use cordreg_registration::{NativeToolbox, PipelineConfig, Result};

pub type TestBackend = NdArray<f32>;

pub const SHAPE: [usize; 3] = [24, 24, 40];
pub const CORD_RADIUS: f64 = 3.0;
pub const PROFILE_SIGMA: f64 = 3.0;
pub const LEVELS: usize = 5;

/// Refinement steps the native toolbox can solve.
pub const NATIVE_STEPS: &str = "step=1,type=seg,algo=centermassrot,smooth=2:step=2,type=im,algo=centermass";

pub fn geometry() -> ImageGeometry {
    ImageGeometry::new(
        SHAPE,
        Point3::origin(),
        Spacing3::new(1.0, 1.0, 1.0),
        Orientation::RPI.direction(),
    )
}

/// In-plane cord centre of the subject at slice `z`.
pub fn subject_center(z: usize) -> (f64, f64) {
    (12.0 + 2.0 * (PI * z as f64 / (SHAPE[2] - 1) as f64).sin(), 12.0)
}

pub fn template_center(_z: usize) -> (f64, f64) {
    (12.0, 12.0)
}

fn fill(geometry: &ImageGeometry, value: impl Fn([usize; 3]) -> f32) -> Vec<f32> {
    (0..geometry.voxel_count()).map(|i| value(geometry.voxel_index(i))).collect()
}

fn radius(index: [usize; 3], center: &impl Fn(usize) -> (f64, f64)) -> f64 {
    let (cx, cy) = center(index[2]);
    ((index[0] as f64 - cx).powi(2) + (index[1] as f64 - cy).powi(2)).sqrt()
}

/// Smooth intensity profile around a centreline.
pub fn profile(geometry: &ImageGeometry, center: impl Fn(usize) -> (f64, f64)) -> Vec<f32> {
    fill(geometry, |index| {
        let r = radius(index, &center);
        (100.0 * (-(r * r) / (2.0 * PROFILE_SIGMA * PROFILE_SIGMA)).exp()) as f32
    })
}

/// Binary cord mask around a centreline.
pub fn cord(geometry: &ImageGeometry, center: impl Fn(usize) -> (f64, f64)) -> Vec<f32> {
    fill(geometry, |index| if radius(index, &center) <= CORD_RADIUS { 1.0 } else { 0.0 })
}

/// Vertebral levels stacked from the top: level `v` covers slices
/// `40 - 8v ..= 47 - 8v` inside the cord.
pub fn levels(geometry: &ImageGeometry) -> Vec<f32> {
    fill(geometry, |index| {
        if radius(index, &template_center) > CORD_RADIUS {
            return 0.0;
        }
        let level = (SHAPE[2] - index[2] + 7) / 8;
        if (1..=LEVELS).contains(&level) {
            level as f32
        } else {
            0.0
        }
    })
}

/// Subject landmarks on the cord at the centre of levels 1 and 2.
pub fn subject_labels() -> LabelSet {
    [(36, 1.0), (28, 2.0)]
        .into_iter()
        .map(|(z, value)| {
            let (x, y) = subject_center(z);
            Landmark::new([x.round() as usize, y.round() as usize, z], value)
        })
        .collect()
}

/// On-disk inputs of a run.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub anatomical: PathBuf,
    pub segmentation: PathBuf,
    pub labels: PathBuf,
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let geometry = geometry();

        let anatomical = dir.path().join("t2.nii.gz");
        let segmentation = dir.path().join("t2_seg.nii.gz");
        let labels = dir.path().join("t2_labels.nii.gz");
        write_volume(&anatomical, &profile(&geometry, subject_center), &geometry).unwrap();
        write_volume(&segmentation, &cord(&geometry, subject_center), &geometry).unwrap();
        write_labels(&labels, &subject_labels(), &geometry).unwrap();

        let template_dir = dir.path().join("PAM50");
        let folder = template_dir.join("template");
        fs::create_dir_all(&folder).unwrap();
        write_volume(folder.join("PAM50_t2.nii.gz"), &profile(&geometry, template_center), &geometry).unwrap();
        write_volume(folder.join("PAM50_cord.nii.gz"), &cord(&geometry, template_center), &geometry).unwrap();
        write_volume(folder.join("PAM50_levels.nii.gz"), &levels(&geometry), &geometry).unwrap();

        let output_dir = dir.path().join("out");
        Self {
            dir,
            anatomical,
            segmentation,
            labels,
            template_dir,
            output_dir,
        }
    }

    /// Replace the subject labels.
    pub fn write_labels(&self, labels: &[([usize; 3], f64)]) {
        let set: LabelSet = labels.iter().map(|&(index, value)| Landmark::new(index, value)).collect();
        write_labels(&self.labels, &set, &geometry()).unwrap();
    }

    /// Configuration with refinement steps the native toolbox supports.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new(&self.anatomical, &self.segmentation, &self.labels, &self.template_dir)
            .with_step_overrides(cordreg_registration::StepOverride::parse_list(NATIVE_STEPS).unwrap())
            .with_output_dir(&self.output_dir)
    }

    pub fn output_files(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Native toolbox that remembers which operations ran.
pub struct RecordingToolbox {
    inner: NativeToolbox<TestBackend>,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingToolbox {
    pub fn new() -> Self {
        Self {
            inner: NativeToolbox::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| **c == name).count()
    }
}

impl ImageOps for RecordingToolbox {
    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        self.record("convert");
        self.inner.convert(input, output)
    }

    fn binarize(&self, input: &Path, output: &Path, threshold: f64) -> Result<()> {
        self.record("binarize");
        self.inner.binarize(input, output, threshold)
    }

    fn resample_mm(&self, input: &Path, output: &Path, spacing: [f64; 3], interpolation: InterpolationKind) -> Result<()> {
        self.record("resample_mm");
        self.inner.resample_mm(input, output, spacing, interpolation)
    }

    fn resample_factor(&self, input: &Path, output: &Path, factor: [f64; 3]) -> Result<()> {
        self.record("resample_factor");
        self.inner.resample_factor(input, output, factor)
    }

    fn set_orientation(&self, input: &Path, output: &Path, orientation: Orientation) -> Result<()> {
        self.record("set_orientation");
        self.inner.set_orientation(input, output, orientation)
    }

    fn crop(&self, input: &Path, output: &Path, axis: usize, start: usize, end: usize) -> Result<()> {
        self.record("crop");
        self.inner.crop(input, output, axis, start, end)
    }

    fn dilate(&self, input: &Path, output: &Path, radius: usize) -> Result<()> {
        self.record("dilate");
        self.inner.dilate(input, output, radius)
    }

    fn vertebral_body_labels(&self, levels: &Path, output: &Path) -> Result<()> {
        self.record("vertebral_body_labels");
        self.inner.vertebral_body_labels(levels, output)
    }
}

impl TransformOps for RecordingToolbox {
    fn apply(
        &self,
        input: &Path,
        output: &Path,
        reference: &Path,
        chain: &TransformChain,
        interpolation: InterpolationKind,
    ) -> Result<()> {
        self.record("apply");
        self.inner.apply(input, output, reference, chain, interpolation)
    }

    fn concatenate(&self, chain: &TransformChain, reference: &Path, output: &Path) -> Result<()> {
        self.record("concatenate");
        self.inner.concatenate(chain, reference, output)
    }
}

impl Straightener for RecordingToolbox {
    fn straighten(
        &self,
        segmentation: &Path,
        output: &Path,
        workdir: &Path,
        params: Option<&str>,
        verbosity: u8,
    ) -> Result<StraighteningArtifacts> {
        self.record("straighten");
        self.inner.straighten(segmentation, output, workdir, params, verbosity)
    }
}

impl Registrar for RecordingToolbox {
    fn register(
        &self,
        source: &Path,
        destination: &Path,
        step: &RegistrationStep,
        workdir: &Path,
    ) -> Result<StepTransform> {
        self.record("register");
        self.inner.register(source, destination, step, workdir)
    }
}
