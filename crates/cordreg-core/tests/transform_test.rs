use burn_ndarray::NdArray;
use cordreg_core::geometry::{Matrix3d, Point3, Spacing3, Vector3};
use cordreg_core::image::ImageGeometry;
use cordreg_core::transform::{
    transform_point, AffineTransform, CompositeTransform, DisplacementFieldTransform, Transform,
};
use nalgebra::Rotation3;
use proptest::prelude::*;

type B = NdArray<f32>;

fn affine_strategy() -> impl Strategy<Value = AffineTransform> {
    (
        prop::array::uniform3(-0.3f64..0.3),
        0.7f64..1.4,
        prop::array::uniform3(-10.0f64..10.0),
        prop::array::uniform3(-20.0f64..20.0),
    )
        .prop_map(|(angles, scale_z, translation, center)| {
            let rotation = Rotation3::from_euler_angles(angles[0], angles[1], angles[2]);
            let matrix = rotation.matrix() * Matrix3d::from_diagonal(&Vector3::new(1.0, 1.0, scale_z));
            AffineTransform::new(
                matrix,
                Vector3::from(translation),
                Point3::from(Vector3::from(center)),
            )
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Forward chain followed by the reversed chain of inverses is the identity.
    #[test]
    fn test_chain_then_inverse_chain_is_identity(
        transforms in prop::collection::vec(affine_strategy(), 1..5),
        p in prop::array::uniform3(-30.0f64..30.0),
    ) {
        let device = Default::default();
        let mut forward = CompositeTransform::<B>::new();
        let mut inverse = CompositeTransform::<B>::new();
        for t in &transforms {
            forward.push(Box::new(t.clone()));
        }
        for t in transforms.iter().rev() {
            inverse.push(Box::new(t.inverted().unwrap()));
        }

        let point = Point3::from(Vector3::from(p));
        let there = transform_point(&forward, &point, &device);
        let back = transform_point(&inverse, &there, &device);
        prop_assert!((back - point).norm() < 1e-2, "{:?} -> {:?}", point, back);
    }
}

#[test]
fn test_translation_field_and_its_negation_cancel() {
    let device = Default::default();
    let geometry = ImageGeometry::new(
        [8, 8, 12],
        Point3::new(-4.0, -4.0, 0.0),
        Spacing3::new(1.0, 1.0, 1.0),
        nalgebra::Matrix3::identity(),
    );

    // In-plane shift that depends only on the slice index.
    let mut components = [Vec::new(), Vec::new(), Vec::new()];
    for offset in 0..geometry.voxel_count() {
        let z = geometry.voxel_index(offset)[2] as f32;
        components[0].push(0.25 * z);
        components[1].push(-0.1 * z);
        components[2].push(0.0);
    }
    let field = DisplacementFieldTransform::<B>::from_components(components, geometry, &device);
    let inverse = field.negated();

    let composite = CompositeTransform::<B>::new()
        .then(Box::new(field))
        .then(Box::new(inverse));

    for p in [Point3::new(0.0, 0.0, 3.0), Point3::new(1.5, -2.0, 7.0)] {
        let q = transform_point(&composite, &p, &device);
        assert!((q - p).norm() < 1e-4, "point {p:?} moved to {q:?}");
    }
}

#[test]
fn test_composite_inverse_requires_every_stage() {
    let device = Default::default();
    let geometry = ImageGeometry::with_shape([4, 4, 4]);
    let composite = CompositeTransform::<B>::new()
        .then(Box::new(AffineTransform::identity()))
        .then(Box::new(DisplacementFieldTransform::<B>::zeros(geometry, &device)));
    assert!(composite.inverse().is_none());
}
