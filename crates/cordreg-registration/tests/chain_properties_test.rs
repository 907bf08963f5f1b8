use burn_ndarray::NdArray;
use cordreg_core::geometry::{Matrix3d, Point3, Vector3};
use cordreg_core::transform::{transform_point, AffineTransform};
use cordreg_io::write_itk_affine;
use cordreg_registration::{ChainBuilder, NativeToolbox, Reference, StepTransform, TransformChain, Warp, WarpRef};
use nalgebra::Rotation3;
use proptest::prelude::*;

type TestBackend = NdArray<f32>;

fn affine_strategy() -> impl Strategy<Value = AffineTransform> {
    (
        prop::array::uniform3(-0.4f64..0.4),
        prop::array::uniform3(0.7f64..1.4),
        prop::array::uniform3(-10.0f64..10.0),
        prop::array::uniform3(0.0f64..30.0),
    )
        .prop_map(|(angles, scale, translation, center)| {
            let rotation = Rotation3::from_euler_angles(angles[0], angles[1], angles[2]).into_inner();
            let matrix: Matrix3d = rotation * Matrix3d::from_diagonal(&Vector3::from(scale));
            AffineTransform::new(matrix, Vector3::from(translation), Point3::from(center))
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A chain followed by its inverse maps every point back onto itself.
    #[test]
    fn test_chain_then_inverse_is_identity(
        affines in prop::collection::vec(affine_strategy(), 1..4),
        point in prop::array::uniform3(0.0f64..40.0),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut chain = TransformChain::new();
        for (i, affine) in affines.iter().enumerate() {
            let path = dir.path().join(format!("affine{i}.txt"));
            write_itk_affine(&path, affine).unwrap();
            chain.push(WarpRef::forward(Warp::new(path).unwrap()));
        }

        let round_trip: TransformChain = chain.iter().chain(chain.inverse().unwrap().iter()).cloned().collect();
        let toolbox = NativeToolbox::<TestBackend>::default();
        let composite = toolbox.composite(&round_trip).unwrap();

        let p = Point3::from(point);
        let q = transform_point::<TestBackend, _>(&composite, &p, toolbox.device());
        prop_assert!((q - p).norm() < 1e-2, "{:?} came back as {:?}", p, q);
    }

    /// Every warp of the forward chain has its counterpart at the mirrored
    /// position of the inverse chain.
    #[test]
    fn test_inverse_chain_mirrors_forward(
        template in any::<bool>(),
        dense in prop::collection::vec(any::<bool>(), 0..6),
    ) {
        let reference = if template { Reference::Template } else { Reference::Subject };
        let mut builder = ChainBuilder::new(reference, dense.len());
        if template {
            builder
                .record_straightening(
                    Warp::new("warp_curve2straight.nii.gz").unwrap(),
                    Warp::new("warp_straight2curve.nii.gz").unwrap(),
                )
                .unwrap();
        }
        builder.record_landmark_affine(Warp::new("affine.txt").unwrap()).unwrap();
        for (i, &is_dense) in dense.iter().enumerate() {
            let k = i + 1;
            let step = if is_dense {
                StepTransform::with_inverse(
                    Warp::new(format!("fwd{k}.nii.gz")).unwrap(),
                    Warp::new(format!("inv{k}.nii.gz")).unwrap(),
                )
            } else {
                StepTransform::linear(Warp::new(format!("step{k}.txt")).unwrap()).unwrap()
            };
            builder.record_step(k, step).unwrap();
        }

        let chains = builder.build().unwrap();
        let n = chains.forward.len();
        prop_assert_eq!(n, chains.inverse.len());
        prop_assert_eq!(n, dense.len() + 1 + usize::from(template));

        for (i, forward) in chains.forward.iter().enumerate() {
            let inverse = &chains.inverse.warps()[n - 1 - i];
            let name = forward.path().to_string_lossy().into_owned();
            let expected = if name.ends_with(".txt") {
                prop_assert!(inverse.is_inverted());
                name
            } else if name == "warp_curve2straight.nii.gz" {
                "warp_straight2curve.nii.gz".to_string()
            } else {
                name.replace("fwd", "inv")
            };
            prop_assert_eq!(inverse.path().to_string_lossy().into_owned(), expected);
        }
    }
}
