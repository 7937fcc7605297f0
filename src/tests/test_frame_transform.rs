#[cfg(test)]
mod tests {
    use crate::frame_transform::{
        convert_with, CalibrationError, FrameError, FrameTransform, HomogeneousTransform,
    };
    use crate::pose::Pose6D;
    use crate::tests::test_utils::{data, scratch};
    use nalgebra::{Isometry3, Matrix4, Quaternion, Translation3, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn random_pose(rng: &mut StdRng) -> Pose6D {
        Pose6D::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(0.1..1.5),
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-1.4..1.4),
            rng.gen_range(-3.0..3.0),
        )
    }

    fn random_calibration(rng: &mut StdRng) -> Matrix4<f64> {
        let rotation = UnitQuaternion::new_normalize(Quaternion::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ));
        let translation = Translation3::new(
            rng.gen_range(-2.0..2.0),
            rng.gen_range(-2.0..2.0),
            rng.gen_range(-2.0..2.0),
        );
        Isometry3::from_parts(translation, rotation).to_homogeneous()
    }

    /// Half turns about the base axes and about a diagonal, with an offset.
    fn half_turn_calibrations() -> Vec<Matrix4<f64>> {
        let axes = [
            Vector3::x_axis(),
            Vector3::y_axis(),
            Vector3::z_axis(),
            nalgebra::Unit::new_normalize(Vector3::new(1.0, 1.0, 0.0)),
        ];
        axes.iter()
            .map(|axis| {
                Isometry3::from_parts(
                    Translation3::new(0.5, -0.2, 0.8),
                    UnitQuaternion::from_axis_angle(axis, PI),
                )
                .to_homogeneous()
            })
            .collect()
    }

    fn assert_round_trip(matrix: &Matrix4<f64>, detected: &Pose6D) {
        let calibration = HomogeneousTransform::from_matrix(*matrix).expect("Calibration rejected");
        let deviation = (calibration.isometry.to_homogeneous() - matrix).abs().max();
        assert!(deviation < 1e-9, "Calibration {} stored with deviation {}", matrix, deviation);

        let in_base = convert_with(&calibration, detected).expect("Conversion failed");
        let back = calibration.inverse_apply(&in_base).expect("Inverse failed");
        assert!(
            back.approx_eq(detected, 1e-9, 1e-9),
            "Round trip of {} through {} returned {}",
            detected,
            matrix,
            back
        );
    }

    const DISTANCE_TOLERANCE: f64 = 1e-9;
    const ANGULAR_TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_identity_calibration_keeps_pose() {
        let transform = FrameTransform::new(data("calibration_identity.csv"));
        let detected = Pose6D::new(10.0, 30.0, 100.0, 0.1, 0.2, 0.3);
        let converted = transform.convert(&detected).expect("Conversion failed");

        assert!((converted.x - 10.0).abs() < DISTANCE_TOLERANCE);
        assert!((converted.y - 30.0).abs() < DISTANCE_TOLERANCE);
        assert!((converted.z - 100.0).abs() < DISTANCE_TOLERANCE);
        assert!((converted.roll - 0.1).abs() < ANGULAR_TOLERANCE);
        assert!((converted.pitch - 0.2).abs() < ANGULAR_TOLERANCE);
        assert!((converted.yaw - 0.3).abs() < ANGULAR_TOLERANCE);
    }

    #[test]
    fn test_overhead_camera() {
        // Camera 0.8 above the base, offset 0.5 along x, looking down
        let transform = FrameTransform::new(data("calibration_overhead.csv"));
        let detected = Pose6D::new(0.1, 0.2, 0.3, 0.0, 0.0, 0.0);
        let converted = transform.convert(&detected).expect("Conversion failed");

        let expected = Pose6D::new(0.6, -0.2, 0.5, PI, 0.0, 0.0);
        assert!(
            converted.approx_eq(&expected, 1e-9, 1e-9),
            "Expected {}, got {}",
            expected,
            converted
        );
    }

    #[test]
    fn test_round_trip_random_poses() {
        let calibration = FrameTransform::new(data("calibration_overhead.csv"))
            .snapshot()
            .expect("Calibration not loaded");
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            assert_round_trip(&calibration.matrix, &random_pose(&mut rng));
        }
    }

    #[test]
    fn test_round_trip_random_calibrations() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let matrix = random_calibration(&mut rng);
            for _ in 0..10 {
                assert_round_trip(&matrix, &random_pose(&mut rng));
            }
        }
    }

    #[test]
    fn test_round_trip_half_turn_calibrations() {
        let mut rng = StdRng::seed_from_u64(11);
        for matrix in half_turn_calibrations() {
            for _ in 0..50 {
                assert_round_trip(&matrix, &random_pose(&mut rng));
            }
        }
    }

    #[test]
    fn test_camera_flipped_about_y() {
        let transform = FrameTransform::new(data("calibration_flipped_y.csv"));
        let detected = Pose6D::new(0.1, 0.2, 0.3, 0.0, 0.0, 0.0);
        let converted = transform.convert(&detected).expect("Conversion failed");

        let expected = Pose6D::new(0.4, 0.2, 0.5, 0.0, PI, 0.0);
        assert!(
            converted.approx_eq(&expected, 1e-9, 1e-9),
            "Expected {}, got {}",
            expected,
            converted
        );
    }

    #[test]
    fn test_recalibration_is_picked_up() {
        let path = scratch("recalibrated.csv");
        std::fs::copy(data("calibration_identity.csv"), &path).expect("Copy failed");
        let transform = FrameTransform::new(&path);
        let detected = Pose6D::new(0.1, 0.2, 0.3, 0.0, 0.0, 0.0);
        let before = transform.convert(&detected).expect("Conversion failed");

        std::fs::copy(data("calibration_overhead.csv"), &path).expect("Copy failed");
        let after = transform.convert(&detected).expect("Conversion failed");
        std::fs::remove_file(&path).ok();

        assert!(before.approx_eq(&detected, 1e-9, 1e-9));
        assert!((after.x - 0.6).abs() < 1e-9);
        assert!((after.z - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_calibration() {
        let transform = FrameTransform::new(data("no_such_calibration.csv"));
        let result = transform.convert(&Pose6D::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert!(matches!(
            result,
            Err(FrameError::Calibration(CalibrationError::IoError { .. }))
        ));
    }

    #[test]
    fn test_calibration_with_15_values() {
        let result = HomogeneousTransform::from_csv_file(data("calibration_short.csv"));
        assert!(matches!(
            result,
            Err(CalibrationError::InvalidLength { expected: 16, found: 15 })
        ));
    }

    #[test]
    fn test_malformed_calibration() {
        let result = HomogeneousTransform::from_csv_file(data("calibration_malformed.csv"));
        assert!(matches!(result, Err(CalibrationError::ParseError(_))));
    }

    #[test]
    fn test_skewed_calibration() {
        let result = HomogeneousTransform::from_csv_file(data("calibration_skewed.csv"));
        assert!(matches!(result, Err(CalibrationError::NotRigid(_))));
    }

    #[test]
    fn test_singular_orientation_reported() {
        let transform = FrameTransform::new(data("calibration_identity.csv"));
        let detected = Pose6D::new(0.1, 0.2, 0.3, 0.2, FRAC_PI_2, 0.1);
        let result = transform.convert(&detected);
        assert!(matches!(result, Err(FrameError::Singularity(_))));
    }
}
