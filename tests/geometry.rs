#[macro_use]
extern crate pretty_assertions;

use voxprep::geometry::{plan_axis, plan_geometry, AxisMode, AxisPlan, TargetGeometry};

#[test]
fn plan_pad_even() {
    assert_eq!(
        plan_axis(90, 96),
        AxisPlan {
            left: 3,
            right: 3,
            mode: AxisMode::Pad
        }
    );
}

#[test]
fn plan_crop_even() {
    assert_eq!(
        plan_axis(100, 96),
        AxisPlan {
            left: 2,
            right: 2,
            mode: AxisMode::Crop
        }
    );
}

#[test]
fn plan_pad_odd_remainder_right() {
    assert_eq!(
        plan_axis(91, 96),
        AxisPlan {
            left: 2,
            right: 3,
            mode: AxisMode::Pad
        }
    );
    let crop = plan_axis(101, 96);
    assert_eq!((crop.left, crop.right, crop.mode), (2, 3, AxisMode::Crop));
}

#[test]
fn plan_offsets_cover_difference() {
    for old in 1..130 {
        for new in 1..130 {
            let plan = plan_axis(old, new);
            let diff = if old > new { old - new } else { new - old };
            assert_eq!(plan.left + plan.right, diff, "old={}, new={}", old, new);
            assert_eq!(plan.left, diff / 2);
            let expected = if old < new {
                AxisMode::Pad
            } else if old > new {
                AxisMode::Crop
            } else {
                AxisMode::Same
            };
            assert_eq!(plan.mode, expected);
        }
    }
}

#[test]
fn plan_volume_axes() {
    let target = TargetGeometry::default();
    let plans = plan_geometry(&[90, 94, 100, 40], &target).unwrap();
    assert_eq!((plans[0].left, plans[0].right, plans[0].mode), (3, 3, AxisMode::Pad));
    assert_eq!((plans[1].left, plans[1].right, plans[1].mode), (1, 1, AxisMode::Pad));
    assert_eq!((plans[2].left, plans[2].right, plans[2].mode), (2, 2, AxisMode::Crop));
    assert!(plan_geometry(&[90, 94], &target).is_err());
}

#[test]
fn target_geometry() {
    let target = TargetGeometry::new(64, 80, 72).unwrap();
    assert_eq!(target.extents(), &[64, 80, 72]);
    assert_eq!(target.to_string(), "64x80x72");
    assert_eq!(TargetGeometry::default().voxel_count(), 96 * 96 * 96);
    assert!(TargetGeometry::new(96, 0, 96).is_err());
}
