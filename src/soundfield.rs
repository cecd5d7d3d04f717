// Geometric transforms applied to an estimated soundfield position
// before the channel-map lookup. All positions live in [-1, 1]^2 with
// x left(-1)/right(+1) and y back(-1)/front(+1); angles come from
// atan2(x, y), so 0 is dead ahead and +-pi the rear.

use std::f64::consts::PI;

pub(crate) fn clamp_unit(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

fn sign(v: f64) -> f64 {
    if v < 0.0 {
        -1.0
    } else if v > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Distance from the origin to the unit-square boundary along `ang`,
/// i.e. min(|sec ang|, |csc ang|).
pub(crate) fn edge_distance(ang: f64) -> f64 {
    let t = ang.tan();
    f64::min((1.0 + t * t).sqrt(), (1.0 + 1.0 / (t * t)).sqrt())
}

/// Remaps the front stage to span `refangle_deg` degrees instead of
/// the neutral 90: the front region is stretched, the rear shrunken,
/// with the edge-normalized radius preserved.
pub(crate) fn transform_circular_wrap(x: &mut f64, y: &mut f64, refangle_deg: f64) {
    if refangle_deg == 90.0 {
        return;
    }
    let refangle = refangle_deg * PI / 180.0;
    let baseangle = PI / 2.0;

    let mut ang = f64::atan2(*x, *y);
    let mut len = (*x * *x + *y * *y).sqrt() / edge_distance(ang);

    if ang.abs() < baseangle / 2.0 {
        // within the front stage, which gets enlarged
        ang *= refangle / baseangle;
    } else {
        // within the rear region, which shrinks to compensate
        ang = PI - (-((refangle - 2.0 * PI) * (PI - ang.abs()) * sign(ang) / (2.0 * PI - baseangle)));
    }

    len *= edge_distance(ang);
    *x = clamp_unit(ang.sin() * len);
    *y = clamp_unit(ang.cos() * len);
}

/// Sharpens (focus > 0) or diffuses (focus < 0) the localization by
/// warping the edge-normalized radius.
pub(crate) fn transform_focus(x: &mut f64, y: &mut f64, focus: f64) {
    if focus == 0.0 {
        return;
    }
    let ang = f64::atan2(*x, *y);
    let mut len = clamp_unit((*x * *x + *y * *y).sqrt() / edge_distance(ang));

    len = if focus > 0.0 {
        1.0 - (1.0 - len).powf(1.0 + focus * 20.0)
    } else {
        len.powf(1.0 - focus * 20.0)
    };

    len *= edge_distance(ang);
    *x = clamp_unit(ang.sin() * len);
    *y = clamp_unit(ang.cos() * len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_distance_of_axes_and_diagonals() {
        assert!((edge_distance(0.0) - 1.0).abs() < 1e-12);
        assert!((edge_distance(PI / 2.0) - 1.0).abs() < 1e-9);
        assert!((edge_distance(PI / 4.0) - 2f64.sqrt()).abs() < 1e-12);
        assert!((edge_distance(-3.0 * PI / 4.0) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn neutral_wrap_is_identity() {
        let (mut x, mut y) = (0.37, -0.62);
        transform_circular_wrap(&mut x, &mut y, 90.0);
        assert_eq!((x, y), (0.37, -0.62));
    }

    #[test]
    fn wrap_180_moves_front_corner_to_the_side() {
        // hard right-front corner, 45 degrees
        let (mut x, mut y) = (1.0, 1.0);
        transform_circular_wrap(&mut x, &mut y, 180.0);
        assert!((x - 1.0).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn wrap_keeps_the_front_axis_fixed() {
        let (mut x, mut y) = (0.0, 1.0);
        transform_circular_wrap(&mut x, &mut y, 180.0);
        assert!(x.abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_focus_is_identity() {
        let (mut x, mut y) = (-0.21, 0.8);
        transform_focus(&mut x, &mut y, 0.0);
        assert_eq!((x, y), (-0.21, 0.8));
    }

    #[test]
    fn positive_focus_pushes_interior_points_to_the_edge() {
        let (mut x, mut y) = (0.0, 0.5);
        transform_focus(&mut x, &mut y, 1.0);
        assert!(y > 0.99);
        assert!(x.abs() < 1e-12);
    }

    #[test]
    fn negative_focus_pulls_edge_points_inward() {
        let (mut x, mut y) = (0.0, 0.5);
        transform_focus(&mut x, &mut y, -1.0);
        assert!(y < 1e-6);
        assert!(x.abs() < 1e-12);
    }

    #[test]
    fn focus_leaves_the_boundary_on_the_boundary() {
        let (mut x, mut y) = (1.0, 1.0);
        transform_focus(&mut x, &mut y, 0.7);
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);
    }
}
