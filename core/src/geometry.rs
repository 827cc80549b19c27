use crate::anatomy::Point;

/// アイソセンタからガントリヘッドまでの距離 (シーン座標)。
pub const GANTRY_RADIUS: f64 = 280.0;

/// 角度を 0 以上 360 未満に正規化する。
pub fn normalize_deg(angle: f64) -> f64 {
    let wrapped = angle % 360.0;
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

/// ガントリ角からビーム射出点を求める。0° が患者頭側、時計回りを正とする。
pub fn beam_origin(tumor: Point, gantry_angle_deg: f64, radius: f64) -> Point {
    let rad = gantry_angle_deg.to_radians();
    Point::new(tumor.x + radius * rad.sin(), tumor.y - radius * rad.cos())
}

/// 現在角から目標角までの残り回転量 (短い方の弧、0..=180)。
pub fn remaining_arc_deg(current: f64, target: f64) -> f64 {
    let diff = normalize_deg(target - current);
    diff.min(360.0 - diff)
}

/// 短い方の弧に沿って step 度だけ目標角へ近づける。目標を跨ぐ場合は目標角で止まる。
pub fn step_toward(current: f64, target: f64, step: f64) -> f64 {
    let current = normalize_deg(current);
    let target = normalize_deg(target);
    let diff = normalize_deg(target - current);
    if diff == 0.0 {
        return target;
    }
    if diff <= 180.0 {
        if diff <= step {
            target
        } else {
            normalize_deg(current + step)
        }
    } else {
        let remaining = 360.0 - diff;
        if remaining <= step {
            target
        } else {
            normalize_deg(current - step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beam_origin_projects_around_the_isocenter() {
        let tumor = Point::new(400.0, 300.0);
        let top = beam_origin(tumor, 0.0, GANTRY_RADIUS);
        assert!((top.x - 400.0).abs() < 1e-9);
        assert!((top.y - 20.0).abs() < 1e-9);

        let right = beam_origin(tumor, 90.0, GANTRY_RADIUS);
        assert!((right.x - 680.0).abs() < 1e-9);
        assert!((right.y - 300.0).abs() < 1e-6);

        let wrapped = beam_origin(tumor, 450.0, GANTRY_RADIUS);
        assert!((wrapped.x - right.x).abs() < 1e-9);
        assert!((wrapped.y - right.y).abs() < 1e-9);
    }

    #[test]
    fn step_toward_takes_the_shorter_arc() {
        // 350° -> 10° は +20° の弧なので正方向に回る
        let next = step_toward(350.0, 10.0, 5.0);
        assert!((next - 355.0).abs() < 1e-9);

        // 10° -> 350° は負方向に回る
        let next = step_toward(10.0, 350.0, 5.0);
        assert!((next - 5.0).abs() < 1e-9);
    }

    #[test]
    fn step_toward_lands_exactly_on_target() {
        let next = step_toward(359.0, 0.0, 5.0);
        assert!((next - 0.0).abs() < 1e-9);
        let next = step_toward(72.0, 72.0, 5.0);
        assert!((next - 72.0).abs() < 1e-9);
    }

    #[test]
    fn stepping_never_increases_the_remaining_arc() {
        let mut current = 200.0;
        let target = 72.0;
        let mut last = remaining_arc_deg(current, target);
        for _ in 0..200 {
            current = step_toward(current, target, 1.0);
            let arc = remaining_arc_deg(current, target);
            assert!(arc <= last + 1e-9);
            last = arc;
        }
        assert!((current - target).abs() < 1e-9);
    }

    #[test]
    fn normalize_handles_negative_angles() {
        assert!((normalize_deg(-90.0) - 270.0).abs() < 1e-9);
        assert!((normalize_deg(720.0) - 0.0).abs() < 1e-9);
    }
}
