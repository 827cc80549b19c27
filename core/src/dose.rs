use crate::anatomy::{self, Point};
use crate::technique::Technique;

/// 線量場の外縁は腫瘍半径の 4 倍。
const MAX_RADIUS_FACTOR: f64 = 4.0;
/// 等線量線の既定レベル。
pub const DEFAULT_ISODOSE_LEVELS: [f64; 4] = [0.9, 0.7, 0.5, 0.3];

const CONTOUR_ANGLE_STEP_RAD: f64 = 0.1;
const CONTOUR_RADIUS_STEP: f64 = 1.0;

/// 腫瘍中心からの距離に対する正規化線量 [0, 1]。
///
/// 技法ごとに多項式の減衰指数と勾配係数が異なり、腫瘍半径 + マージンの
/// 内側には一様なターゲットボーナスが乗る。外縁以遠は 0。
pub fn dose_at(technique: Technique, distance: f64, tumor_radius: f64) -> f64 {
    dose_with_margin(
        technique,
        distance,
        tumor_radius,
        technique.params().margin_mm,
    )
}

fn dose_with_margin(technique: Technique, distance: f64, tumor_radius: f64, margin: f64) -> f64 {
    let max_radius = tumor_radius * MAX_RADIUS_FACTOR;
    if distance >= max_radius {
        return 0.0;
    }

    let (falloff, gradient_factor) = match technique {
        Technique::TwoD => ((1.0 - distance / max_radius).powf(1.2), 1.0),
        Technique::ThreeD => ((1.0 - distance / max_radius).powf(1.5), 1.2),
        Technique::Imrt | Technique::Vmat => ((1.0 - distance / max_radius).powi(2), 1.5),
        Technique::Srs | Technique::Sbrt => {
            let outside = if distance < tumor_radius {
                0.0
            } else {
                (distance - tumor_radius) / (max_radius - tumor_radius)
            };
            ((1.0 - outside).powi(4), 2.0)
        }
    };

    let effective_radius = tumor_radius + margin;
    let target_bonus = if distance <= effective_radius { 0.5 } else { 0.0 };

    ((falloff + target_bonus) * gradient_factor).min(1.0)
}

/// シーン座標上の 1 点の線量。
pub fn dose_at_point(technique: Technique, point: Point) -> f64 {
    let tumor = anatomy::tumor_position(technique);
    let radius = anatomy::tumor_radius(technique);
    dose_at(technique, point.distance_to(tumor), radius)
}

/// 技法ごとの静的な線量分布ラスタ。
#[derive(Debug, Clone)]
pub struct DoseGrid {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl DoseGrid {
    pub fn synthesize(technique: Technique, width: usize, height: usize) -> DoseGrid {
        let mut values = vec![0.0f32; width * height];
        let tumor = anatomy::tumor_position(technique);
        let tumor_radius = anatomy::tumor_radius(technique);
        let margin = technique.params().margin_mm;
        let max_radius = tumor_radius * MAX_RADIUS_FACTOR;

        let x_min = ((tumor.x - max_radius).floor().max(0.0)) as usize;
        let x_max = ((tumor.x + max_radius).ceil() as usize).min(width.saturating_sub(1));
        let y_min = ((tumor.y - max_radius).floor().max(0.0)) as usize;
        let y_max = ((tumor.y + max_radius).ceil() as usize).min(height.saturating_sub(1));

        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let point = Point::new(x as f64, y as f64);
                let distance = point.distance_to(tumor);
                if distance <= max_radius {
                    values[y * width + x] =
                        dose_with_margin(technique, distance, tumor_radius, margin) as f32;
                }
            }
        }

        DoseGrid {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn value_at(&self, x: usize, y: usize) -> f64 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.values[y * self.width + x] as f64
    }

    /// RGBA バッファに変換する。線量 0 の画素は完全透過。
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.width * self.height * 4];
        for (index, value) in self.values.iter().enumerate() {
            if *value <= 0.0 {
                continue;
            }
            let rgba = color_for_dose(*value as f64);
            buffer[index * 4..index * 4 + 4].copy_from_slice(&rgba);
        }
        buffer
    }
}

const COLOR_STOPS: [(f64, [u8; 3]); 6] = [
    (0.1, [0, 0, 255]),
    (0.3, [0, 255, 255]),
    (0.5, [0, 255, 0]),
    (0.7, [255, 255, 0]),
    (0.9, [255, 128, 0]),
    (1.0, [255, 0, 0]),
];

const DOSE_LAYER_ALPHA: u8 = 178; // 0.7

/// 線量を青→赤のカラーマップへ写像する。
pub fn color_for_dose(dose: f64) -> [u8; 4] {
    for window in COLOR_STOPS.windows(2) {
        let (lower_value, lower_color) = window[0];
        let (upper_value, upper_color) = window[1];
        if dose <= upper_value {
            let t = ((dose - lower_value) / (upper_value - lower_value)).clamp(0.0, 1.0);
            let mut rgba = [0u8; 4];
            for channel in 0..3 {
                let low = lower_color[channel] as f64;
                let high = upper_color[channel] as f64;
                rgba[channel] = (low + t * (high - low)).round() as u8;
            }
            rgba[3] = DOSE_LAYER_ALPHA;
            return rgba;
        }
    }
    [255, 0, 0, DOSE_LAYER_ALPHA]
}

/// 各レベルの等線量線を閉じた折れ線として求める。
///
/// 角度を一定刻みで走査し、線量がレベルを下回る最初の半径を採る。
pub fn isodose_contours(technique: Technique, levels: &[f64]) -> Vec<Vec<Point>> {
    let tumor = anatomy::tumor_position(technique);
    let tumor_radius = anatomy::tumor_radius(technique);
    let margin = technique.params().margin_mm;
    let max_radius = tumor_radius * MAX_RADIUS_FACTOR;

    levels
        .iter()
        .map(|level| {
            let mut contour = Vec::new();
            let mut angle = 0.0f64;
            while angle < std::f64::consts::TAU {
                let mut radius = 0.0f64;
                while radius <= max_radius {
                    if dose_with_margin(technique, radius, tumor_radius, margin) <= *level {
                        break;
                    }
                    radius += CONTOUR_RADIUS_STEP;
                }
                contour.push(Point::new(
                    tumor.x + radius * angle.cos(),
                    tumor.y + radius * angle.sin(),
                ));
                angle += CONTOUR_ANGLE_STEP_RAD;
            }
            contour
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dose_is_full_at_the_target_center() {
        for technique in Technique::ALL {
            let radius = anatomy::tumor_radius(technique);
            assert!((dose_at(technique, 0.0, radius) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn dose_vanishes_at_the_field_edge() {
        for technique in Technique::ALL {
            let radius = anatomy::tumor_radius(technique);
            assert_eq!(dose_at(technique, radius * 4.0, radius), 0.0);
            assert_eq!(dose_at(technique, radius * 10.0, radius), 0.0);
        }
    }

    #[test]
    fn dose_never_exceeds_unity_and_never_turns_nan() {
        for technique in Technique::ALL {
            let radius = anatomy::tumor_radius(technique);
            let mut distance = 0.0;
            while distance < radius * 5.0 {
                let dose = dose_at(technique, distance, radius);
                assert!(dose.is_finite());
                assert!((0.0..=1.0).contains(&dose));
                distance += 0.5;
            }
        }
    }

    #[test]
    fn stereotactic_falloff_is_sharper_than_2d() {
        let radius = 30.0;
        let probe = radius * 2.5;
        let srs = dose_at(Technique::Srs, probe, radius);
        let flat = dose_at(Technique::TwoD, probe, radius);
        assert!(srs < flat);
    }

    #[test]
    fn stereotactic_target_interior_gets_full_dose() {
        let radius = anatomy::tumor_radius(Technique::Srs);
        let mut distance = 0.0;
        while distance < radius {
            assert!((dose_at(Technique::Srs, distance, radius) - 1.0).abs() < 1e-9);
            distance += 0.5;
        }
    }

    #[test]
    fn grid_matches_point_evaluation() {
        let grid = DoseGrid::synthesize(Technique::ThreeD, 800, 600);
        let tumor = anatomy::tumor_position(Technique::ThreeD);
        let value = grid.value_at(tumor.x as usize, tumor.y as usize);
        assert!((value - 1.0).abs() < 1e-6);

        let sample = grid.value_at(tumor.x as usize + 50, tumor.y as usize);
        let expected = dose_at_point(
            Technique::ThreeD,
            Point::new(tumor.x + 50.0, tumor.y),
        );
        assert!((sample - expected).abs() < 1e-6);
    }

    #[test]
    fn rgba_export_marks_cold_pixels_transparent() {
        let grid = DoseGrid::synthesize(Technique::Srs, 800, 600);
        let buffer = grid.to_rgba();
        assert_eq!(buffer.len(), 800 * 600 * 4);
        // 角は線量場の外側
        assert_eq!(&buffer[0..4], &[0, 0, 0, 0]);
        let tumor = anatomy::tumor_position(Technique::Srs);
        let index = (tumor.y as usize * 800 + tumor.x as usize) * 4;
        assert_eq!(buffer[index + 3], 178);
    }

    #[test]
    fn colormap_interpolates_between_stops() {
        assert_eq!(color_for_dose(1.0), [255, 0, 0, 178]);
        assert_eq!(color_for_dose(0.1), [0, 0, 255, 178]);
        let mid = color_for_dose(0.2);
        assert_eq!(mid, [0, 128, 255, 178]);
        // 最初のストップ未満でも有効な色に収める
        assert_eq!(color_for_dose(0.01), [0, 0, 255, 178]);
    }

    #[test]
    fn contours_shrink_with_higher_isodose_levels() {
        let contours = isodose_contours(Technique::Imrt, &DEFAULT_ISODOSE_LEVELS);
        assert_eq!(contours.len(), DEFAULT_ISODOSE_LEVELS.len());
        let tumor = anatomy::tumor_position(Technique::Imrt);
        let mean_radius = |points: &[Point]| {
            points.iter().map(|p| p.distance_to(tumor)).sum::<f64>() / points.len() as f64
        };
        // レベルは降順 (0.9, 0.7, 0.5, 0.3) なので半径は昇順になる
        let radii: Vec<f64> = contours.iter().map(|c| mean_radius(c)).collect();
        for pair in radii.windows(2) {
            assert!(pair[0] <= pair[1] + 1e-9);
        }
    }
}
