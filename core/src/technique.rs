use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// 外部照射で用いる治療技法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Technique {
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "3d")]
    ThreeD,
    #[serde(rename = "imrt")]
    Imrt,
    #[serde(rename = "vmat")]
    Vmat,
    #[serde(rename = "srs")]
    Srs,
    #[serde(rename = "sbrt")]
    Sbrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamShape {
    Rectangular,
    Conformal,
    Modulated,
    Convergent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlcSpec {
    pub leaf_width_mm: f64,
    pub dynamic: bool,
    pub continuous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TechniqueParams {
    pub fields: Vec<u16>,
    pub beam_shape: BeamShape,
    pub margin_mm: f64,
    pub precision: u8,
    pub tissue_protection: u8,
    pub fractions: u32,
    pub mlc: Option<MlcSpec>,
}

impl TechniqueParams {
    /// 1照射野あたりに投与される線量 (全コース = 100%)。
    pub fn dose_per_field(&self) -> f64 {
        100.0 / (self.fractions as f64 * self.fields.len() as f64)
    }
}

impl Technique {
    pub const ALL: [Technique; 6] = [
        Technique::TwoD,
        Technique::ThreeD,
        Technique::Imrt,
        Technique::Vmat,
        Technique::Srs,
        Technique::Sbrt,
    ];

    pub fn params(self) -> TechniqueParams {
        match self {
            Technique::TwoD => TechniqueParams {
                fields: vec![0, 180],
                beam_shape: BeamShape::Rectangular,
                margin_mm: 20.0,
                precision: 20,
                tissue_protection: 30,
                fractions: 30,
                mlc: None,
            },
            Technique::ThreeD => TechniqueParams {
                fields: vec![0, 72, 144, 216, 288],
                beam_shape: BeamShape::Conformal,
                margin_mm: 10.0,
                precision: 40,
                tissue_protection: 50,
                fractions: 30,
                mlc: Some(MlcSpec {
                    leaf_width_mm: 10.0,
                    dynamic: false,
                    continuous: false,
                }),
            },
            Technique::Imrt => TechniqueParams {
                fields: vec![0, 40, 80, 120, 160, 200, 240, 280, 320],
                beam_shape: BeamShape::Modulated,
                margin_mm: 5.0,
                precision: 70,
                tissue_protection: 80,
                fractions: 30,
                mlc: Some(MlcSpec {
                    leaf_width_mm: 5.0,
                    dynamic: true,
                    continuous: false,
                }),
            },
            Technique::Vmat => TechniqueParams {
                fields: (0..360).collect(),
                beam_shape: BeamShape::Modulated,
                margin_mm: 3.0,
                precision: 85,
                tissue_protection: 90,
                fractions: 30,
                mlc: Some(MlcSpec {
                    leaf_width_mm: 5.0,
                    dynamic: true,
                    continuous: true,
                }),
            },
            Technique::Srs => TechniqueParams {
                fields: (0..36).map(|i| i * 10).collect(),
                beam_shape: BeamShape::Convergent,
                margin_mm: 1.0,
                precision: 95,
                tissue_protection: 95,
                fractions: 1,
                mlc: Some(MlcSpec {
                    leaf_width_mm: 2.5,
                    dynamic: true,
                    continuous: false,
                }),
            },
            Technique::Sbrt => TechniqueParams {
                fields: (0..36).map(|i| i * 10).collect(),
                beam_shape: BeamShape::Convergent,
                margin_mm: 2.0,
                precision: 95,
                tissue_protection: 95,
                fractions: 5,
                mlc: Some(MlcSpec {
                    leaf_width_mm: 2.5,
                    dynamic: true,
                    continuous: false,
                }),
            },
        }
    }

    /// 回転しながら連続照射する技法かどうか。
    pub fn is_continuous(self) -> bool {
        matches!(self, Technique::Vmat)
    }

    pub fn from_key(key: &str) -> Option<Technique> {
        match key.to_ascii_lowercase().as_str() {
            "2d" => Some(Technique::TwoD),
            "3d" => Some(Technique::ThreeD),
            "imrt" => Some(Technique::Imrt),
            "vmat" => Some(Technique::Vmat),
            "srs" => Some(Technique::Srs),
            "sbrt" => Some(Technique::Sbrt),
            _ => None,
        }
    }

    pub fn value_key(self) -> &'static str {
        match self {
            Technique::TwoD => "2d",
            Technique::ThreeD => "3d",
            Technique::Imrt => "imrt",
            Technique::Vmat => "vmat",
            Technique::Srs => "srs",
            Technique::Sbrt => "sbrt",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Technique::TwoD => "2D照射",
            Technique::ThreeD => "3D原体照射",
            Technique::Imrt => "強度変調放射線治療 (IMRT)",
            Technique::Vmat => "強度変調回転照射 (VMAT)",
            Technique::Srs => "定位手術的照射 (SRS)",
            Technique::Sbrt => "体幹部定位放射線治療 (SBRT)",
        }
    }

    /// 1セッションあたりの推定治療時間 (分)。表示専用。
    pub fn estimated_minutes(self, rng: &mut StdRng) -> f64 {
        match self {
            Technique::TwoD | Technique::ThreeD => 15.0 + rng.gen_range(0.0..5.0),
            Technique::Imrt => 20.0 + rng.gen_range(0.0..10.0),
            Technique::Vmat => 10.0 + rng.gen_range(0.0..5.0),
            Technique::Srs | Technique::Sbrt => 30.0 + rng.gen_range(0.0..30.0),
        }
    }
}

impl BeamShape {
    pub fn label(self) -> &'static str {
        match self {
            BeamShape::Rectangular => "矩形ビーム",
            BeamShape::Conformal => "原体ビーム",
            BeamShape::Modulated => "強度変調ビーム",
            BeamShape::Convergent => "集束ビーム",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn every_technique_has_fields_and_fractions() {
        for technique in Technique::ALL {
            let params = technique.params();
            assert!(!params.fields.is_empty());
            assert!(params.fractions >= 1);
            assert!(params.fields.iter().all(|angle| *angle < 360));
        }
    }

    #[test]
    fn vmat_is_the_only_continuous_technique() {
        for technique in Technique::ALL {
            assert_eq!(technique.is_continuous(), technique == Technique::Vmat);
            if let Some(mlc) = technique.params().mlc {
                assert_eq!(mlc.continuous, technique == Technique::Vmat);
            }
        }
    }

    #[test]
    fn srs_is_single_fraction_vmat_covers_full_arc() {
        assert_eq!(Technique::Srs.params().fractions, 1);
        let vmat = Technique::Vmat.params();
        assert_eq!(vmat.fields.len(), 360);
        assert_eq!(vmat.fields[0], 0);
        assert_eq!(*vmat.fields.last().unwrap(), 359);
    }

    #[test]
    fn dose_per_field_sums_to_full_course() {
        for technique in Technique::ALL {
            let params = technique.params();
            let total =
                params.dose_per_field() * params.fractions as f64 * params.fields.len() as f64;
            assert!((total - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn keys_round_trip() {
        for technique in Technique::ALL {
            assert_eq!(Technique::from_key(technique.value_key()), Some(technique));
        }
        assert_eq!(Technique::from_key("VMAT"), Some(Technique::Vmat));
        assert!(Technique::from_key("protons").is_none());
    }

    #[test]
    fn estimated_minutes_stays_in_advertised_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let minutes = Technique::Srs.estimated_minutes(&mut rng);
            assert!((30.0..60.0).contains(&minutes));
            let minutes = Technique::Vmat.estimated_minutes(&mut rng);
            assert!((10.0..15.0).contains(&minutes));
        }
    }
}
