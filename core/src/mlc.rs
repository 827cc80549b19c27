use serde::{Deserialize, Serialize};

use crate::technique::Technique;

/// リーフ移動量の上限 (表示単位)。
pub const LEAF_TRAVEL_LIMIT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MlcType {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "hd")]
    Hd,
    #[serde(rename = "micro")]
    Micro,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlcCharacteristics {
    pub leaf_width_mm: f64,
    pub pairs: usize,
}

impl MlcType {
    pub const ALL: [MlcType; 3] = [MlcType::Standard, MlcType::Hd, MlcType::Micro];

    pub fn characteristics(self) -> MlcCharacteristics {
        match self {
            MlcType::Standard => MlcCharacteristics {
                leaf_width_mm: 10.0,
                pairs: 60,
            },
            MlcType::Hd => MlcCharacteristics {
                leaf_width_mm: 5.0,
                pairs: 80,
            },
            MlcType::Micro => MlcCharacteristics {
                leaf_width_mm: 2.5,
                pairs: 100,
            },
        }
    }

    pub fn from_key(key: &str) -> Option<MlcType> {
        match key.to_ascii_lowercase().as_str() {
            "standard" => Some(MlcType::Standard),
            "hd" => Some(MlcType::Hd),
            "micro" => Some(MlcType::Micro),
            _ => None,
        }
    }

    pub fn value_key(self) -> &'static str {
        match self {
            MlcType::Standard => "standard",
            MlcType::Hd => "hd",
            MlcType::Micro => "micro",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MlcType::Standard => "標準 MLC",
            MlcType::Hd => "HD MLC",
            MlcType::Micro => "マイクロ MLC",
        }
    }

    /// 治療技法ごとに選択できる MLC 型。2D は MLC を持たない。
    pub fn available_for(technique: Technique) -> &'static [MlcType] {
        match technique {
            Technique::TwoD => &[],
            Technique::ThreeD => &[MlcType::Standard],
            Technique::Imrt => &[MlcType::Standard, MlcType::Hd],
            Technique::Vmat => &[MlcType::Standard, MlcType::Hd, MlcType::Micro],
            Technique::Srs => &[MlcType::Micro],
            Technique::Sbrt => &[MlcType::Hd, MlcType::Micro],
        }
    }
}

/// 1 対のリーフの張り出し量。負側が上段、正側が下段を駆動する。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LeafPair {
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlcBank {
    mlc_type: MlcType,
    pairs: Vec<LeafPair>,
}

impl MlcBank {
    pub fn new(mlc_type: MlcType) -> MlcBank {
        MlcBank {
            mlc_type,
            pairs: vec![LeafPair::default(); mlc_type.characteristics().pairs],
        }
    }

    pub fn mlc_type(&self) -> MlcType {
        self.mlc_type
    }

    pub fn pairs(&self) -> &[LeafPair] {
        &self.pairs
    }

    /// 型を切り替え、リーフ位置を初期化する。
    pub fn set_type(&mut self, mlc_type: MlcType) {
        self.mlc_type = mlc_type;
        self.pairs = vec![LeafPair::default(); mlc_type.characteristics().pairs];
    }

    /// スライダー操作で全リーフ対を一括駆動する。
    pub fn adjust_all(&mut self, value: f64) {
        let value = value.clamp(-LEAF_TRAVEL_LIMIT, LEAF_TRAVEL_LIMIT);
        for pair in &mut self.pairs {
            pair.left = value.min(0.0);
            pair.right = value.max(0.0);
        }
    }

    pub(crate) fn restore_positions(&mut self, positions: Vec<LeafPair>) {
        if positions.len() == self.pairs.len() {
            self.pairs = positions;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_count_follows_the_selected_type() {
        let mut bank = MlcBank::new(MlcType::Standard);
        assert_eq!(bank.pairs().len(), 60);
        bank.set_type(MlcType::Micro);
        assert_eq!(bank.pairs().len(), 100);
        assert!(bank.pairs().iter().all(|pair| pair.left == 0.0 && pair.right == 0.0));
    }

    #[test]
    fn adjust_splits_sign_between_banks() {
        let mut bank = MlcBank::new(MlcType::Hd);
        bank.adjust_all(-12.0);
        assert!(bank.pairs().iter().all(|pair| pair.left == -12.0 && pair.right == 0.0));
        bank.adjust_all(8.0);
        assert!(bank.pairs().iter().all(|pair| pair.left == 0.0 && pair.right == 8.0));
    }

    #[test]
    fn adjust_clamps_to_travel_limit() {
        let mut bank = MlcBank::new(MlcType::Micro);
        bank.adjust_all(55.0);
        assert!(bank.pairs().iter().all(|pair| pair.right == LEAF_TRAVEL_LIMIT));
    }

    #[test]
    fn availability_matches_technique_capabilities() {
        assert!(MlcType::available_for(Technique::TwoD).is_empty());
        assert_eq!(MlcType::available_for(Technique::Srs), &[MlcType::Micro]);
        assert_eq!(MlcType::available_for(Technique::Vmat).len(), 3);
    }
}
