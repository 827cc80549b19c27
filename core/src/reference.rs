use crate::technique::Technique;

/// 治療技法ごとの臨床的な参照情報。
#[derive(Debug, Clone, Copy)]
pub struct ClinicalNotes {
    pub applications: &'static str,
    pub tumor_sizes: &'static str,
    pub advantages: &'static str,
    pub disadvantages: &'static str,
    pub typical_dose: &'static str,
}

/// 治療技法ごとの技術的な参照情報。
#[derive(Debug, Clone, Copy)]
pub struct TechnicalNotes {
    pub imaging: &'static str,
    pub planning_margin: &'static str,
    pub dose_rate: &'static str,
    pub extras: &'static [(&'static str, &'static str)],
}

impl ClinicalNotes {
    pub fn rows(&self) -> [(&'static str, &'static str); 5] {
        [
            ("主な適応と腫瘍", self.applications),
            ("腫瘍サイズ", self.tumor_sizes),
            ("利点", self.advantages),
            ("欠点", self.disadvantages),
            ("代表的な線量", self.typical_dose),
        ]
    }
}

impl TechnicalNotes {
    pub fn rows(&self) -> Vec<(&'static str, &'static str)> {
        let mut rows = vec![
            ("計画時の画像診断", self.imaging),
            ("計画マージン", self.planning_margin),
            ("線量率", self.dose_rate),
        ];
        rows.extend_from_slice(self.extras);
        rows
    }
}

pub fn clinical_notes(technique: Technique) -> &'static ClinicalNotes {
    match technique {
        Technique::TwoD => &ClinicalNotes {
            applications: "乳がん (乳房切除後)、緩和照射 (骨転移、脊髄圧迫)",
            tumor_sizes: "多様。広い照射野を要する症例に用いられることが多い",
            advantages: "手技が単純で計画・治療時間が短く、設備の限られた施設でも実施できる",
            disadvantages: "精度が低く正常組織の線量が大きい。線量増加には不向き",
            typical_dose: "緩和: 8-30 Gy / 1-10 回; 根治: 50-60 Gy / 25-30 回",
        },
        Technique::ThreeD => &ClinicalNotes {
            applications: "肺がん、前立腺がん、脳腫瘍、頭頸部がん、乳がん",
            tumor_sizes: "様々な大きさに対応。典型的には 2-10 cm",
            advantages: "腫瘍形状への線量集中性が向上し、リスク臓器の線量を下げられる。線量増加が可能",
            disadvantages: "2D より計画に時間がかかり、計画用 CT が必須",
            typical_dose: "60-74 Gy / 30-37 回 (部位と治療方針による)",
        },
        Technique::Imrt => &ClinicalNotes {
            applications: "前立腺がん、頭頸部がん、脳腫瘍、肺がん、膵がん",
            tumor_sizes: "1-15 cm の複雑・不整形な腫瘍に有効",
            advantages: "極めて高い線量集中性とリスク臓器の保護。同時ブーストが可能",
            disadvantages: "計画・治療時間が長く積分線量が増える。複雑な QA が必要",
            typical_dose: "頭頸部: 60-70 Gy (2-2.2 Gy/回); 前立腺: 74-80 Gy (1.8-2 Gy/回)",
        },
        Technique::Vmat => &ClinicalNotes {
            applications: "IMRT と同様。加えて多発転移や広範な骨盤照射",
            tumor_sizes: "1-15 cm。複数ターゲットにも有効",
            advantages: "IMRT より治療時間が短く、高い線量集中性。複数ターゲットに効率的",
            disadvantages: "計画が複雑で厳格な QA を要する。積分線量は IMRT より増えることがある",
            typical_dose: "IMRT と同様: 60-80 Gy / 30-40 回 (部位による)",
        },
        Technique::Srs => &ClinicalNotes {
            applications: "脳転移、前庭神経鞘腫、髄膜腫、脳動静脈奇形",
            tumor_sizes: "3 cm 以下が至適。選択例では 4 cm まで",
            advantages: "単回または少数回で非常に高い線量を投与でき、線量勾配が急峻",
            disadvantages: "小病変に限られ、厳密な固定と高精度 IGRT が必須",
            typical_dose: "脳転移: 15-24 Gy / 単回; 大きめの病変は 24-30 Gy / 3-5 回",
        },
        Technique::Sbrt => &ClinicalNotes {
            applications: "早期肺がん、肝転移、脊椎腫瘍、前立腺がん (ブーストまたは単独)",
            tumor_sizes: "5 cm 未満が至適。選択例では 7 cm まで",
            advantages: "少数回でアブレーティブな線量を投与。治療期間が短く免疫応答の増強も期待される",
            disadvantages: "高精度な固定と先進的 IGRT が必要で、晩期毒性のリスクがある",
            typical_dose: "末梢肺: 48-54 Gy / 3-5 回; 肝: 30-60 Gy / 3-6 回; 前立腺: 35-36.25 Gy / 5 回",
        },
    }
}

pub fn technical_notes(technique: Technique) -> &'static TechnicalNotes {
    match technique {
        Technique::TwoD => &TechnicalNotes {
            imaging: "2D X 線写真、従来型シミュレータ",
            planning_margin: "1-2 cm",
            dose_rate: "200-300 MU/min",
            extras: &[],
        },
        Technique::ThreeD => &TechnicalNotes {
            imaging: "CT。必要に応じて MRI や PET-CT と融合",
            planning_margin: "0.7-1.5 cm (部位と固定法による)",
            dose_rate: "300-600 MU/min",
            extras: &[],
        },
        Technique::Imrt => &TechnicalNotes {
            imaging: "CT。MRI / PET-CT との融合",
            planning_margin: "0.3-0.7 cm (部位と IGRT による)",
            dose_rate: "400-600 MU/min",
            extras: &[(
                "リスク臓器の線量制約",
                "臓器ごとに規定。例: 肺 V20 < 30%、心臓 V25 < 10%",
            )],
        },
        Technique::Vmat => &TechnicalNotes {
            imaging: "CT。MRI / PET-CT との融合",
            planning_margin: "0.3-0.5 cm (毎日の IGRT 併用時)",
            dose_rate: "可変。装置により最大 1400 MU/min",
            extras: &[("回転アーク", "通常 360° アークを 1-2 本。部分アークも可")],
        },
        Technique::Srs => &TechnicalNotes {
            imaging: "薄いスライス (1 mm 以下) の CT と MRI",
            planning_margin: "0-2 mm",
            dose_rate: "> 1000 MU/min (FFF)",
            extras: &[("線量勾配", "PTV 辺縁から 2-3 mm で 50% まで低下")],
        },
        Technique::Sbrt => &TechnicalNotes {
            imaging: "移動する病変には 4D-CT。MRI / PET-CT との融合",
            planning_margin: "0.3-0.5 cm (部位と呼吸性移動管理による)",
            dose_rate: "> 1000 MU/min (FFF)",
            extras: &[(
                "呼吸性移動管理",
                "呼吸同期、リアルタイム追尾、腹部圧迫、ITV の設定",
            )],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_technique_has_reference_notes() {
        for technique in Technique::ALL {
            let clinical = clinical_notes(technique);
            assert!(!clinical.applications.is_empty());
            assert_eq!(clinical.rows().len(), 5);
            let technical = technical_notes(technique);
            assert!(technical.rows().len() >= 3);
        }
    }

    #[test]
    fn advanced_techniques_carry_extra_rows() {
        assert!(!technical_notes(Technique::Imrt).extras.is_empty());
        assert!(!technical_notes(Technique::Sbrt).extras.is_empty());
        assert!(technical_notes(Technique::TwoD).extras.is_empty());
    }
}
