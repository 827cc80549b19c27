use anyhow::{Result, anyhow, ensure};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::anatomy::TumorShape;
use crate::dose::{DoseGrid, isodose_contours};
use crate::geometry;
use crate::mlc::{LEAF_TRAVEL_LIMIT, LeafPair, MlcBank, MlcType};
use crate::technique::{Technique, TechniqueParams};

/// ガントリの回転速度 (度/秒)。
pub const ROTATION_DEG_PER_SEC: f64 = 62.5;
/// 静的照射野 1 つあたりのビーム照射時間 (秒)。
pub const BEAM_DWELL_SECONDS: f64 = 2.0;
/// 分割間の待機時間 (秒)。
pub const FRACTION_PAUSE_SECONDS: f64 = 1.0;

const FULL_ARC_DEG: f64 = 360.0;
const MIN_BEAM_ENERGY_MEV: f64 = 1.0;
const MAX_BEAM_ENERGY_MEV: f64 = 20.0;
const MIN_BEAM_WIDTH_MM: f64 = 20.0;
const MAX_BEAM_WIDTH_MM: f64 = 200.0;
const TIME_EPS: f64 = 1e-9;

/// セッションの初期設定。`config/session.json` やフロントエンドから与えられる。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub technique: Technique,
    pub tumor_shape: TumorShape,
    pub beam_energy_mev: f64,
    pub beam_width_mm: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            technique: Technique::TwoD,
            tumor_shape: TumorShape::Round,
            beam_energy_mev: 6.0,
            beam_width_mm: 100.0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.beam_energy_mev.is_finite(),
            "ビームエネルギーが不正です"
        );
        ensure!(
            (MIN_BEAM_ENERGY_MEV..=MAX_BEAM_ENERGY_MEV).contains(&self.beam_energy_mev),
            "ビームエネルギーは{}〜{} MeVの範囲で指定してください",
            MIN_BEAM_ENERGY_MEV,
            MAX_BEAM_ENERGY_MEV
        );
        ensure!(self.beam_width_mm.is_finite(), "ビーム幅が不正です");
        ensure!(
            (MIN_BEAM_WIDTH_MM..=MAX_BEAM_WIDTH_MM).contains(&self.beam_width_mm),
            "ビーム幅は{}〜{} mmの範囲で指定してください",
            MIN_BEAM_WIDTH_MM,
            MAX_BEAM_WIDTH_MM
        );
        Ok(())
    }
}

/// 治療サイクルの進行フェーズ。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryPhase {
    Idle,
    Rotating,
    BeamOn { remaining_s: f64 },
    Arc { remaining_deg: f64 },
    FractionPause { remaining_s: f64 },
    Finished,
}

/// 毎フレームの UI 同期に使う状態レポート。
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub technique: Technique,
    pub gantry_angle: f64,
    pub field_label: String,
    pub accumulated_dose: f64,
    pub fraction: u32,
    pub total_fractions: u32,
    pub beam_on: bool,
    pub running: bool,
    pub paused: bool,
    pub finished: bool,
}

/// 保存・復元用のスナップショット。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub technique: Technique,
    pub tumor_shape: TumorShape,
    pub beam_energy_mev: f64,
    pub beam_width_mm: f64,
    pub mlc_type: Option<MlcType>,
    pub mlc_positions: Vec<LeafPair>,
    pub current_angle: f64,
    pub target_angle: f64,
    pub current_field: Option<u16>,
    pub field_index: usize,
    pub fraction: u32,
    pub accumulated_dose: f64,
    pub beam_on: bool,
    pub running: bool,
    pub paused: bool,
    pub phase: DeliveryPhase,
}

/// 治療セッションの状態機械。
///
/// 実時間には依存せず、`advance(秒)` の呼び出しだけで進行する。
/// 一時停止中はティック間のどの位置でも状態を失わずに保持する。
pub struct TreatmentSession {
    technique: Technique,
    params: TechniqueParams,
    tumor_shape: TumorShape,
    beam_energy_mev: f64,
    beam_width_mm: f64,
    mlc: Option<MlcBank>,
    current_angle: f64,
    target_angle: f64,
    current_field: Option<u16>,
    field_index: usize,
    fraction: u32,
    accumulated_dose: f64,
    beam_on: bool,
    running: bool,
    paused: bool,
    phase: DeliveryPhase,
    rng: StdRng,
}

impl TreatmentSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: SessionConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let technique = config.technique;
        Ok(Self {
            technique,
            params: technique.params(),
            tumor_shape: config.tumor_shape,
            beam_energy_mev: config.beam_energy_mev,
            beam_width_mm: config.beam_width_mm,
            mlc: default_mlc_bank(technique),
            current_angle: 0.0,
            target_angle: 0.0,
            current_field: None,
            field_index: 0,
            fraction: 1,
            accumulated_dose: 0.0,
            beam_on: false,
            running: false,
            paused: false,
            phase: DeliveryPhase::Idle,
            rng,
        })
    }

    #[cfg(test)]
    pub fn with_seed(config: SessionConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn technique(&self) -> Technique {
        self.technique
    }

    pub fn params(&self) -> &TechniqueParams {
        &self.params
    }

    pub fn tumor_shape(&self) -> TumorShape {
        self.tumor_shape
    }

    pub fn beam_energy_mev(&self) -> f64 {
        self.beam_energy_mev
    }

    pub fn beam_width_mm(&self) -> f64 {
        self.beam_width_mm
    }

    pub fn mlc(&self) -> Option<&MlcBank> {
        self.mlc.as_ref()
    }

    pub fn current_angle(&self) -> f64 {
        self.current_angle
    }

    pub fn accumulated_dose(&self) -> f64 {
        self.accumulated_dose
    }

    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    pub fn beam_on(&self) -> bool {
        self.beam_on
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_finished(&self) -> bool {
        self.phase == DeliveryPhase::Finished
    }

    pub fn phase(&self) -> DeliveryPhase {
        self.phase
    }

    /// 治療コースを最初から開始する。
    pub fn start(&mut self) -> Result<Vec<String>> {
        ensure!(!self.running, "治療は既に進行中です");
        self.accumulated_dose = 0.0;
        self.fraction = 1;
        self.field_index = 0;
        self.current_field = None;
        self.beam_on = false;
        self.paused = false;
        self.running = true;
        let mut reports = vec![format!(
            "治療を開始します: {} (全{}回)",
            self.technique.label(),
            self.params.fractions
        )];
        self.begin_fraction(&mut reports);
        Ok(reports)
    }

    pub fn pause(&mut self) -> Result<()> {
        ensure!(self.running, "治療が開始されていません");
        ensure!(!self.paused, "治療は既に一時停止中です");
        self.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        ensure!(self.running, "治療が開始されていません");
        ensure!(self.paused, "治療は一時停止されていません");
        self.paused = false;
        Ok(())
    }

    /// 開始 / 一時停止 / 再開を 1 つの操作で切り替える。
    pub fn toggle(&mut self) -> Result<Vec<String>> {
        if !self.running {
            self.start()
        } else if self.paused {
            self.resume()?;
            Ok(Vec::new())
        } else {
            self.pause()?;
            Ok(Vec::new())
        }
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.paused = false;
        self.beam_on = false;
        self.current_angle = 0.0;
        self.target_angle = 0.0;
        self.current_field = None;
        self.field_index = 0;
        self.fraction = 1;
        self.accumulated_dose = 0.0;
        self.phase = DeliveryPhase::Idle;
    }

    /// シミュレーション時間を `seconds` 秒進める。
    ///
    /// フェーズ境界をまたぐ場合は残り時間を分割して処理するため、
    /// 大きなティックでも進行は決定的になる。停止中・一時停止中は何もしない。
    pub fn advance(&mut self, seconds: f64) -> Result<Vec<String>> {
        ensure!(seconds.is_finite(), "時間が不正です");
        ensure!(seconds > 0.0, "時間は正の値で指定してください");

        let mut reports = Vec::new();
        if !self.running || self.paused {
            return Ok(reports);
        }

        let mut remaining = seconds;
        while remaining > TIME_EPS && self.running {
            match self.phase {
                DeliveryPhase::Idle | DeliveryPhase::Finished => break,
                DeliveryPhase::Rotating => {
                    let arc = geometry::remaining_arc_deg(self.current_angle, self.target_angle);
                    let reachable = ROTATION_DEG_PER_SEC * remaining;
                    if reachable >= arc {
                        remaining -= arc / ROTATION_DEG_PER_SEC;
                        self.current_angle = self.target_angle;
                        self.beam_on = true;
                        self.phase = DeliveryPhase::BeamOn {
                            remaining_s: BEAM_DWELL_SECONDS,
                        };
                        reports.push(format!(
                            "照射野 {} に到達しました。ビーム照射を開始します。",
                            self.current_field_label()
                        ));
                    } else {
                        self.current_angle = geometry::step_toward(
                            self.current_angle,
                            self.target_angle,
                            reachable,
                        );
                        remaining = 0.0;
                    }
                }
                DeliveryPhase::BeamOn { remaining_s } => {
                    let used = remaining.min(remaining_s);
                    let rate = self.params.dose_per_field() / BEAM_DWELL_SECONDS;
                    self.accumulated_dose = (self.accumulated_dose + rate * used).min(100.0);
                    remaining -= used;
                    let left = remaining_s - used;
                    if left <= TIME_EPS {
                        self.beam_on = false;
                        self.next_field(&mut reports);
                    } else {
                        self.phase = DeliveryPhase::BeamOn { remaining_s: left };
                    }
                }
                DeliveryPhase::Arc { remaining_deg } => {
                    let reachable = ROTATION_DEG_PER_SEC * remaining;
                    let deg = reachable.min(remaining_deg);
                    self.current_angle = geometry::normalize_deg(self.current_angle + deg);
                    let dose_per_deg = 100.0 / (self.params.fractions as f64 * FULL_ARC_DEG);
                    self.accumulated_dose = (self.accumulated_dose + dose_per_deg * deg).min(100.0);
                    remaining -= deg / ROTATION_DEG_PER_SEC;
                    let left = remaining_deg - deg;
                    if left <= TIME_EPS {
                        self.beam_on = false;
                        self.complete_fraction(&mut reports);
                    } else {
                        self.phase = DeliveryPhase::Arc { remaining_deg: left };
                    }
                }
                DeliveryPhase::FractionPause { remaining_s } => {
                    let used = remaining.min(remaining_s);
                    remaining -= used;
                    let left = remaining_s - used;
                    if left <= TIME_EPS {
                        self.fraction += 1;
                        self.field_index = 0;
                        self.begin_fraction(&mut reports);
                    } else {
                        self.phase = DeliveryPhase::FractionPause { remaining_s: left };
                    }
                }
            }
        }

        Ok(reports)
    }

    fn begin_fraction(&mut self, reports: &mut Vec<String>) {
        if self.technique.is_continuous() {
            self.beam_on = true;
            self.current_field = None;
            self.phase = DeliveryPhase::Arc {
                remaining_deg: FULL_ARC_DEG,
            };
            reports.push(format!(
                "第{}回: 回転照射アークを開始します。",
                self.fraction
            ));
        } else {
            self.set_field(0, reports);
        }
    }

    fn set_field(&mut self, index: usize, reports: &mut Vec<String>) {
        self.field_index = index;
        let angle = self.params.fields[index];
        self.target_angle = angle as f64;
        self.current_field = Some(angle);
        self.phase = DeliveryPhase::Rotating;
        reports.push(format!(
            "照射野 {} へガントリを回転します。",
            field_label(angle)
        ));
    }

    fn next_field(&mut self, reports: &mut Vec<String>) {
        let next = self.field_index + 1;
        if next < self.params.fields.len() {
            self.set_field(next, reports);
        } else {
            self.complete_fraction(reports);
        }
    }

    fn complete_fraction(&mut self, reports: &mut Vec<String>) {
        reports.push(format!(
            "第{}回の照射が完了しました (累積線量 {:.1}%)。",
            self.fraction, self.accumulated_dose
        ));
        if self.fraction < self.params.fractions {
            self.phase = DeliveryPhase::FractionPause {
                remaining_s: FRACTION_PAUSE_SECONDS,
            };
        } else {
            self.running = false;
            self.beam_on = false;
            self.phase = DeliveryPhase::Finished;
            reports.push(format!(
                "全{}回の治療計画が完了しました。最終累積線量は {:.1}% です。",
                self.params.fractions, self.accumulated_dose
            ));
        }
    }

    pub fn set_technique(&mut self, technique: Technique) {
        self.technique = technique;
        self.params = technique.params();
        self.mlc = default_mlc_bank(technique);
        self.reset();
    }

    pub fn set_tumor_shape(&mut self, shape: TumorShape) {
        self.tumor_shape = shape;
    }

    pub fn set_beam_energy(&mut self, mev: f64) -> Result<()> {
        ensure!(mev.is_finite(), "ビームエネルギーが不正です");
        ensure!(
            (MIN_BEAM_ENERGY_MEV..=MAX_BEAM_ENERGY_MEV).contains(&mev),
            "ビームエネルギーは{}〜{} MeVの範囲で指定してください",
            MIN_BEAM_ENERGY_MEV,
            MAX_BEAM_ENERGY_MEV
        );
        self.beam_energy_mev = mev;
        Ok(())
    }

    pub fn set_beam_width(&mut self, mm: f64) -> Result<()> {
        ensure!(mm.is_finite(), "ビーム幅が不正です");
        ensure!(
            (MIN_BEAM_WIDTH_MM..=MAX_BEAM_WIDTH_MM).contains(&mm),
            "ビーム幅は{}〜{} mmの範囲で指定してください",
            MIN_BEAM_WIDTH_MM,
            MAX_BEAM_WIDTH_MM
        );
        self.beam_width_mm = mm;
        Ok(())
    }

    pub fn set_mlc_type(&mut self, mlc_type: MlcType) -> Result<()> {
        let available = MlcType::available_for(self.technique);
        ensure!(
            available.contains(&mlc_type),
            "{} では {} を利用できません",
            self.technique.label(),
            mlc_type.label()
        );
        match &mut self.mlc {
            Some(bank) => bank.set_type(mlc_type),
            None => self.mlc = Some(MlcBank::new(mlc_type)),
        }
        Ok(())
    }

    pub fn adjust_mlc_leaves(&mut self, value: f64) -> Result<()> {
        ensure!(value.is_finite(), "MLC リーフの移動量が不正です");
        ensure!(
            (-LEAF_TRAVEL_LIMIT..=LEAF_TRAVEL_LIMIT).contains(&value),
            "MLC リーフの移動量は-{}〜{}の範囲で指定してください",
            LEAF_TRAVEL_LIMIT,
            LEAF_TRAVEL_LIMIT
        );
        let bank = self
            .mlc
            .as_mut()
            .ok_or_else(|| anyhow!("{} では MLC を利用できません", self.technique.label()))?;
        bank.adjust_all(value);
        Ok(())
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            technique: self.technique,
            gantry_angle: self.current_angle,
            field_label: self.current_field_label(),
            accumulated_dose: self.accumulated_dose,
            fraction: self.fraction,
            total_fractions: self.params.fractions,
            beam_on: self.beam_on,
            running: self.running,
            paused: self.paused,
            finished: self.is_finished(),
        }
    }

    fn current_field_label(&self) -> String {
        if matches!(self.phase, DeliveryPhase::Arc { .. }) {
            return "回転照射中".to_string();
        }
        match self.current_field {
            Some(angle) => field_label(angle),
            None => "-".to_string(),
        }
    }

    /// 1 セッションあたりの推定治療時間 (分)。表示専用。
    pub fn estimated_minutes(&mut self) -> f64 {
        self.technique.estimated_minutes(&mut self.rng)
    }

    pub fn dose_grid(&self, width: usize, height: usize) -> DoseGrid {
        DoseGrid::synthesize(self.technique, width, height)
    }

    pub fn isodose_contours(&self, levels: &[f64]) -> Vec<Vec<crate::anatomy::Point>> {
        isodose_contours(self.technique, levels)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            technique: self.technique,
            tumor_shape: self.tumor_shape,
            beam_energy_mev: self.beam_energy_mev,
            beam_width_mm: self.beam_width_mm,
            mlc_type: self.mlc.as_ref().map(|bank| bank.mlc_type()),
            mlc_positions: self
                .mlc
                .as_ref()
                .map(|bank| bank.pairs().to_vec())
                .unwrap_or_default(),
            current_angle: self.current_angle,
            target_angle: self.target_angle,
            current_field: self.current_field,
            field_index: self.field_index,
            fraction: self.fraction,
            accumulated_dose: self.accumulated_dose,
            beam_on: self.beam_on,
            running: self.running,
            paused: self.paused,
            phase: self.phase,
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self> {
        Self::from_snapshot_with_rng(snapshot, StdRng::from_entropy())
    }

    pub fn from_snapshot_with_rng(snapshot: SessionSnapshot, rng: StdRng) -> Result<Self> {
        let config = SessionConfig {
            technique: snapshot.technique,
            tumor_shape: snapshot.tumor_shape,
            beam_energy_mev: snapshot.beam_energy_mev,
            beam_width_mm: snapshot.beam_width_mm,
        };
        let mut session = Self::with_rng(config, rng)?;
        let params = &session.params;
        ensure!(
            snapshot.field_index < params.fields.len(),
            "スナップショットの照射野番号が不正です: {}",
            snapshot.field_index
        );
        ensure!(
            snapshot.fraction >= 1 && snapshot.fraction <= params.fractions,
            "スナップショットの分割回数が不正です: {}",
            snapshot.fraction
        );
        ensure!(
            (0.0..=100.0).contains(&snapshot.accumulated_dose),
            "スナップショットの累積線量が不正です: {}",
            snapshot.accumulated_dose
        );

        if let Some(mlc_type) = snapshot.mlc_type {
            session.set_mlc_type(mlc_type)?;
            if let Some(bank) = session.mlc.as_mut() {
                bank.restore_positions(snapshot.mlc_positions);
            }
        }

        session.current_angle = geometry::normalize_deg(snapshot.current_angle);
        session.target_angle = geometry::normalize_deg(snapshot.target_angle);
        session.current_field = snapshot.current_field;
        session.field_index = snapshot.field_index;
        session.fraction = snapshot.fraction;
        session.accumulated_dose = snapshot.accumulated_dose;
        session.beam_on = snapshot.beam_on;
        session.running = snapshot.running;
        session.paused = snapshot.paused;
        session.phase = snapshot.phase;
        Ok(session)
    }
}

fn default_mlc_bank(technique: Technique) -> Option<MlcBank> {
    MlcType::available_for(technique)
        .first()
        .map(|mlc_type| MlcBank::new(*mlc_type))
}

/// 基本方向の照射野名。それ以外は角度表記。
pub fn field_label(angle: u16) -> String {
    match angle {
        0 => "前方 (0°)".to_string(),
        90 => "右側方 (90°)".to_string(),
        180 => "後方 (180°)".to_string(),
        270 => "左側方 (270°)".to_string(),
        other => format!("{other}°"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_for(technique: Technique) -> TreatmentSession {
        let config = SessionConfig {
            technique,
            ..SessionConfig::default()
        };
        TreatmentSession::with_seed(config, 1).unwrap()
    }

    #[test]
    fn advance_is_a_noop_before_start() {
        let mut session = session_for(Technique::TwoD);
        let reports = session.advance(10.0).unwrap();
        assert!(reports.is_empty());
        assert_eq!(session.accumulated_dose(), 0.0);
        assert_eq!(session.phase(), DeliveryPhase::Idle);
    }

    #[test]
    fn advance_rejects_nonpositive_time() {
        let mut session = session_for(Technique::TwoD);
        assert!(session.advance(0.0).is_err());
        assert!(session.advance(-1.0).is_err());
        assert!(session.advance(f64::NAN).is_err());
    }

    #[test]
    fn beam_turns_on_at_the_first_field_and_accumulates() {
        let mut session = session_for(Technique::TwoD);
        session.start().unwrap();
        // 最初の照射野は 0° なので回転なしで照射に入る
        session.advance(1.0).unwrap();
        assert!(session.beam_on());
        let expected = session.params().dose_per_field() / BEAM_DWELL_SECONDS;
        assert!((session.accumulated_dose() - expected).abs() < 1e-9);
    }

    #[test]
    fn rotation_moves_at_fixed_speed_toward_the_next_field() {
        let mut session = session_for(Technique::ThreeD);
        session.start().unwrap();
        // 0° での照射 (2 秒) を終えて 72° へ回転開始
        session.advance(2.0).unwrap();
        assert!(!session.beam_on());
        session.advance(0.5).unwrap();
        assert!((session.current_angle() - ROTATION_DEG_PER_SEC * 0.5).abs() < 1e-9);
    }

    #[test]
    fn full_course_finishes_at_exactly_one_hundred_percent() {
        let mut session = session_for(Technique::TwoD);
        session.start().unwrap();
        session.advance(1000.0).unwrap();
        assert!(session.is_finished());
        assert!(!session.is_running());
        assert!(!session.beam_on());
        assert!((session.accumulated_dose() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn srs_delivers_its_single_fraction() {
        let mut session = session_for(Technique::Srs);
        session.start().unwrap();
        let reports = session.advance(300.0).unwrap();
        assert!(session.is_finished());
        assert!((session.accumulated_dose() - 100.0).abs() < 1e-6);
        assert!(reports.iter().any(|r| r.contains("治療計画が完了")));
    }

    #[test]
    fn vmat_accrues_dose_per_degree_of_arc() {
        let mut session = session_for(Technique::Vmat);
        session.start().unwrap();
        session.advance(1.0).unwrap();
        assert!(session.beam_on());
        assert!((session.current_angle() - ROTATION_DEG_PER_SEC).abs() < 1e-9);
        let expected = ROTATION_DEG_PER_SEC * 100.0 / (30.0 * 360.0);
        assert!((session.accumulated_dose() - expected).abs() < 1e-9);
    }

    #[test]
    fn vmat_fraction_ends_after_a_full_arc() {
        let mut session = session_for(Technique::Vmat);
        session.start().unwrap();
        let arc_seconds = 360.0 / ROTATION_DEG_PER_SEC;
        let reports = session.advance(arc_seconds).unwrap();
        assert!(!session.beam_on());
        assert!(reports.iter().any(|r| r.contains("第1回の照射が完了")));
        assert!(matches!(
            session.phase(),
            DeliveryPhase::FractionPause { .. }
        ));
    }

    #[test]
    fn pause_freezes_every_part_of_the_state() {
        let mut session = session_for(Technique::TwoD);
        session.start().unwrap();
        session.advance(1.0).unwrap();
        session.pause().unwrap();

        let angle = session.current_angle();
        let dose = session.accumulated_dose();
        let phase = session.phase();
        let reports = session.advance(30.0).unwrap();
        assert!(reports.is_empty());
        assert_eq!(session.current_angle(), angle);
        assert_eq!(session.accumulated_dose(), dose);
        assert_eq!(session.phase(), phase);

        session.resume().unwrap();
        session.advance(1.0).unwrap();
        assert!(session.accumulated_dose() > dose);
    }

    #[test]
    fn pause_mid_rotation_resumes_along_the_same_arc() {
        let mut session = session_for(Technique::ThreeD);
        session.start().unwrap();
        session.advance(2.5).unwrap();
        let mid_angle = session.current_angle();
        assert!(mid_angle > 0.0 && mid_angle < 72.0);

        session.pause().unwrap();
        session.advance(10.0).unwrap();
        assert_eq!(session.current_angle(), mid_angle);

        session.resume().unwrap();
        session.advance(0.2).unwrap();
        let moved = geometry::remaining_arc_deg(session.current_angle(), 72.0);
        assert!(moved < geometry::remaining_arc_deg(mid_angle, 72.0));
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut session = session_for(Technique::TwoD);
        session.start().unwrap();
        assert!(session.start().is_err());
    }

    #[test]
    fn toggle_cycles_start_pause_resume() {
        let mut session = session_for(Technique::TwoD);
        session.toggle().unwrap();
        assert!(session.is_running() && !session.is_paused());
        session.toggle().unwrap();
        assert!(session.is_paused());
        session.toggle().unwrap();
        assert!(!session.is_paused());
    }

    #[test]
    fn changing_technique_resets_the_course() {
        let mut session = session_for(Technique::TwoD);
        session.start().unwrap();
        session.advance(5.0).unwrap();
        assert!(session.accumulated_dose() > 0.0);

        session.set_technique(Technique::Srs);
        assert_eq!(session.accumulated_dose(), 0.0);
        assert_eq!(session.phase(), DeliveryPhase::Idle);
        assert!(!session.is_running());
        assert_eq!(session.mlc().unwrap().mlc_type(), MlcType::Micro);
    }

    #[test]
    fn beam_parameters_are_validated() {
        let mut session = session_for(Technique::TwoD);
        assert!(session.set_beam_energy(0.0).is_err());
        assert!(session.set_beam_energy(21.0).is_err());
        session.set_beam_energy(15.0).unwrap();
        assert_eq!(session.beam_energy_mev(), 15.0);

        assert!(session.set_beam_width(10.0).is_err());
        session.set_beam_width(120.0).unwrap();
        assert_eq!(session.beam_width_mm(), 120.0);
    }

    #[test]
    fn mlc_operations_respect_technique_capabilities() {
        let mut session = session_for(Technique::TwoD);
        assert!(session.mlc().is_none());
        assert!(session.set_mlc_type(MlcType::Standard).is_err());
        assert!(session.adjust_mlc_leaves(5.0).is_err());

        let mut session = session_for(Technique::Imrt);
        session.set_mlc_type(MlcType::Hd).unwrap();
        session.adjust_mlc_leaves(-10.0).unwrap();
        let bank = session.mlc().unwrap();
        assert_eq!(bank.mlc_type(), MlcType::Hd);
        assert!(bank.pairs().iter().all(|pair| pair.left == -10.0));
        assert!(session.set_mlc_type(MlcType::Micro).is_err());
    }

    #[test]
    fn snapshot_round_trips_mid_beam() {
        let mut session = session_for(Technique::TwoD);
        session.start().unwrap();
        session.advance(1.0).unwrap();
        assert!(session.beam_on());

        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored =
            TreatmentSession::from_snapshot_with_rng(snapshot, StdRng::seed_from_u64(2)).unwrap();

        assert!(restored.beam_on());
        assert!(restored.is_running());
        assert_eq!(restored.current_angle(), session.current_angle());
        assert!((restored.accumulated_dose() - session.accumulated_dose()).abs() < 1e-12);

        // 残り 1 秒の照射を終えると次の照射野へ回転を始める
        restored.advance(1.0).unwrap();
        assert!(!restored.beam_on());
        assert_eq!(restored.phase(), DeliveryPhase::Rotating);
        let expected = restored.params().dose_per_field();
        assert!((restored.accumulated_dose() - expected).abs() < 1e-9);
    }

    #[test]
    fn snapshot_with_corrupt_fields_is_rejected() {
        let session = session_for(Technique::TwoD);
        let mut snapshot = session.snapshot();
        snapshot.field_index = 99;
        assert!(TreatmentSession::from_snapshot(snapshot).is_err());

        let mut snapshot = session.snapshot();
        snapshot.accumulated_dose = 140.0;
        assert!(TreatmentSession::from_snapshot(snapshot).is_err());

        let mut snapshot = session.snapshot();
        snapshot.fraction = 0;
        assert!(TreatmentSession::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn status_report_tracks_the_field_label() {
        let mut session = session_for(Technique::TwoD);
        assert_eq!(session.status().field_label, "-");
        session.start().unwrap();
        assert_eq!(session.status().field_label, "前方 (0°)");
        // 0° 照射後、後方 180° へ
        session.advance(2.5).unwrap();
        assert_eq!(session.status().field_label, "後方 (180°)");

        let mut session = session_for(Technique::Vmat);
        session.start().unwrap();
        assert_eq!(session.status().field_label, "回転照射中");
    }
}
