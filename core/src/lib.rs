mod anatomy;
mod dose;
mod geometry;
mod mlc;
mod reference;
mod session;
mod technique;

pub use anatomy::{
    EllipseSpec, Point, RectSpec, SCENE_HEIGHT, SCENE_WIDTH, STRUCTURES, Scene, Structures,
    TumorShape, scene_for, tumor_position, tumor_radius,
};
pub use dose::{
    DEFAULT_ISODOSE_LEVELS, DoseGrid, color_for_dose, dose_at, dose_at_point, isodose_contours,
};
pub use geometry::{GANTRY_RADIUS, beam_origin, normalize_deg, remaining_arc_deg, step_toward};
pub use mlc::{LEAF_TRAVEL_LIMIT, LeafPair, MlcBank, MlcCharacteristics, MlcType};
pub use reference::{ClinicalNotes, TechnicalNotes, clinical_notes, technical_notes};
pub use session::{
    BEAM_DWELL_SECONDS, DeliveryPhase, FRACTION_PAUSE_SECONDS, ROTATION_DEG_PER_SEC, SessionConfig,
    SessionSnapshot, StatusReport, TreatmentSession, field_label,
};
pub use technique::{BeamShape, MlcSpec, Technique, TechniqueParams};
