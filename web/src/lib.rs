#![cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]

use std::cell::RefCell;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::rc::Rc;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::atomic::{AtomicU64, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rtsim_core::{
    BeamShape, DEFAULT_ISODOSE_LEVELS, GANTRY_RADIUS, Point, SCENE_HEIGHT, SCENE_WIDTH, STRUCTURES,
    Scene, SessionConfig, Technique, TreatmentSession, TumorShape, clinical_notes, scene_for,
    technical_notes, tumor_position, tumor_radius,
};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{
    CanvasRenderingContext2d, Document, Event, HtmlButtonElement, HtmlCanvasElement,
    HtmlInputElement, HtmlSelectElement, ImageData, KeyboardEvent, Window,
};

const CANVAS_BG: &str = "#f8fafc";
const SKIN_COLOR: &str = "#f4d3a3";
const OUTLINE_COLOR: &str = "#8b4513";
const BONE_COLOR: &str = "#e0e0e0";
const BONE_EDGE_COLOR: &str = "#a9a9a9";
const LUNG_COLOR: &str = "#ffc0cb";
const ORGAN_COLOR: &str = "#ff6347";
const TUMOR_FILL: &str = "#ff4136";
const TUMOR_STROKE: &str = "#85144b";
const GANTRY_COLOR: &str = "#808080";
const MLC_BASE_COLOR: &str = "#606060";
const MLC_LEAF_COLOR: &str = "#404040";
const BEAM_EDGE: &str = "rgba(255, 255, 255, 0.5)";
const BEAM_CENTERLINE: &str = "rgba(255, 255, 0, 0.5)";
const ISODOSE_LINE: &str = "rgba(255, 255, 255, 0.7)";

const MAX_DT: f64 = 0.25;
const MODULATED_SEGMENTS: usize = 7;
const STORAGE_KEY: &str = "rtsim-session-state";

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    bootstrap()
}

fn bootstrap() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("window unavailable"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("document unavailable"))?;
    let canvas = resolve_canvas(&document)?;
    let context = canvas_context(&canvas)?;

    let runtime = Rc::new(RefCell::new(AppRuntime::new(
        canvas.width() as f64,
        canvas.height() as f64,
    )?));
    register_ui(&document, Rc::clone(&runtime))?;
    sync_controls(&document, &mut runtime.borrow_mut())?;

    start_animation_loop(window, document, context, runtime);
    Ok(())
}

fn resolve_canvas(document: &Document) -> Result<HtmlCanvasElement, JsValue> {
    document
        .get_element_by_id("simulation-canvas")
        .ok_or_else(|| JsValue::from_str("canvas element with id 'simulation-canvas' not found"))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| JsValue::from_str("failed to cast element to HtmlCanvasElement"))
}

fn canvas_context(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, JsValue> {
    canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("failed to get 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| JsValue::from_str("failed to cast context to CanvasRenderingContext2d"))
}

fn cast_element<T>(document: &Document, id: &str) -> Result<T, JsValue>
where
    T: JsCast,
{
    document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("element '{}' not found", id)))?
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("failed to cast element '{}'", id)))
}

fn update_text(document: &Document, id: &str, text: &str) -> Result<(), JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("element '{}' not found", id)))?;
    if element.text_content().as_deref() != Some(text) {
        element.set_text_content(Some(text));
    }
    Ok(())
}

fn set_bar_width(document: &Document, id: &str, percent: u8) -> Result<(), JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("element '{}' not found", id)))?;
    element.set_attribute("style", &format!("width: {percent}%;"))
}

fn seeded_rng() -> StdRng {
    let seed = (random_unit() * (1u64 << 53) as f64) as u64;
    StdRng::seed_from_u64(seed)
}

struct DoseLayer {
    technique: Technique,
    canvas: HtmlCanvasElement,
}

struct AppRuntime {
    session: TreatmentSession,
    renderer: Renderer,
    dose_layer: Option<DoseLayer>,
    show_dose: bool,
    last_frame_time: Option<f64>,
}

impl AppRuntime {
    fn new(width: f64, height: f64) -> Result<Self, JsValue> {
        let session = TreatmentSession::with_rng(SessionConfig::default(), seeded_rng())
            .map_err(|error| JsValue::from_str(&format!("failed to build session: {error}")))?;
        Ok(Self {
            session,
            renderer: Renderer::new(width, height),
            dose_layer: None,
            show_dose: false,
            last_frame_time: None,
        })
    }

    fn tick(
        &mut self,
        timestamp: f64,
        context: &CanvasRenderingContext2d,
        document: &Document,
    ) -> Result<(), JsValue> {
        let dt = if let Some(last) = self.last_frame_time {
            ((timestamp - last) / 1000.0).min(MAX_DT)
        } else {
            0.0
        };
        self.last_frame_time = Some(timestamp);

        if dt > 0.0 && self.session.is_running() && !self.session.is_paused() {
            self.session
                .advance(dt)
                .map_err(|error| JsValue::from_str(&format!("simulation tick failed: {error}")))?;
        }

        if self.show_dose {
            self.ensure_dose_layer(document)?;
        }
        let dose_layer = if self.show_dose {
            self.dose_layer.as_ref()
        } else {
            None
        };
        self.renderer.draw(context, &self.session, dose_layer)?;
        sync_info(document, &self.session)
    }

    fn ensure_dose_layer(&mut self, document: &Document) -> Result<(), JsValue> {
        let technique = self.session.technique();
        if self
            .dose_layer
            .as_ref()
            .map(|layer| layer.technique != technique)
            .unwrap_or(true)
        {
            self.dose_layer = Some(build_dose_layer(document, &self.session)?);
        }
        Ok(())
    }
}

fn build_dose_layer(
    document: &Document,
    session: &TreatmentSession,
) -> Result<DoseLayer, JsValue> {
    let canvas: HtmlCanvasElement = document
        .create_element("canvas")?
        .dyn_into()
        .map_err(|_| JsValue::from_str("failed to create dose layer canvas"))?;
    canvas.set_width(SCENE_WIDTH as u32);
    canvas.set_height(SCENE_HEIGHT as u32);
    let context = canvas_context(&canvas)?;

    let grid = session.dose_grid(SCENE_WIDTH as usize, SCENE_HEIGHT as usize);
    let rgba = grid.to_rgba();
    let image = ImageData::new_with_u8_clamped_array_and_sh(
        Clamped(rgba.as_slice()),
        grid.width() as u32,
        grid.height() as u32,
    )?;
    context.put_image_data(&image, 0.0, 0.0)?;

    context.set_stroke_style_str(ISODOSE_LINE);
    context.set_line_width(1.0);
    for contour in session.isodose_contours(&DEFAULT_ISODOSE_LEVELS) {
        context.begin_path();
        for (index, point) in contour.iter().enumerate() {
            if index == 0 {
                context.move_to(point.x, point.y);
            } else {
                context.line_to(point.x, point.y);
            }
        }
        context.close_path();
        context.stroke();
    }

    Ok(DoseLayer {
        technique: session.technique(),
        canvas,
    })
}

fn start_animation_loop(
    window: Window,
    document: Document,
    context: CanvasRenderingContext2d,
    runtime: Rc<RefCell<AppRuntime>>,
) {
    let context = Rc::new(context);
    let animation_handle = Rc::new(RefCell::new(None::<Closure<dyn FnMut(f64)>>));
    let animation_for_assignment = Rc::clone(&animation_handle);
    let animation_for_request = Rc::clone(&animation_handle);
    let runtime_for_tick = Rc::clone(&runtime);
    let context_for_tick = Rc::clone(&context);
    let window_for_tick = window.clone();

    *animation_for_assignment.borrow_mut() = Some(Closure::wrap(Box::new(move |timestamp: f64| {
        {
            let mut runtime = runtime_for_tick.borrow_mut();
            runtime
                .tick(timestamp, context_for_tick.as_ref(), &document)
                .expect("failed to render frame");
        }
        let _ = window_for_tick.request_animation_frame(
            animation_for_request
                .borrow()
                .as_ref()
                .expect("animation frame callback missing")
                .as_ref()
                .unchecked_ref(),
        );
    }) as Box<dyn FnMut(f64)>));

    let _ = window.request_animation_frame(
        animation_handle
            .borrow()
            .as_ref()
            .expect("animation frame callback missing")
            .as_ref()
            .unchecked_ref(),
    );

    std::mem::forget(animation_handle);
}

fn register_ui(document: &Document, runtime: Rc<RefCell<AppRuntime>>) -> Result<(), JsValue> {
    let technique_select: HtmlSelectElement = cast_element(document, "treatment-technique")?;
    let shape_select: HtmlSelectElement = cast_element(document, "tumor-shape")?;
    let mlc_select: HtmlSelectElement = cast_element(document, "mlc-type")?;
    let energy_slider: HtmlInputElement = cast_element(document, "beam-energy")?;
    let width_slider: HtmlInputElement = cast_element(document, "beam-width")?;
    let mlc_slider: HtmlInputElement = cast_element(document, "mlc-adjust")?;
    let show_dose_checkbox: HtmlInputElement = cast_element(document, "show-dose")?;
    let control_button: HtmlButtonElement = cast_element(document, "treatment-control")?;
    let reset_button: HtmlButtonElement = cast_element(document, "reset-button")?;
    let save_button: HtmlButtonElement = cast_element(document, "save-state")?;
    let load_button: HtmlButtonElement = cast_element(document, "load-state")?;

    attach_select_handler(
        document.clone(),
        Rc::clone(&runtime),
        technique_select,
        |runtime, document, key| {
            let technique = Technique::from_key(key)
                .ok_or_else(|| JsValue::from_str(&format!("unsupported technique '{key}'")))?;
            runtime.session.set_technique(technique);
            runtime.dose_layer = None;
            sync_controls(document, runtime)
        },
    );

    attach_select_handler(
        document.clone(),
        Rc::clone(&runtime),
        shape_select,
        |runtime, _document, key| {
            let shape = TumorShape::from_key(key)
                .ok_or_else(|| JsValue::from_str(&format!("unsupported tumor shape '{key}'")))?;
            runtime.session.set_tumor_shape(shape);
            Ok(())
        },
    );

    attach_select_handler(
        document.clone(),
        Rc::clone(&runtime),
        mlc_select,
        |runtime, _document, key| {
            let mlc_type = rtsim_core::MlcType::from_key(key)
                .ok_or_else(|| JsValue::from_str(&format!("unsupported MLC type '{key}'")))?;
            runtime
                .session
                .set_mlc_type(mlc_type)
                .map_err(|error| JsValue::from_str(&format!("{error}")))
        },
    );

    attach_slider_handler(
        document.clone(),
        Rc::clone(&runtime),
        energy_slider,
        "beam-energy-value",
        |runtime, value| {
            runtime
                .session
                .set_beam_energy(value)
                .map_err(|error| JsValue::from_str(&format!("{error}")))
        },
        |value| format!("{value:.0} MeV"),
    );

    attach_slider_handler(
        document.clone(),
        Rc::clone(&runtime),
        width_slider,
        "beam-width-value",
        |runtime, value| {
            runtime
                .session
                .set_beam_width(value)
                .map_err(|error| JsValue::from_str(&format!("{error}")))
        },
        |value| format!("{value:.0} mm"),
    );

    attach_slider_handler(
        document.clone(),
        Rc::clone(&runtime),
        mlc_slider,
        "mlc-adjust-value",
        |runtime, value| {
            runtime
                .session
                .adjust_mlc_leaves(value)
                .map_err(|error| JsValue::from_str(&format!("{error}")))
        },
        |value| format!("{value:.0}"),
    );

    {
        let runtime = Rc::clone(&runtime);
        let checkbox = show_dose_checkbox.clone();
        let closure = Closure::wrap(Box::new(move |_event: Event| {
            runtime.borrow_mut().show_dose = checkbox.checked();
        }) as Box<dyn FnMut(Event)>);
        show_dose_checkbox
            .add_event_listener_with_callback("change", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    attach_click_handler(
        document.clone(),
        Rc::clone(&runtime),
        control_button,
        |runtime, _document| {
            runtime
                .session
                .toggle()
                .map(|_| ())
                .map_err(|error| JsValue::from_str(&format!("{error}")))
        },
    );

    attach_click_handler(
        document.clone(),
        Rc::clone(&runtime),
        reset_button,
        |runtime, _document| {
            runtime.session.reset();
            Ok(())
        },
    );

    attach_click_handler(
        document.clone(),
        Rc::clone(&runtime),
        save_button,
        |runtime, _document| save_state(runtime),
    );

    attach_click_handler(
        document.clone(),
        Rc::clone(&runtime),
        load_button,
        |runtime, document| load_state(runtime, document),
    );

    register_shortcuts(document, runtime)?;

    Ok(())
}

fn attach_select_handler<F>(
    document: Document,
    runtime: Rc<RefCell<AppRuntime>>,
    select: HtmlSelectElement,
    apply: F,
) where
    F: Fn(&mut AppRuntime, &Document, &str) -> Result<(), JsValue> + 'static,
{
    let select_clone = select.clone();
    let closure = Closure::wrap(Box::new(move |_event: Event| {
        let key = select_clone.value();
        let mut runtime_ref = runtime.borrow_mut();
        if apply(&mut runtime_ref, &document, &key).is_err() {
            // 不正な選択は現在の状態に巻き戻す
            let _ = sync_controls(&document, &mut runtime_ref);
        }
    }) as Box<dyn FnMut(Event)>);

    select
        .add_event_listener_with_callback("change", closure.as_ref().unchecked_ref())
        .expect("failed to add select change listener");
    closure.forget();
}

fn attach_slider_handler<F, L>(
    document: Document,
    runtime: Rc<RefCell<AppRuntime>>,
    slider: HtmlInputElement,
    label_id: &str,
    apply: F,
    label_text: L,
) where
    F: Fn(&mut AppRuntime, f64) -> Result<(), JsValue> + 'static,
    L: Fn(f64) -> String + 'static,
{
    let label_id = label_id.to_string();
    let slider_clone = slider.clone();
    let closure = Closure::wrap(Box::new(move |_event: Event| {
        let value = slider_clone
            .value()
            .parse::<f64>()
            .expect("failed to parse slider value to f64");
        {
            let mut runtime_ref = runtime.borrow_mut();
            if apply(&mut runtime_ref, value).is_err() {
                return;
            }
        }
        let text = label_text(value);
        if let Some(element) = document.get_element_by_id(&label_id) {
            element.set_text_content(Some(&text));
        }
    }) as Box<dyn FnMut(Event)>);

    slider
        .add_event_listener_with_callback("input", closure.as_ref().unchecked_ref())
        .expect("failed to add slider event listener");
    closure.forget();
}

fn attach_click_handler<F>(
    document: Document,
    runtime: Rc<RefCell<AppRuntime>>,
    button: HtmlButtonElement,
    apply: F,
) where
    F: Fn(&mut AppRuntime, &Document) -> Result<(), JsValue> + 'static,
{
    let closure = Closure::wrap(Box::new(move |_event: Event| {
        let mut runtime_ref = runtime.borrow_mut();
        let _ = apply(&mut runtime_ref, &document);
    }) as Box<dyn FnMut(Event)>);

    button
        .add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())
        .expect("failed to add button click listener");
    closure.forget();
}

fn register_shortcuts(document: &Document, runtime: Rc<RefCell<AppRuntime>>) -> Result<(), JsValue> {
    let document_clone = document.clone();
    let closure = Closure::wrap(Box::new(move |event: KeyboardEvent| {
        let mut runtime_ref = runtime.borrow_mut();
        match event.key().as_str() {
            " " => {
                let _ = runtime_ref.session.toggle();
                event.prevent_default();
            }
            "r" => runtime_ref.session.reset(),
            "d" => {
                runtime_ref.show_dose = !runtime_ref.show_dose;
                if let Ok(checkbox) =
                    cast_element::<HtmlInputElement>(&document_clone, "show-dose")
                {
                    checkbox.set_checked(runtime_ref.show_dose);
                }
            }
            _ => {}
        }
    }) as Box<dyn FnMut(KeyboardEvent)>);

    document.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

fn save_state(runtime: &AppRuntime) -> Result<(), JsValue> {
    let json = serde_json::to_string(&runtime.session.snapshot())
        .map_err(|error| JsValue::from_str(&format!("failed to serialize snapshot: {error}")))?;
    local_storage()?.set_item(STORAGE_KEY, &json)
}

fn load_state(runtime: &mut AppRuntime, document: &Document) -> Result<(), JsValue> {
    let Some(json) = local_storage()?.get_item(STORAGE_KEY)? else {
        return Ok(());
    };
    let snapshot = serde_json::from_str(&json)
        .map_err(|error| JsValue::from_str(&format!("failed to parse snapshot: {error}")))?;
    let session = TreatmentSession::from_snapshot_with_rng(snapshot, seeded_rng())
        .map_err(|error| JsValue::from_str(&format!("failed to restore snapshot: {error}")))?;
    runtime.session = session;
    runtime.dose_layer = None;
    sync_controls(document, runtime)
}

fn local_storage() -> Result<web_sys::Storage, JsValue> {
    web_sys::window()
        .ok_or_else(|| JsValue::from_str("window unavailable"))?
        .local_storage()?
        .ok_or_else(|| JsValue::from_str("local storage unavailable"))
}

fn sync_controls(document: &Document, runtime: &mut AppRuntime) -> Result<(), JsValue> {
    let minutes = runtime.session.estimated_minutes();
    let session = &runtime.session;
    let technique = session.technique();

    let technique_select: HtmlSelectElement = cast_element(document, "treatment-technique")?;
    technique_select.set_value(technique.value_key());
    let shape_select: HtmlSelectElement = cast_element(document, "tumor-shape")?;
    shape_select.set_value(session.tumor_shape().value_key());

    let energy_slider: HtmlInputElement = cast_element(document, "beam-energy")?;
    energy_slider.set_value(&format!("{:.0}", session.beam_energy_mev()));
    update_text(
        document,
        "beam-energy-value",
        &format!("{:.0} MeV", session.beam_energy_mev()),
    )?;
    let width_slider: HtmlInputElement = cast_element(document, "beam-width")?;
    width_slider.set_value(&format!("{:.0}", session.beam_width_mm()));
    update_text(
        document,
        "beam-width-value",
        &format!("{:.0} mm", session.beam_width_mm()),
    )?;

    let show_dose_checkbox: HtmlInputElement = cast_element(document, "show-dose")?;
    show_dose_checkbox.set_checked(runtime.show_dose);

    let params = session.params();
    set_bar_width(document, "precision-bar-fill", params.precision)?;
    set_bar_width(document, "protection-bar-fill", params.tissue_protection)?;
    update_text(document, "margin-value", &format!("{} mm", params.margin_mm))?;
    update_text(document, "fractions-value", &format!("{}", params.fractions))?;
    update_text(document, "treatment-time", &format!("{minutes:.1} 分"))?;

    let mlc_select: HtmlSelectElement = cast_element(document, "mlc-type")?;
    let mlc_slider: HtmlInputElement = cast_element(document, "mlc-adjust")?;
    match session.mlc() {
        Some(bank) => {
            mlc_select.set_disabled(false);
            mlc_slider.set_disabled(false);
            mlc_select.set_value(bank.mlc_type().value_key());
        }
        None => {
            mlc_select.set_disabled(true);
            mlc_slider.set_disabled(true);
        }
    }
    mlc_slider.set_value("0");
    update_text(document, "mlc-adjust-value", "0")?;

    set_reference_panel(
        document,
        "clinical-data",
        &clinical_notes(technique).rows(),
    )?;
    set_reference_panel(
        document,
        "technical-data",
        &technical_notes(technique).rows(),
    )?;

    Ok(())
}

fn set_reference_panel(
    document: &Document,
    id: &str,
    rows: &[(&str, &str)],
) -> Result<(), JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("element '{}' not found", id)))?;
    let mut html = String::new();
    for (label, value) in rows {
        html.push_str(&format!("<p><strong>{label}:</strong> {value}</p>"));
    }
    element.set_inner_html(&html);
    Ok(())
}

fn sync_info(document: &Document, session: &TreatmentSession) -> Result<(), JsValue> {
    let status = session.status();

    update_text(
        document,
        "gantry-angle",
        &format!("{:.0}°", status.gantry_angle),
    )?;
    update_text(document, "current-field", &status.field_label)?;
    update_text(
        document,
        "accumulated-dose",
        &format!("{:.1}%", status.accumulated_dose),
    )?;
    update_text(
        document,
        "fraction-number",
        &format!("{}/{}", status.fraction, status.total_fractions),
    )?;
    update_text(document, "technique-info", status.technique.label())?;

    let beam_status = document
        .get_element_by_id("beam-status")
        .ok_or_else(|| JsValue::from_str("element 'beam-status' not found"))?;
    let beam_text = if status.beam_on {
        "照射中"
    } else {
        "停止中"
    };
    if beam_status.text_content().as_deref() != Some(beam_text) {
        beam_status.set_text_content(Some(beam_text));
    }
    beam_status
        .class_list()
        .toggle_with_force("active", status.beam_on)?;

    let control_button: HtmlButtonElement = cast_element(document, "treatment-control")?;
    let control_label = if !status.running {
        "治療開始"
    } else if status.paused {
        "治療再開"
    } else {
        "一時停止"
    };
    if control_button.text_content().as_deref() != Some(control_label) {
        control_button.set_text_content(Some(control_label));
    }
    control_button
        .class_list()
        .toggle_with_force("active", status.running && !status.paused)?;

    Ok(())
}

struct Renderer {
    width: f64,
    height: f64,
}

impl Renderer {
    fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn draw(
        &self,
        context: &CanvasRenderingContext2d,
        session: &TreatmentSession,
        dose_layer: Option<&DoseLayer>,
    ) -> Result<(), JsValue> {
        context.set_fill_style_str(CANVAS_BG);
        context.fill_rect(0.0, 0.0, self.width, self.height);

        self.draw_anatomy(context, session)?;

        if let Some(layer) = dose_layer {
            let alpha = (session.accumulated_dose() / 100.0).clamp(0.0, 1.0);
            context.set_global_alpha(alpha);
            context.draw_image_with_html_canvas_element(&layer.canvas, 0.0, 0.0)?;
            context.set_global_alpha(1.0);
        }

        self.draw_gantry(context, session)?;

        if session.beam_on() {
            self.draw_beam(context, session)?;
        }

        Ok(())
    }

    fn draw_anatomy(
        &self,
        context: &CanvasRenderingContext2d,
        session: &TreatmentSession,
    ) -> Result<(), JsValue> {
        let technique = session.technique();
        match scene_for(technique) {
            Scene::Thorax => self.draw_thorax(context)?,
            Scene::Cranium => self.draw_cranium(context)?,
            Scene::Abdomen => self.draw_abdomen(context)?,
        }

        let tumor = tumor_position(technique);
        let radius = tumor_radius(technique);
        draw_tumor(context, tumor, radius, session.tumor_shape())?;

        // 腫瘍位置のマーカー
        context.begin_path();
        context.arc(tumor.x, tumor.y, 5.0, 0.0, TAU)?;
        context.set_fill_style_str("red");
        context.fill();
        context.set_stroke_style_str("white");
        context.set_line_width(1.0);
        context.stroke();
        Ok(())
    }

    fn draw_thorax(&self, context: &CanvasRenderingContext2d) -> Result<(), JsValue> {
        let body = STRUCTURES.body;
        context.set_fill_style_str(SKIN_COLOR);
        context.begin_path();
        context.ellipse(
            body.center.x,
            body.center.y,
            body.radius_x,
            body.radius_y,
            0.0,
            0.0,
            TAU,
        )?;
        context.fill();
        context.set_stroke_style_str(OUTLINE_COLOR);
        context.set_line_width(2.0);
        context.stroke();

        let spine = STRUCTURES.spine;
        context.set_fill_style_str(BONE_COLOR);
        context.fill_rect(
            spine.center.x - spine.width / 2.0,
            spine.center.y - spine.height / 2.0,
            spine.width,
            spine.height,
        );

        context.set_fill_style_str(LUNG_COLOR);
        for lung in [STRUCTURES.left_lung, STRUCTURES.right_lung] {
            context.begin_path();
            context.ellipse(
                lung.center.x,
                lung.center.y,
                lung.radius_x,
                lung.radius_y,
                0.0,
                0.0,
                TAU,
            )?;
            context.fill();
        }

        let heart = STRUCTURES.heart;
        context.set_fill_style_str(ORGAN_COLOR);
        context.begin_path();
        context.ellipse(
            heart.center.x,
            heart.center.y,
            heart.radius_x,
            heart.radius_y,
            heart.tilt,
            0.0,
            TAU,
        )?;
        context.fill();

        Ok(())
    }

    fn draw_cranium(&self, context: &CanvasRenderingContext2d) -> Result<(), JsValue> {
        let center_x = 400.0;
        let center_y = 260.0;

        context.set_fill_style_str(SKIN_COLOR);
        context.begin_path();
        context.ellipse(center_x, center_y, 120.0, 160.0, 0.0, 0.0, TAU)?;
        context.fill();
        context.set_stroke_style_str(OUTLINE_COLOR);
        context.set_line_width(2.0);
        context.stroke();

        context.set_fill_style_str(BONE_COLOR);
        context.begin_path();
        context.ellipse(center_x, center_y - 20.0, 100.0, 120.0, 0.0, 0.0, TAU)?;
        context.fill();
        context.set_stroke_style_str("#a0a0a0");
        context.set_line_width(1.0);
        context.stroke();

        // 正中線
        context.begin_path();
        context.move_to(center_x, center_y - 140.0);
        context.line_to(center_x, center_y + 100.0);
        context.set_stroke_style_str(GANTRY_COLOR);
        context.set_line_width(2.0);
        context.stroke();

        // 下顎
        context.set_fill_style_str("#d0d0d0");
        context.begin_path();
        context.ellipse(center_x, center_y + 80.0, 50.0, 25.0, 0.0, 0.0, PI)?;
        context.fill();
        context.stroke();

        // 頸部
        context.set_fill_style_str("#c0c0c0");
        context.begin_path();
        context.move_to(center_x - 10.0, center_y + 100.0);
        context.line_to(center_x - 10.0, center_y + 140.0);
        context.line_to(center_x + 10.0, center_y + 140.0);
        context.line_to(center_x + 10.0, center_y + 100.0);
        context.close_path();
        context.fill();
        context.stroke();

        // 脳回を示す弧
        context.set_stroke_style_str("#b0b0b0");
        context.set_line_width(1.0);
        for i in 0..8 {
            let radius = 60.0 + i as f64 * 8.0;
            context.begin_path();
            context.arc(center_x, center_y - 20.0, radius, 0.1 * PI, 0.9 * PI)?;
            context.stroke();
            context.begin_path();
            context.arc(center_x, center_y - 20.0, radius, 1.1 * PI, 1.9 * PI)?;
            context.stroke();
        }

        Ok(())
    }

    fn draw_abdomen(&self, context: &CanvasRenderingContext2d) -> Result<(), JsValue> {
        let center_x = 300.0;
        let center_y = 200.0;

        context.set_fill_style_str(SKIN_COLOR);
        context.begin_path();
        context.ellipse(center_x, center_y, 180.0, 220.0, 0.0, 0.0, TAU)?;
        context.fill();
        context.set_stroke_style_str(OUTLINE_COLOR);
        context.set_line_width(2.0);
        context.stroke();

        context.set_fill_style_str("#d3d3d3");
        context.begin_path();
        context.rect(center_x - 10.0, center_y - 180.0, 20.0, 360.0);
        context.fill();
        context.set_stroke_style_str(BONE_EDGE_COLOR);
        context.set_line_width(1.0);
        context.stroke();

        // 肋骨
        for i in 0..7 {
            let base_y = center_y - 140.0 + i as f64 * 25.0;
            context.begin_path();
            context.move_to(center_x, base_y);
            context.quadratic_curve_to(
                center_x + 80.0,
                base_y + 10.0,
                center_x + 160.0,
                base_y + 20.0,
            );
            context.stroke();
            context.begin_path();
            context.move_to(center_x, base_y);
            context.quadratic_curve_to(
                center_x - 80.0,
                base_y + 10.0,
                center_x - 160.0,
                base_y + 20.0,
            );
            context.stroke();
        }

        context.set_fill_style_str(LUNG_COLOR);
        for offset in [-60.0, 60.0] {
            context.begin_path();
            context.ellipse(
                center_x + offset,
                center_y - 50.0,
                70.0,
                100.0,
                0.0,
                0.0,
                TAU,
            )?;
            context.fill();
            context.stroke();
        }

        context.set_fill_style_str(ORGAN_COLOR);
        context.begin_path();
        context.move_to(center_x - 40.0, center_y - 80.0);
        context.quadratic_curve_to(center_x, center_y - 120.0, center_x + 40.0, center_y - 80.0);
        context.quadratic_curve_to(
            center_x + 50.0,
            center_y - 50.0,
            center_x + 40.0,
            center_y - 20.0,
        );
        context.quadratic_curve_to(center_x, center_y, center_x - 40.0, center_y - 20.0);
        context.quadratic_curve_to(
            center_x - 50.0,
            center_y - 50.0,
            center_x - 40.0,
            center_y - 80.0,
        );
        context.fill();
        context.stroke();

        Ok(())
    }

    fn draw_gantry(
        &self,
        context: &CanvasRenderingContext2d,
        session: &TreatmentSession,
    ) -> Result<(), JsValue> {
        let tumor = tumor_position(session.technique());
        context.save();
        context.translate(tumor.x, tumor.y)?;
        context.rotate(session.current_angle().to_radians())?;

        context.set_fill_style_str(GANTRY_COLOR);
        context.fill_rect(-50.0, -320.0, 100.0, 70.0);

        if let Some(bank) = session.mlc() {
            draw_mlc_carriage(context, bank)?;
        }

        context.set_fill_style_str(if session.beam_on() {
            "#00ff00"
        } else {
            "#ff0000"
        });
        context.begin_path();
        context.arc(0.0, -GANTRY_RADIUS, 10.0, 0.0, TAU)?;
        context.fill();

        context.restore();
        Ok(())
    }

    fn draw_beam(
        &self,
        context: &CanvasRenderingContext2d,
        session: &TreatmentSession,
    ) -> Result<(), JsValue> {
        let technique = session.technique();
        let tumor = tumor_position(technique);
        let length = GANTRY_RADIUS;
        let half_width = session.beam_width_mm() * 0.5;
        let precision = session.params().precision;
        let energy = session.beam_energy_mev();

        context.save();
        context.translate(tumor.x, tumor.y)?;
        context.rotate(session.current_angle().to_radians())?;

        match session.params().beam_shape {
            BeamShape::Rectangular => {
                draw_rectangular_beam(context, half_width, length, precision, energy)?
            }
            BeamShape::Conformal => {
                draw_conformal_beam(context, half_width, length, precision, energy)?
            }
            BeamShape::Modulated => draw_modulated_beam(context, half_width, length, energy)?,
            BeamShape::Convergent => {
                let aperture = tumor_radius(technique);
                draw_convergent_beam(context, half_width, length, aperture, energy)?
            }
        }

        // ビーム軌道を示す点線
        let dash = js_sys::Array::of2(&JsValue::from_f64(5.0), &JsValue::from_f64(5.0));
        context.set_line_dash(&dash)?;
        context.begin_path();
        context.move_to(0.0, 0.0);
        context.line_to(0.0, -length);
        context.set_stroke_style_str(BEAM_CENTERLINE);
        context.set_line_width(1.0);
        context.stroke();
        context.set_line_dash(&js_sys::Array::new())?;

        context.restore();
        Ok(())
    }
}

fn draw_tumor(
    context: &CanvasRenderingContext2d,
    position: Point,
    radius: f64,
    shape: TumorShape,
) -> Result<(), JsValue> {
    context.set_fill_style_str(TUMOR_FILL);
    context.set_stroke_style_str(TUMOR_STROKE);
    context.set_line_width(2.0);

    match shape {
        TumorShape::Round => {
            context.begin_path();
            context.arc(position.x, position.y, radius, 0.0, TAU)?;
            context.fill();
            context.stroke();
        }
        TumorShape::Irregular => {
            draw_irregular_tumor(context, position, radius)?;
        }
    }
    Ok(())
}

fn draw_irregular_tumor(
    context: &CanvasRenderingContext2d,
    position: Point,
    radius: f64,
) -> Result<(), JsValue> {
    let lobe_angle = TAU / 3.0;
    let corner_radius = radius * 0.3;

    context.begin_path();
    for i in 0..3 {
        let current_angle = i as f64 * lobe_angle - FRAC_PI_2;
        let next_angle = (i + 1) as f64 * lobe_angle - FRAC_PI_2;

        let inner = radius - corner_radius;
        let point1_x = position.x + inner * current_angle.cos();
        let point1_y = position.y + inner * current_angle.sin();
        let point2_x = position.x + inner * next_angle.cos();
        let point2_y = position.y + inner * next_angle.sin();

        context.line_to(point1_x, point1_y);
        context.arc_to(
            position.x + radius * (current_angle + lobe_angle / 2.0).cos(),
            position.y + radius * (current_angle + lobe_angle / 2.0).sin(),
            point2_x,
            point2_y,
            corner_radius,
        )?;
    }
    context.close_path();
    context.fill();
    context.stroke();
    Ok(())
}

fn draw_mlc_carriage(
    context: &CanvasRenderingContext2d,
    bank: &rtsim_core::MlcBank,
) -> Result<(), JsValue> {
    let pairs = bank.pairs();
    let mlc_width = GANTRY_RADIUS * 0.6;
    let mlc_height = GANTRY_RADIUS * 0.15;
    let leaf_width = mlc_width / pairs.len() as f64;
    let half_height = mlc_height / 2.0;

    context.set_fill_style_str(MLC_BASE_COLOR);
    context.fill_rect(
        -mlc_width / 2.0,
        -GANTRY_RADIUS - mlc_height,
        mlc_width,
        mlc_height,
    );

    context.set_fill_style_str(MLC_LEAF_COLOR);
    for (index, pair) in pairs.iter().enumerate() {
        let x = -mlc_width / 2.0 + index as f64 * leaf_width;
        let upper_extension = (pair.left / rtsim_core::LEAF_TRAVEL_LIMIT) * half_height;
        let lower_extension = (pair.right / rtsim_core::LEAF_TRAVEL_LIMIT) * half_height;

        context.fill_rect(
            x,
            -GANTRY_RADIUS - mlc_height,
            leaf_width,
            half_height + upper_extension,
        );
        context.fill_rect(
            x,
            -GANTRY_RADIUS - half_height - lower_extension,
            leaf_width,
            half_height + lower_extension,
        );
    }
    Ok(())
}

fn draw_rectangular_beam(
    context: &CanvasRenderingContext2d,
    half_width: f64,
    length: f64,
    precision: u8,
    energy: f64,
) -> Result<(), JsValue> {
    let imprecision = (100 - precision as i32) as f64 / 100.0;
    let edge_variation = half_width * imprecision * 0.5;

    context.begin_path();
    context.move_to(-half_width - edge_variation, 0.0);
    context.line_to(half_width + edge_variation, 0.0);
    context.line_to(half_width - edge_variation, -length);
    context.line_to(-half_width + edge_variation, -length);
    context.close_path();

    let gradient = context.create_linear_gradient(0.0, 0.0, 0.0, -length);
    gradient.add_color_stop(0.0, &yellow_shade(energy / 15.0, 0))?;
    gradient.add_color_stop(1.0, &yellow_shade(0.05, 0))?;
    context.set_fill_style_canvas_gradient(&gradient);
    context.fill();

    context.set_stroke_style_str(BEAM_EDGE);
    context.set_line_width(1.0);
    context.stroke();
    Ok(())
}

fn draw_conformal_beam(
    context: &CanvasRenderingContext2d,
    half_width: f64,
    length: f64,
    precision: u8,
    energy: f64,
) -> Result<(), JsValue> {
    let imprecision = (100 - precision as i32) as f64 / 100.0;
    let edge_variation = half_width * imprecision * 0.5;

    context.begin_path();
    context.move_to(-half_width - edge_variation, 0.0);
    context.line_to(half_width + edge_variation, 0.0);
    context.quadratic_curve_to(
        half_width / 2.0,
        -length / 2.0,
        half_width - edge_variation,
        -length,
    );
    context.line_to(-half_width + edge_variation, -length);
    context.quadratic_curve_to(
        -half_width / 2.0,
        -length / 2.0,
        -half_width - edge_variation,
        0.0,
    );
    context.close_path();

    let gradient = context.create_linear_gradient(0.0, 0.0, 0.0, -length);
    gradient.add_color_stop(0.0, &yellow_shade(energy / 15.0, 10))?;
    gradient.add_color_stop(1.0, &yellow_shade(0.05, 10))?;
    context.set_fill_style_canvas_gradient(&gradient);
    context.fill();

    context.set_stroke_style_str(BEAM_EDGE);
    context.set_line_width(1.0);
    context.stroke();
    Ok(())
}

fn draw_modulated_beam(
    context: &CanvasRenderingContext2d,
    half_width: f64,
    length: f64,
    energy: f64,
) -> Result<(), JsValue> {
    let segment_length = length / MODULATED_SEGMENTS as f64;

    for (index, (segment_width, intensity)) in modulated_segments(half_width, MODULATED_SEGMENTS)
        .into_iter()
        .enumerate()
    {
        let top = -((index + 1) as f64) * segment_length;
        let gradient =
            context.create_linear_gradient(0.0, -(index as f64) * segment_length, 0.0, top);
        gradient.add_color_stop(0.0, &yellow_shade(intensity * energy / 15.0, 20))?;
        gradient.add_color_stop(1.0, &yellow_shade(intensity * 0.05, 20))?;
        context.set_fill_style_canvas_gradient(&gradient);

        context.begin_path();
        context.rect(-segment_width / 2.0, top, segment_width, segment_length);
        context.fill();
        context.set_stroke_style_str(BEAM_EDGE);
        context.set_line_width(1.0);
        context.stroke();
    }
    Ok(())
}

fn draw_convergent_beam(
    context: &CanvasRenderingContext2d,
    half_width: f64,
    length: f64,
    aperture: f64,
    energy: f64,
) -> Result<(), JsValue> {
    let max_width = half_width * 0.2;

    context.begin_path();
    context.move_to(-max_width, 0.0);
    context.line_to(max_width, 0.0);
    context.line_to(aperture, -length);
    context.line_to(-aperture, -length);
    context.close_path();

    let gradient = context.create_linear_gradient(0.0, 0.0, 0.0, -length);
    gradient.add_color_stop(0.0, &yellow_shade(energy / 15.0, -10))?;
    gradient.add_color_stop(1.0, &yellow_shade(0.9, -10))?;
    context.set_fill_style_canvas_gradient(&gradient);
    context.fill();

    // 収束を示すリーフのガイド線
    context.set_stroke_style_str("rgba(255, 255, 255, 0.7)");
    context.set_line_width(2.0);
    context.begin_path();
    for i in -5..=5 {
        let leaf_position = i as f64 * (max_width / 5.0);
        context.move_to(leaf_position, 0.0);
        context.line_to((leaf_position / max_width) * aperture, -length);
    }
    context.stroke();
    Ok(())
}

/// 強度変調ビームのセグメント幅と強度。描画ごとに揺らぐ見た目を作る。
fn modulated_segments(half_width: f64, count: usize) -> Vec<(f64, f64)> {
    (0..count)
        .map(|_| {
            let width = half_width * (0.5 + random_unit() * 0.5);
            let intensity = random_unit() * 0.7 + 0.3;
            (width, intensity)
        })
        .collect()
}

fn yellow_shade(intensity: f64, hue_shift: i32) -> String {
    let hue = (60 + hue_shift).rem_euclid(360);
    format!("hsla({hue}, 100%, 50%, {intensity:.3})")
}

#[cfg(target_arch = "wasm32")]
fn random_unit() -> f64 {
    js_sys::Math::random()
}

#[cfg(not(target_arch = "wasm32"))]
fn random_unit() -> f64 {
    static SEED: AtomicU64 = AtomicU64::new(0x0123_4567_89ab_cdef);
    let current = SEED.load(Ordering::Relaxed);
    let next = current
        .wrapping_mul(636_413_622_384_679_3005)
        .wrapping_add(1);
    SEED.store(next, Ordering::Relaxed);
    let bits = (next >> 11) | 1;
    (bits as f64) / ((1u64 << 53) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yellow_shade_formats_hsla_strings() {
        assert_eq!(yellow_shade(0.4, 0), "hsla(60, 100%, 50%, 0.400)");
        assert_eq!(yellow_shade(0.05, 10), "hsla(70, 100%, 50%, 0.050)");
        assert_eq!(yellow_shade(0.9, -10), "hsla(50, 100%, 50%, 0.900)");
    }

    #[test]
    fn modulated_segments_stay_within_bounds() {
        let segments = modulated_segments(50.0, MODULATED_SEGMENTS);
        assert_eq!(segments.len(), MODULATED_SEGMENTS);
        for (width, intensity) in segments {
            assert!((25.0..=50.0).contains(&width));
            assert!((0.3..=1.0).contains(&intensity));
        }
    }
}
