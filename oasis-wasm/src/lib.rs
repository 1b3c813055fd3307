//! Bridge WASM <-> JavaScript trung lập framework.

use oasis_core::{OasisConfig, OasisError, VentilationOverlap};
use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize, Default)]
struct JsOasisConfig {
    #[serde(default)]
    window_hours: Option<u32>,
    #[serde(default)]
    ventilation_overlap: Option<VentilationOverlap>,
}

impl From<JsOasisConfig> for OasisConfig {
    fn from(cfg: JsOasisConfig) -> Self {
        let mut base = OasisConfig::default();
        if let Some(hours) = cfg.window_hours {
            base.window_hours = hours;
        }
        if let Some(rule) = cfg.ventilation_overlap {
            base.ventilation_overlap = rule;
        }
        base
    }
}

/// Tính điểm OASIS theo giờ cho một lô dữ liệu ICU dạng JSON.
#[wasm_bindgen]
pub fn score_cohort(input_cohort: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let cohort_value = from_value::<serde_json::Value>(input_cohort)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được JSON dữ liệu ICU: {err}")))?;

    let cfg = match config {
        Some(js_cfg) => {
            let cfg: JsOasisConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?;
            OasisConfig::from(cfg)
        }
        None => OasisConfig::default(),
    };

    let scores = oasis_ingest::score_cohort_value(&cohort_value, &cfg)
        .map_err(|err| JsValue::from_str(&format_oasis_error(err)))?;

    to_value(&scores).map_err(|err| JsValue::from_str(&format!("Không serialize kết quả: {err}")))
}

fn format_oasis_error(err: OasisError) -> String {
    format!("OASIS error: {err}")
}
