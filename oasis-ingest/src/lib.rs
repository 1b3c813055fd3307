//! Cohort JSON to `CohortInputs` loader.
//!
//! The document is an object of tables, each an array of row objects, as
//! exported from an ICU database. Column names follow either the crate's own
//! field names or the database export names (`icustay_id`, `charttime`, ...).

use chrono::{DateTime, NaiveDateTime, Utc};
use oasis_core::{
    score_cohort_inputs, AdmissionFacts, CohortInputs, CohortScores, IcuStay, NeuroReading,
    OasisConfig, OasisError, StayId, UrineMeasurement, VentilationEpisode, VitalReading,
};
use serde_json::{Map, Value};

/// Parsed cohort plus the number of rows that could not be used.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadedCohort {
    pub inputs: CohortInputs,
    pub skipped_rows: usize,
}

/// Load cohort tables from a JSON string.
pub fn load_cohort_str(cohort_json: &str) -> Result<LoadedCohort, OasisError> {
    let value: Value =
        serde_json::from_str(cohort_json).map_err(|err| OasisError::Parse(err.to_string()))?;
    load_cohort_value(&value)
}

/// Load cohort tables from a `serde_json::Value`.
pub fn load_cohort_value(document: &Value) -> Result<LoadedCohort, OasisError> {
    let tables = document.as_object().ok_or_else(|| {
        OasisError::Parse("Expected a JSON object of cohort tables".to_string())
    })?;

    let stays = table(tables, &["stays", "icustays"]).ok_or(OasisError::MissingData)?;

    let mut loader = Loader::default();
    let inputs = CohortInputs {
        stays: loader.rows(stays, "stays", parse_stay),
        admissions: loader.optional(tables, &["admissions"], parse_admission),
        vitals: loader.optional(tables, &["vitals", "vitals_pivoted"], parse_vital),
        neuro: loader.optional(tables, &["neuro", "gcs"], parse_neuro),
        ventilation: loader.optional(
            tables,
            &["ventilation", "ventdurations"],
            parse_ventilation,
        ),
        urine_output: loader.optional(tables, &["urine_output", "urineoutput"], parse_urine),
    };

    Ok(LoadedCohort {
        inputs,
        skipped_rows: loader.skipped,
    })
}

/// Load and score a cohort in one step.
pub fn score_cohort_str(
    cohort_json: &str,
    config: &OasisConfig,
) -> Result<CohortScores, OasisError> {
    let loaded = load_cohort_str(cohort_json)?;
    score_cohort_inputs(loaded.inputs, config)
}

/// Load and score an already-parsed cohort document.
pub fn score_cohort_value(
    document: &Value,
    config: &OasisConfig,
) -> Result<CohortScores, OasisError> {
    let loaded = load_cohort_value(document)?;
    score_cohort_inputs(loaded.inputs, config)
}

#[derive(Default)]
struct Loader {
    skipped: usize,
}

impl Loader {
    fn optional<T>(
        &mut self,
        tables: &Map<String, Value>,
        names: &[&str],
        parse: fn(&Value) -> Option<T>,
    ) -> Vec<T> {
        match table(tables, names) {
            Some(rows) => self.rows(rows, names[0], parse),
            None => Vec::new(),
        }
    }

    fn rows<T>(&mut self, rows: &[Value], name: &str, parse: fn(&Value) -> Option<T>) -> Vec<T> {
        let mut parsed = Vec::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            match parse(row) {
                Some(item) => parsed.push(item),
                None => {
                    tracing::warn!(table = name, row = position, "skipping unusable row");
                    self.skipped += 1;
                }
            }
        }
        parsed
    }
}

fn table<'a>(tables: &'a Map<String, Value>, names: &[&str]) -> Option<&'a [Value]> {
    names
        .iter()
        .find_map(|name| tables.get(*name))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
}

fn parse_stay(row: &Value) -> Option<IcuStay> {
    Some(IcuStay {
        stay_id: stay_id(row)?,
        admission_id: extract_id(row, &["admission_id", "hadm_id"]),
        intake_time: extract_datetime(row, &["intake_time", "intime"]),
        end_time: extract_datetime(row, &["end_time", "outtime"]),
    })
}

fn parse_admission(row: &Value) -> Option<AdmissionFacts> {
    Some(AdmissionFacts {
        stay_id: stay_id(row)?,
        admission_time: extract_datetime(row, &["admission_time", "admittime"]),
        admission_type: extract_text(row, &["admission_type"]),
        surgical: extract_bool(row, &["surgical", "surgical_flag"]),
        age: extract_number(row, &["age"]),
    })
}

fn parse_vital(row: &Value) -> Option<VitalReading> {
    Some(VitalReading {
        stay_id: stay_id(row)?,
        charted_at: charted_at(row)?,
        heart_rate: extract_number(row, &["heart_rate", "heartrate"]),
        temperature: extract_number(row, &["temperature", "tempc", "temp"]),
        mean_bp: extract_number(row, &["mean_bp", "meanbp"]),
        resp_rate: extract_number(row, &["resp_rate", "resprate"]),
    })
}

fn parse_neuro(row: &Value) -> Option<NeuroReading> {
    Some(NeuroReading {
        stay_id: stay_id(row)?,
        charted_at: charted_at(row)?,
        gcs: extract_number(row, &["gcs"])?,
    })
}

fn parse_ventilation(row: &Value) -> Option<VentilationEpisode> {
    Some(VentilationEpisode {
        stay_id: stay_id(row)?,
        start: extract_datetime(row, &["start", "starttime"])?,
        end: extract_datetime(row, &["end", "endtime"])?,
    })
}

fn parse_urine(row: &Value) -> Option<UrineMeasurement> {
    Some(UrineMeasurement {
        stay_id: stay_id(row)?,
        charted_at: charted_at(row)?,
        volume: extract_number(row, &["volume", "urineoutput", "value"])?,
    })
}

fn stay_id(row: &Value) -> Option<StayId> {
    extract_id(row, &["stay_id", "icustay_id"])
}

fn charted_at(row: &Value) -> Option<DateTime<Utc>> {
    extract_datetime(row, &["charted_at", "charttime"])
}

fn extract_id(row: &Value, fields: &[&str]) -> Option<i64> {
    fields
        .iter()
        .filter_map(|field| row.get(*field))
        .find_map(|value| match value {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
}

fn extract_number(row: &Value, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|field| row.get(*field))
        .find_map(|value| match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
}

fn extract_text(row: &Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| row.get(*field))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn extract_bool(row: &Value, fields: &[&str]) -> Option<bool> {
    fields
        .iter()
        .filter_map(|field| row.get(*field))
        .find_map(|value| match value {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(text) => parse_flag(text),
            _ => None,
        })
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "y" | "yes" | "1" => Some(true),
        "false" | "f" | "n" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn extract_datetime(row: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    fields
        .iter()
        .filter_map(|field| row.get(*field))
        .filter_map(Value::as_str)
        .find_map(parse_datetime)
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// RFC 3339, or a naive timestamp read as UTC.
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn accepts_database_column_names() {
        let document = json!({
            "icustays": [
                {"icustay_id": 200001, "hadm_id": "100001",
                 "intime": "2130-01-01 08:00:00", "outtime": "2130-01-02T08:00:00Z"}
            ],
            "admissions": [
                {"icustay_id": 200001, "admittime": "2130-01-01 02:15:00",
                 "admission_type": "ELECTIVE", "surgical_flag": 1, "age": "67.2"}
            ],
            "vitals": [
                {"icustay_id": 200001, "charttime": "2130-01-01 08:30:00.000",
                 "heartrate": 112, "tempc": 37.9, "meanbp": null, "resprate": "24"}
            ],
            "gcs": [{"icustay_id": 200001, "charttime": "2130-01-01 08:45:00", "gcs": 13}],
            "ventdurations": [
                {"icustay_id": 200001, "starttime": "2130-01-01 09:10:00",
                 "endtime": "2130-01-01 12:00:00"}
            ],
            "urineoutput": [
                {"icustay_id": 200001, "charttime": "2130-01-01 09:00:00", "value": 350}
            ]
        });

        let loaded = load_cohort_value(&document).unwrap();
        let inputs = &loaded.inputs;

        assert_eq!(loaded.skipped_rows, 0);
        assert_eq!(inputs.stays[0].admission_id, Some(100001));
        assert_eq!(
            inputs.stays[0].intake_time,
            Some(Utc.with_ymd_and_hms(2130, 1, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(inputs.admissions[0].surgical, Some(true));
        assert_eq!(inputs.admissions[0].age, Some(67.2));
        assert_eq!(inputs.vitals[0].heart_rate, Some(112.0));
        assert_eq!(inputs.vitals[0].mean_bp, None);
        assert_eq!(inputs.vitals[0].resp_rate, Some(24.0));
        assert_eq!(inputs.neuro[0].gcs, 13.0);
        assert_eq!(inputs.ventilation.len(), 1);
        assert_eq!(inputs.urine_output[0].volume, 350.0);
    }

    #[test]
    fn unusable_rows_are_skipped_and_counted() {
        let document = json!({
            "stays": [
                {"stay_id": 1, "intake_time": "2130-01-01T00:00:00Z"},
                {"intake_time": "2130-01-01T00:00:00Z"}
            ],
            "urine_output": [
                {"stay_id": 1, "charted_at": "not a time", "volume": 10},
                {"stay_id": 1, "charted_at": "2130-01-01T00:30:00Z"}
            ],
            "neuro": "not a table"
        });

        let loaded = load_cohort_value(&document).unwrap();

        assert_eq!(loaded.inputs.stays.len(), 1);
        assert_eq!(loaded.inputs.stays[0].end_time, None);
        assert!(loaded.inputs.urine_output.is_empty());
        assert!(loaded.inputs.neuro.is_empty());
        assert_eq!(loaded.skipped_rows, 3);
    }

    #[test]
    fn stay_table_is_required() {
        assert!(matches!(
            load_cohort_str(r#"{"vitals": []}"#),
            Err(OasisError::MissingData)
        ));
        assert!(matches!(load_cohort_str("[]"), Err(OasisError::Parse(_))));
        assert!(matches!(load_cohort_str("{"), Err(OasisError::Parse(_))));
    }

    #[test]
    fn flags_and_blank_text() {
        let row = json!({"surgical": "N", "admission_type": "   "});
        assert_eq!(extract_bool(&row, &["surgical"]), Some(false));
        assert_eq!(extract_text(&row, &["admission_type"]), None);
        assert_eq!(extract_bool(&json!({"surgical": 2}), &["surgical"]), None);
    }

    #[test]
    fn timestamps_with_offsets_are_normalised() {
        assert_eq!(
            parse_datetime("2130-01-01T10:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2130, 1, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime("01/01/2130"), None);
    }
}
