//! Bảng quy đổi giá trị sinh lý sang điểm OASIS.
//!
//! Mỗi hàm trả `None` khi thiếu đầu vào. Các điều kiện được xét từ trên
//! xuống, điều kiện đầu tiên khớp sẽ quyết định điểm; một số khoảng chồng
//! lên nhau nên thứ tự này phải giữ nguyên.

use chrono::Duration;

use crate::{ComponentScores, Extremes, HourAggregate, StaticAttributes};

const LOS_FIVE_POINTS_SECS: i64 = 10 * 60 + 12;
const LOS_THREE_POINTS_SECS: i64 = 4 * 3600 + 57 * 60;
const LOS_ZERO_POINTS_SECS: i64 = 24 * 3600;
const LOS_ONE_POINT_SECS: i64 = 12 * 24 * 3600 + 23 * 3600 + 48 * 60;

pub fn pre_icu_los_score(pre_icu_los: Option<Duration>) -> Option<i32> {
    pre_icu_los.map(|los| match los.num_seconds() {
        secs if secs < LOS_FIVE_POINTS_SECS => 5,
        secs if secs < LOS_THREE_POINTS_SECS => 3,
        secs if secs < LOS_ZERO_POINTS_SECS => 0,
        secs if secs < LOS_ONE_POINT_SECS => 1,
        _ => 2,
    })
}

pub fn age_score(age: Option<f64>) -> Option<i32> {
    age.map(|age| match age {
        a if a < 24.0 => 0,
        a if a <= 53.0 => 3,
        a if a <= 77.0 => 6,
        a if a <= 89.0 => 9,
        a if a >= 90.0 => 7,
        _ => 0,
    })
}

pub fn gcs_score(gcs_min: Option<f64>) -> Option<i32> {
    gcs_min.map(|gcs| match gcs {
        g if g <= 7.0 => 10,
        g if g < 14.0 => 4,
        g if g == 14.0 => 3,
        _ => 0,
    })
}

pub fn heart_rate_score(heart_rate: Option<Extremes>) -> Option<i32> {
    heart_rate.map(|Extremes { min, max }| {
        if max > 125.0 {
            6
        } else if min < 33.0 {
            4
        } else if (107.0..=125.0).contains(&max) {
            3
        } else if (89.0..=106.0).contains(&max) {
            1
        } else {
            0
        }
    })
}

pub fn mean_bp_score(mean_bp: Option<Extremes>) -> Option<i32> {
    mean_bp.map(|Extremes { min, max }| {
        if min < 20.65 {
            4
        } else if min < 51.0 {
            3
        } else if max > 143.44 {
            3
        } else if (51.0..61.33).contains(&min) {
            2
        } else {
            0
        }
    })
}

pub fn resp_rate_score(resp_rate: Option<Extremes>) -> Option<i32> {
    resp_rate.map(|Extremes { min, max }| {
        if min < 6.0 {
            10
        } else if max > 44.0 {
            9
        } else if max > 30.0 {
            6
        } else if max > 22.0 || min < 13.0 {
            1
        } else {
            0
        }
    })
}

pub fn temperature_score(temperature: Option<Extremes>) -> Option<i32> {
    temperature.map(|Extremes { min, max }| {
        if max > 39.88 {
            6
        } else if (33.22..=35.93).contains(&min) || (33.22..=35.93).contains(&max) {
            4
        } else if min < 33.22 {
            3
        } else if min > 35.93 && min <= 36.39 {
            2
        } else if (36.89..=39.88).contains(&max) {
            2
        } else {
            0
        }
    })
}

/// Điểm nước tiểu tính trên tổng cả cửa sổ trượt, không phải trên từng giờ.
pub fn urine_output_score(urine_24h: Option<f64>) -> Option<i32> {
    urine_24h.map(|volume| {
        if volume < 671.09 {
            10
        } else if volume > 6896.80 {
            8
        } else if (671.09..=1426.99).contains(&volume) {
            5
        } else if (1427.00..=2544.14).contains(&volume) {
            1
        } else {
            0
        }
    })
}

pub fn mechvent_score(mechvent: bool) -> i32 {
    if mechvent {
        9
    } else {
        0
    }
}

pub fn elective_surgery_score(elective_surgery: Option<bool>) -> Option<i32> {
    elective_surgery.map(|elective| if elective { 0 } else { 6 })
}

/// Điểm gốc của mười thành phần trong một giờ.
pub fn score_hour(
    aggregate: &HourAggregate,
    statics: &StaticAttributes,
    urine_24h: Option<f64>,
) -> ComponentScores {
    ComponentScores {
        pre_icu_los: pre_icu_los_score(statics.pre_icu_los),
        age: age_score(statics.age),
        gcs: gcs_score(aggregate.gcs_min),
        heart_rate: heart_rate_score(aggregate.heart_rate),
        mean_bp: mean_bp_score(aggregate.mean_bp),
        resp_rate: resp_rate_score(aggregate.resp_rate),
        temperature: temperature_score(aggregate.temperature),
        urine_output: urine_output_score(urine_24h),
        mechvent: Some(mechvent_score(aggregate.mechvent)),
        elective_surgery: elective_surgery_score(statics.elective_surgery),
    }
}

/// Xác suất tử vong trong viện theo hồi quy logistic của OASIS.
pub fn mortality_probability(oasis: i32) -> f64 {
    1.0 / (1.0 + (-(-6.1746 + 0.1275 * f64::from(oasis))).exp())
}
