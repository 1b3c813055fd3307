//! Chạy toàn bộ chuỗi tính điểm cho từng lượt nằm ICU và cho cả lô.

use crate::admission::resolve_static;
use crate::aggregate::aggregate_stay;
use crate::timeline::build_timeline;
use crate::window::RollingCombiner;
use crate::{
    CohortInputs, CohortScores, DataQualityIssue, OasisConfig, OasisError, ScoredHour,
    StayRecord,
};

/// Kết quả của một lượt nằm ICU.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StayOutcome {
    pub rows: Vec<ScoredHour>,
    pub issues: Vec<DataQualityIssue>,
}

/// Tính điểm mọi giờ của một lượt nằm. Không bao giờ thất bại: lượt nằm lỗi
/// trả về danh sách giờ rỗng kèm vấn đề dữ liệu.
pub fn score_stay(record: &StayRecord, config: &OasisConfig) -> StayOutcome {
    let stay_id = record.stay.stay_id;

    let buckets = match build_timeline(&record.stay) {
        Ok(buckets) => buckets,
        Err(err) => {
            tracing::warn!(stay_id, error = %err, "bỏ qua lượt nằm ICU không hợp lệ");
            return StayOutcome {
                rows: Vec::new(),
                issues: vec![DataQualityIssue::MalformedStay {
                    stay_id,
                    reason: err.to_string(),
                }],
            };
        }
    };

    let mut issues = Vec::new();
    if record.admission.is_none() {
        tracing::debug!(stay_id, "không có thông tin nhập viện");
        issues.push(DataQualityIssue::InconsistentAdmission { stay_id });
    }

    let statics = resolve_static(&record.stay, record.admission.as_ref());
    let aggregates = aggregate_stay(record, &buckets, config.ventilation_overlap);

    let mut combiner = RollingCombiner::new(statics, config.window_hours);
    let rows = buckets
        .iter()
        .zip(&aggregates)
        .map(|(bucket, aggregate)| combiner.push(bucket, aggregate))
        .collect();

    StayOutcome { rows, issues }
}

/// Tính điểm cả lô. Các lượt nằm độc lập nên được tính song song khi bật
/// feature `parallel`; kết quả luôn sắp theo `(stay_id, hour)`.
pub fn score_cohort(
    records: &[StayRecord],
    config: &OasisConfig,
) -> Result<CohortScores, OasisError> {
    config.validate()?;

    #[cfg(feature = "parallel")]
    let outcomes: Vec<StayOutcome> = {
        use rayon::prelude::*;
        records
            .par_iter()
            .map(|record| score_stay(record, config))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<StayOutcome> = records
        .iter()
        .map(|record| score_stay(record, config))
        .collect();

    let mut scores = CohortScores {
        stays: records.len(),
        ..CohortScores::default()
    };
    for outcome in outcomes {
        scores.rows.extend(outcome.rows);
        scores.issues.extend(outcome.issues);
    }
    scores.rows.sort_by_key(|row| (row.stay_id, row.hour));
    scores.issues.sort_by_key(DataQualityIssue::stay_id);

    Ok(scores)
}

/// Tách bảng đầu vào theo lượt nằm rồi tính điểm.
pub fn score_cohort_inputs(
    inputs: CohortInputs,
    config: &OasisConfig,
) -> Result<CohortScores, OasisError> {
    let records = inputs.partition();
    score_cohort(&records, config)
}
