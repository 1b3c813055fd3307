//! Cửa sổ trượt theo giờ: điểm lớn nhất của từng thành phần và tổng nước tiểu.

use std::collections::VecDeque;

use crate::score::{mortality_probability, score_hour};
use crate::{Component, HourAggregate, HourBucket, ScoredHour, StaticAttributes};

/// Giá trị lớn nhất trong `span` giờ gần nhất, bỏ qua giờ thiếu điểm.
///
/// Hàng đợi đơn điệu giảm nên mỗi giờ chỉ tốn O(1) khấu hao.
#[derive(Debug, Clone)]
pub struct TrailingMax {
    span: u32,
    entries: VecDeque<(u32, i32)>,
}

impl TrailingMax {
    pub fn new(span: u32) -> Self {
        Self {
            span: span.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, hour: u32, score: Option<i32>) -> Option<i32> {
        while self
            .entries
            .front()
            .is_some_and(|&(held, _)| hour.saturating_sub(held) >= self.span)
        {
            self.entries.pop_front();
        }
        if let Some(score) = score {
            while self.entries.back().is_some_and(|&(_, held)| held <= score) {
                self.entries.pop_back();
            }
            self.entries.push_back((hour, score));
        }
        self.entries.front().map(|&(_, score)| score)
    }
}

/// Tổng trong `span` giờ gần nhất; `None` khi cả cửa sổ không có số đo nào.
#[derive(Debug, Clone)]
pub struct TrailingSum {
    span: u32,
    entries: VecDeque<(u32, f64)>,
}

impl TrailingSum {
    pub fn new(span: u32) -> Self {
        Self {
            span: span.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, hour: u32, value: Option<f64>) -> Option<f64> {
        while self
            .entries
            .front()
            .is_some_and(|&(held, _)| hour.saturating_sub(held) >= self.span)
        {
            self.entries.pop_front();
        }
        if let Some(value) = value {
            self.entries.push_back((hour, value));
        }
        if self.entries.is_empty() {
            return None;
        }
        // Cộng lại từ đầu: trừ dần số thực sẽ lệch ở sát ngưỡng điểm.
        Some(self.entries.iter().map(|&(_, value)| value).sum())
    }
}

/// Ghép điểm từng giờ của một lượt nằm ICU theo cửa sổ trượt.
///
/// Các giờ phải được đưa vào theo thứ tự tăng dần; giờ đã trả ra không bị
/// tính lại.
#[derive(Debug, Clone)]
pub struct RollingCombiner {
    statics: StaticAttributes,
    urine: TrailingSum,
    maxima: Vec<(Component, TrailingMax)>,
    last_hour: Option<u32>,
}

impl RollingCombiner {
    pub fn new(statics: StaticAttributes, window_hours: u32) -> Self {
        Self {
            statics,
            urine: TrailingSum::new(window_hours),
            maxima: Component::ALL
                .into_iter()
                .filter(|component| component.is_windowed())
                .map(|component| (component, TrailingMax::new(window_hours)))
                .collect(),
            last_hour: None,
        }
    }

    pub fn push(&mut self, bucket: &HourBucket, aggregate: &HourAggregate) -> ScoredHour {
        debug_assert!(
            self.last_hour.map_or(true, |last| bucket.hour > last),
            "các giờ phải tăng dần"
        );
        self.last_hour = Some(bucket.hour);

        let urine_window = self.urine.push(bucket.hour, aggregate.urine_output);
        let raw_scores = score_hour(aggregate, &self.statics, urine_window);

        let mut window_scores = raw_scores;
        for (component, tracker) in &mut self.maxima {
            *window_scores.get_mut(*component) =
                tracker.push(bucket.hour, raw_scores.get(*component));
        }

        let oasis = window_scores.imputed_total();
        ScoredHour {
            stay_id: bucket.stay_id,
            hour: bucket.hour,
            start_time: bucket.start_time,
            end_time: bucket.end_time,
            raw_scores,
            window_scores,
            oasis,
            oasis_prob: mortality_probability(oasis),
        }
    }
}
