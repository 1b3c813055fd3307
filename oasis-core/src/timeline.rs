//! Dựng chuỗi giờ `(start, end]` cho một lượt nằm ICU.

use chrono::Duration;

use crate::{HourBucket, IcuStay, StayError};

/// Một giờ cho mỗi giờ trọn hoặc lẻ từ lúc vào đến lúc ra ICU.
///
/// Giờ `h` có `end_time = intake + (h + 1) giờ` và `start_time = end_time - 1 giờ`.
pub fn build_timeline(stay: &IcuStay) -> Result<Vec<HourBucket>, StayError> {
    let intake = stay.intake_time.ok_or(StayError::MissingIntake)?;
    let end = stay.end_time.ok_or(StayError::MissingEnd)?;
    if end < intake {
        return Err(StayError::EndBeforeIntake { intake, end });
    }

    let buckets = (0..hour_count(end - intake))
        .map(|hour| {
            let end_time = intake + Duration::hours(i64::from(hour) + 1);
            HourBucket {
                stay_id: stay.stay_id,
                hour,
                start_time: end_time - Duration::hours(1),
                end_time,
            }
        })
        .collect();
    Ok(buckets)
}

/// Số giờ trọn hoặc lẻ trong một khoảng thời gian (làm tròn lên).
pub fn hour_count(length: Duration) -> u32 {
    let millis = length.num_milliseconds().max(0);
    let hour = Duration::hours(1).num_milliseconds();
    u32::try_from((millis + hour - 1) / hour).unwrap_or(u32::MAX)
}
