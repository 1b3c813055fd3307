//! Gom các luồng sự kiện lâm sàng vào từng giờ `(start, end]`.

use chrono::{DateTime, Utc};

use crate::{
    Extremes, HourAggregate, HourBucket, StayRecord, VentilationEpisode, VentilationOverlap,
};

/// Tổng hợp từng giờ của một lượt nằm ICU, cùng thứ tự với `buckets`.
pub fn aggregate_stay(
    record: &StayRecord,
    buckets: &[HourBucket],
    overlap: VentilationOverlap,
) -> Vec<HourAggregate> {
    let vitals = sorted_by_time(&record.vitals, |row| row.charted_at);
    let neuro = sorted_by_time(&record.neuro, |row| row.charted_at);
    let urine = sorted_by_time(&record.urine_output, |row| row.charted_at);

    buckets
        .iter()
        .map(|bucket| {
            let vitals = in_window(&vitals, bucket, |row| row.charted_at);
            let neuro = in_window(&neuro, bucket, |row| row.charted_at);
            let urine = in_window(&urine, bucket, |row| row.charted_at);

            HourAggregate {
                heart_rate: Extremes::of(vitals.iter().filter_map(|v| v.heart_rate)),
                temperature: Extremes::of(vitals.iter().filter_map(|v| v.temperature)),
                mean_bp: Extremes::of(vitals.iter().filter_map(|v| v.mean_bp)),
                resp_rate: Extremes::of(vitals.iter().filter_map(|v| v.resp_rate)),
                gcs_min: neuro.iter().map(|n| n.gcs).reduce(f64::min),
                mechvent: record
                    .ventilation
                    .iter()
                    .any(|episode| is_ventilated(episode, bucket, overlap)),
                urine_output: if urine.is_empty() {
                    None
                } else {
                    Some(urine.iter().map(|u| u.volume).sum())
                },
            }
        })
        .collect()
}

/// Giờ `(s, e]` có thuộc đợt thở máy `[start, end]` hay không.
///
/// `BoundaryInstants`: `e` nằm trong `[start, end]`, hoặc `s` nằm trong `[start, end)`.
/// Đợt thở máy ngắn nằm gọn trong một giờ không được tính.
pub fn is_ventilated(
    episode: &VentilationEpisode,
    bucket: &HourBucket,
    rule: VentilationOverlap,
) -> bool {
    let (start, end) = (bucket.start_time, bucket.end_time);
    match rule {
        VentilationOverlap::BoundaryInstants => {
            (episode.start <= end && end <= episode.end)
                || (episode.start <= start && start < episode.end)
        }
        VentilationOverlap::Interval => episode.start <= end && episode.end > start,
    }
}

fn sorted_by_time<T>(rows: &[T], at: impl Fn(&T) -> DateTime<Utc>) -> Vec<&T> {
    let mut sorted: Vec<&T> = rows.iter().collect();
    sorted.sort_by_key(|row| at(*row));
    sorted
}

fn in_window<'s, 'a, T>(
    sorted: &'s [&'a T],
    bucket: &HourBucket,
    at: impl Fn(&T) -> DateTime<Utc>,
) -> &'s [&'a T] {
    let lower = sorted.partition_point(|row| at(*row) <= bucket.start_time);
    let upper = sorted.partition_point(|row| at(*row) <= bucket.end_time);
    &sorted[lower..upper]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{timeline::build_timeline, IcuStay, NeuroReading, UrineMeasurement, VitalReading};
    use chrono::{Duration, TimeZone};

    const STAY: i64 = 300002;

    fn intake() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2150, 6, 2, 11, 0, 0).unwrap()
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        intake() + Duration::minutes(minutes)
    }

    fn record(hours: i64) -> StayRecord {
        StayRecord::new(IcuStay {
            stay_id: STAY,
            admission_id: None,
            intake_time: Some(intake()),
            end_time: Some(intake() + Duration::hours(hours)),
        })
    }

    fn vital(minutes: i64, heart_rate: Option<f64>, temperature: Option<f64>) -> VitalReading {
        VitalReading {
            stay_id: STAY,
            charted_at: at(minutes),
            heart_rate,
            temperature,
            mean_bp: None,
            resp_rate: None,
        }
    }

    fn episode(start: i64, end: i64) -> VentilationEpisode {
        VentilationEpisode {
            stay_id: STAY,
            start: at(start),
            end: at(end),
        }
    }

    fn aggregate(record: &StayRecord, overlap: VentilationOverlap) -> Vec<HourAggregate> {
        let buckets = build_timeline(&record.stay).unwrap();
        aggregate_stay(record, &buckets, overlap)
    }

    #[test]
    fn vitals_use_half_open_windows() {
        let mut record = record(2);
        record.vitals = vec![
            vital(0, Some(150.0), None),
            vital(60, Some(70.0), Some(36.6)),
            vital(90, Some(130.0), None),
        ];

        let hours = aggregate(&record, VentilationOverlap::default());

        assert_eq!(
            hours[0].heart_rate,
            Some(Extremes {
                min: 70.0,
                max: 70.0
            })
        );
        assert_eq!(
            hours[0].temperature,
            Some(Extremes {
                min: 36.6,
                max: 36.6
            })
        );
        assert_eq!(
            hours[1].heart_rate,
            Some(Extremes {
                min: 130.0,
                max: 130.0
            })
        );
        assert_eq!(hours[1].temperature, None);
        assert_eq!(hours[1].mean_bp, None);
    }

    #[test]
    fn gcs_takes_lowest_reading() {
        let mut record = record(1);
        record.neuro = [15.0, 6.0, 11.0]
            .into_iter()
            .enumerate()
            .map(|(i, gcs)| NeuroReading {
                stay_id: STAY,
                charted_at: at(10 + i as i64 * 10),
                gcs,
            })
            .collect();

        let hours = aggregate(&record, VentilationOverlap::default());
        assert_eq!(hours[0].gcs_min, Some(6.0));
    }

    #[test]
    fn urine_is_summed_and_missing_without_measurements() {
        let mut record = record(2);
        record.urine_output = vec![
            UrineMeasurement {
                stay_id: STAY,
                charted_at: at(15),
                volume: 120.0,
            },
            UrineMeasurement {
                stay_id: STAY,
                charted_at: at(45),
                volume: 0.0,
            },
        ];

        let hours = aggregate(&record, VentilationOverlap::default());
        assert_eq!(hours[0].urine_output, Some(120.0));
        assert_eq!(hours[1].urine_output, None);
    }

    #[test]
    fn ventilation_boundary_rule_matches_episode_hours() {
        let mut record = record(8);
        record.ventilation = vec![episode(130, 300)];

        let flags: Vec<bool> = aggregate(&record, VentilationOverlap::BoundaryInstants)
            .iter()
            .map(|hour| hour.mechvent)
            .collect();

        assert_eq!(
            flags,
            vec![false, false, true, true, true, false, false, false]
        );
    }

    #[test]
    fn short_episode_only_counts_under_interval_rule() {
        let mut record = record(3);
        record.ventilation = vec![episode(70, 100)];

        let boundary = aggregate(&record, VentilationOverlap::BoundaryInstants);
        assert!(boundary.iter().all(|hour| !hour.mechvent));

        let interval = aggregate(&record, VentilationOverlap::Interval);
        assert_eq!(
            interval.iter().map(|h| h.mechvent).collect::<Vec<_>>(),
            vec![false, true, false]
        );
    }

    #[test]
    fn overlapping_episodes_are_harmless() {
        let mut record = record(3);
        record.ventilation = vec![episode(0, 120), episode(30, 150)];

        let hours = aggregate(&record, VentilationOverlap::default());
        assert_eq!(
            hours.iter().map(|h| h.mechvent).collect::<Vec<_>>(),
            vec![true, true, true]
        );
    }
}
