//! Logic lõi tính điểm OASIS theo từng giờ cho mỗi lượt nằm ICU.

use std::collections::{hash_map::Entry, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod admission;
pub mod aggregate;
pub mod pipeline;
pub mod score;
pub mod timeline;
pub mod window;

pub use pipeline::{score_cohort, score_cohort_inputs, score_stay, StayOutcome};

pub type StayId = i64;
pub type AdmissionId = i64;

/// Cấu hình cửa sổ trượt và quy tắc xác định giờ thở máy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OasisConfig {
    /// Số giờ của cửa sổ trượt, tính cả giờ hiện tại.
    pub window_hours: u32,
    /// Quy tắc đối chiếu đợt thở máy với từng giờ.
    pub ventilation_overlap: VentilationOverlap,
}

impl Default for OasisConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            ventilation_overlap: VentilationOverlap::default(),
        }
    }
}

impl OasisConfig {
    /// Kiểm tra cấu hình trước khi chạy cả lô.
    pub fn validate(&self) -> Result<(), OasisError> {
        if self.window_hours == 0 {
            return Err(OasisError::InvalidConfig(
                "window_hours phải lớn hơn 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cách coi một giờ `(start, end]` là đang thở máy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VentilationOverlap {
    /// Thời điểm đầu hoặc cuối của giờ nằm trong đợt thở máy.
    #[default]
    BoundaryInstants,
    /// Đợt thở máy giao với giờ ở bất kỳ đoạn nào.
    Interval,
}

impl FromStr for VentilationOverlap {
    type Err = OasisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "boundary_instants" | "boundary" => Ok(Self::BoundaryInstants),
            "interval" => Ok(Self::Interval),
            other => Err(OasisError::InvalidConfig(format!(
                "quy tắc thở máy không hợp lệ: {other}"
            ))),
        }
    }
}

/// Một lượt nằm ICU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IcuStay {
    pub stay_id: StayId,
    pub admission_id: Option<AdmissionId>,
    pub intake_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Thông tin nhập viện tĩnh, một dòng cho mỗi lượt nằm ICU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AdmissionFacts {
    pub stay_id: StayId,
    pub admission_time: Option<DateTime<Utc>>,
    pub admission_type: Option<String>,
    pub surgical: Option<bool>,
    pub age: Option<f64>,
}

/// Một lần đo chỉ số sống; từng chỉ số có thể vắng mặt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalReading {
    pub stay_id: StayId,
    pub charted_at: DateTime<Utc>,
    pub heart_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub mean_bp: Option<f64>,
    pub resp_rate: Option<f64>,
}

/// Điểm Glasgow tại một thời điểm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuroReading {
    pub stay_id: StayId,
    pub charted_at: DateTime<Utc>,
    pub gcs: f64,
}

/// Một đợt thở máy `[start, end]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VentilationEpisode {
    pub stay_id: StayId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Một lần ghi nhận lượng nước tiểu (mL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrineMeasurement {
    pub stay_id: StayId,
    pub charted_at: DateTime<Utc>,
    pub volume: f64,
}

/// Toàn bộ dữ liệu đầu vào của một lượt nằm ICU, đã gom đủ trước khi tính.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StayRecord {
    pub stay: IcuStay,
    pub admission: Option<AdmissionFacts>,
    pub vitals: Vec<VitalReading>,
    pub neuro: Vec<NeuroReading>,
    pub ventilation: Vec<VentilationEpisode>,
    pub urine_output: Vec<UrineMeasurement>,
}

impl StayRecord {
    pub fn new(stay: IcuStay) -> Self {
        Self {
            stay,
            ..Self::default()
        }
    }
}

/// Các bảng đầu vào của cả lô, chưa tách theo lượt nằm ICU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortInputs {
    pub stays: Vec<IcuStay>,
    pub admissions: Vec<AdmissionFacts>,
    pub vitals: Vec<VitalReading>,
    pub neuro: Vec<NeuroReading>,
    pub ventilation: Vec<VentilationEpisode>,
    pub urine_output: Vec<UrineMeasurement>,
}

impl CohortInputs {
    /// Tách các bảng thành từng `StayRecord`, giữ thứ tự của danh sách lượt nằm.
    ///
    /// Lượt nằm trùng mã chỉ giữ dòng đầu; thông tin nhập viện trùng cũng vậy.
    /// Sự kiện không thuộc lượt nằm nào bị bỏ qua.
    pub fn partition(self) -> Vec<StayRecord> {
        let mut index: HashMap<StayId, usize> = HashMap::with_capacity(self.stays.len());
        let mut records: Vec<StayRecord> = Vec::with_capacity(self.stays.len());

        for stay in self.stays {
            match index.entry(stay.stay_id) {
                Entry::Occupied(_) => {
                    tracing::debug!(stay_id = stay.stay_id, "bỏ qua lượt nằm ICU trùng mã");
                }
                Entry::Vacant(slot) => {
                    slot.insert(records.len());
                    records.push(StayRecord::new(stay));
                }
            }
        }

        let mut orphans = 0usize;
        for facts in self.admissions {
            match index.get(&facts.stay_id) {
                Some(&position) => {
                    let record = &mut records[position];
                    if record.admission.is_none() {
                        record.admission = Some(facts);
                    }
                }
                None => orphans += 1,
            }
        }

        orphans += route(self.vitals, &index, &mut records, |row| row.stay_id, |r| {
            &mut r.vitals
        });
        orphans += route(self.neuro, &index, &mut records, |row| row.stay_id, |r| {
            &mut r.neuro
        });
        orphans += route(
            self.ventilation,
            &index,
            &mut records,
            |row| row.stay_id,
            |r| &mut r.ventilation,
        );
        orphans += route(
            self.urine_output,
            &index,
            &mut records,
            |row| row.stay_id,
            |r| &mut r.urine_output,
        );

        if orphans > 0 {
            tracing::debug!(orphans, "bỏ qua dòng dữ liệu không thuộc lượt nằm ICU nào");
        }

        records
    }
}

fn route<T>(
    rows: Vec<T>,
    index: &HashMap<StayId, usize>,
    records: &mut [StayRecord],
    stay_of: fn(&T) -> StayId,
    sink: fn(&mut StayRecord) -> &mut Vec<T>,
) -> usize {
    let mut orphans = 0;
    for row in rows {
        match index.get(&stay_of(&row)) {
            Some(&position) => sink(&mut records[position]).push(row),
            None => orphans += 1,
        }
    }
    orphans
}

/// Một giờ `(start_time, end_time]` trong lượt nằm ICU.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourBucket {
    pub stay_id: StayId,
    pub hour: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Giá trị nhỏ nhất và lớn nhất của một chỉ số trong một giờ.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Extremes {
    pub min: f64,
    pub max: f64,
}

impl Extremes {
    /// `None` khi không có giá trị nào.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, value| {
            Some(match acc {
                None => Self {
                    min: value,
                    max: value,
                },
                Some(current) => Self {
                    min: current.min.min(value),
                    max: current.max.max(value),
                },
            })
        })
    }
}

/// Tổng hợp các luồng sự kiện trong một giờ.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HourAggregate {
    pub heart_rate: Option<Extremes>,
    pub temperature: Option<Extremes>,
    pub mean_bp: Option<Extremes>,
    pub resp_rate: Option<Extremes>,
    pub gcs_min: Option<f64>,
    /// Không bao giờ "không rõ": không giao với đợt thở máy nào nghĩa là `false`.
    pub mechvent: bool,
    pub urine_output: Option<f64>,
}

/// Thuộc tính không đổi theo thời gian của một lượt nằm ICU.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StaticAttributes {
    pub pre_icu_los: Option<Duration>,
    pub elective_surgery: Option<bool>,
    pub age: Option<f64>,
}

/// Mười thành phần của thang điểm OASIS.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    PreIcuLos,
    Age,
    Gcs,
    HeartRate,
    MeanBp,
    RespRate,
    Temperature,
    UrineOutput,
    Mechvent,
    ElectiveSurgery,
}

impl Component {
    pub const ALL: [Component; 10] = [
        Component::PreIcuLos,
        Component::Age,
        Component::Gcs,
        Component::HeartRate,
        Component::MeanBp,
        Component::RespRate,
        Component::Temperature,
        Component::UrineOutput,
        Component::Mechvent,
        Component::ElectiveSurgery,
    ];

    /// Thành phần lấy giá trị lớn nhất trong cửa sổ trượt.
    /// Thời gian trước ICU và phẫu thuật chương trình giữ nguyên giá trị gốc.
    pub const fn is_windowed(self) -> bool {
        !matches!(self, Component::PreIcuLos | Component::ElectiveSurgery)
    }

    /// Các mức điểm có thể có của thành phần.
    pub const fn points(self) -> &'static [i32] {
        match self {
            Component::PreIcuLos => &[0, 1, 2, 3, 5],
            Component::Age => &[0, 3, 6, 7, 9],
            Component::Gcs => &[0, 3, 4, 10],
            Component::HeartRate => &[0, 1, 3, 4, 6],
            Component::MeanBp => &[0, 2, 3, 4],
            Component::RespRate => &[0, 1, 6, 9, 10],
            Component::Temperature => &[0, 2, 3, 4, 6],
            Component::UrineOutput => &[0, 1, 5, 8, 10],
            Component::Mechvent => &[0, 9],
            Component::ElectiveSurgery => &[0, 6],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Component::PreIcuLos => "pre_icu_los",
            Component::Age => "age",
            Component::Gcs => "gcs",
            Component::HeartRate => "heart_rate",
            Component::MeanBp => "mean_bp",
            Component::RespRate => "resp_rate",
            Component::Temperature => "temperature",
            Component::UrineOutput => "urine_output",
            Component::Mechvent => "mechvent",
            Component::ElectiveSurgery => "elective_surgery",
        }
    }
}

/// Điểm của từng thành phần; `None` là chưa quan sát được, khác với 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ComponentScores {
    pub pre_icu_los: Option<i32>,
    pub age: Option<i32>,
    pub gcs: Option<i32>,
    pub heart_rate: Option<i32>,
    pub mean_bp: Option<i32>,
    pub resp_rate: Option<i32>,
    pub temperature: Option<i32>,
    pub urine_output: Option<i32>,
    pub mechvent: Option<i32>,
    pub elective_surgery: Option<i32>,
}

impl ComponentScores {
    pub fn get(&self, component: Component) -> Option<i32> {
        match component {
            Component::PreIcuLos => self.pre_icu_los,
            Component::Age => self.age,
            Component::Gcs => self.gcs,
            Component::HeartRate => self.heart_rate,
            Component::MeanBp => self.mean_bp,
            Component::RespRate => self.resp_rate,
            Component::Temperature => self.temperature,
            Component::UrineOutput => self.urine_output,
            Component::Mechvent => self.mechvent,
            Component::ElectiveSurgery => self.elective_surgery,
        }
    }

    pub fn get_mut(&mut self, component: Component) -> &mut Option<i32> {
        match component {
            Component::PreIcuLos => &mut self.pre_icu_los,
            Component::Age => &mut self.age,
            Component::Gcs => &mut self.gcs,
            Component::HeartRate => &mut self.heart_rate,
            Component::MeanBp => &mut self.mean_bp,
            Component::RespRate => &mut self.resp_rate,
            Component::Temperature => &mut self.temperature,
            Component::UrineOutput => &mut self.urine_output,
            Component::Mechvent => &mut self.mechvent,
            Component::ElectiveSurgery => &mut self.elective_surgery,
        }
    }

    /// Các thành phần chưa quan sát được.
    pub fn missing(&self) -> Vec<Component> {
        Component::ALL
            .into_iter()
            .filter(|component| self.get(*component).is_none())
            .collect()
    }

    /// Tổng điểm, thay giá trị thiếu bằng 0. Chỉ dùng ở bước cộng cuối cùng.
    pub fn imputed_total(&self) -> i32 {
        Component::ALL
            .into_iter()
            .map(|component| self.get(component).unwrap_or(0))
            .sum()
    }
}

/// Kết quả của một giờ; không thay đổi sau khi tạo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredHour {
    pub stay_id: StayId,
    pub hour: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub raw_scores: ComponentScores,
    /// Giá trị lớn nhất trong cửa sổ trượt, chưa thay giá trị thiếu.
    pub window_scores: ComponentScores,
    pub oasis: i32,
    pub oasis_prob: f64,
}

/// Vấn đề chất lượng dữ liệu ở mức lượt nằm ICU; không làm dừng cả lô.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    MalformedStay { stay_id: StayId, reason: String },
    InconsistentAdmission { stay_id: StayId },
}

impl DataQualityIssue {
    pub fn stay_id(&self) -> StayId {
        match self {
            DataQualityIssue::MalformedStay { stay_id, .. }
            | DataQualityIssue::InconsistentAdmission { stay_id } => *stay_id,
        }
    }
}

/// Kết quả của cả lô, các dòng sắp theo `(stay_id, hour)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CohortScores {
    pub stays: usize,
    pub rows: Vec<ScoredHour>,
    pub issues: Vec<DataQualityIssue>,
}

impl CohortScores {
    /// Các dòng của một lượt nằm ICU.
    pub fn rows_for(&self, stay_id: StayId) -> &[ScoredHour] {
        let start = self.rows.partition_point(|row| row.stay_id < stay_id);
        let end = self.rows.partition_point(|row| row.stay_id <= stay_id);
        &self.rows[start..end]
    }

    pub fn summary(&self) -> CohortSummary {
        let mut summary = CohortSummary {
            stays: self.stays,
            rows: self.rows.len(),
            peak_oasis: self.rows.iter().map(|row| row.oasis).max(),
            ..CohortSummary::default()
        };
        for issue in &self.issues {
            match issue {
                DataQualityIssue::MalformedStay { .. } => summary.malformed_stays += 1,
                DataQualityIssue::InconsistentAdmission { .. } => {
                    summary.inconsistent_admissions += 1
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CohortSummary {
    pub stays: usize,
    pub rows: usize,
    pub malformed_stays: usize,
    pub inconsistent_admissions: usize,
    pub peak_oasis: Option<i32>,
}

/// Lỗi khiến một lượt nằm ICU không dựng được chuỗi giờ.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StayError {
    #[error("thiếu thời điểm vào ICU")]
    MissingIntake,
    #[error("thiếu thời điểm ra ICU")]
    MissingEnd,
    #[error("thời điểm ra ({end}) trước thời điểm vào ({intake})")]
    EndBeforeIntake {
        intake: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Lỗi chung khi nạp dữ liệu hoặc cấu hình.
#[derive(Debug, thiserror::Error)]
pub enum OasisError {
    #[error("Dữ liệu đầu vào thiếu thông tin tối thiểu")]
    MissingData,
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
    #[error("Cấu hình không hợp lệ: {0}")]
    InvalidConfig(String),
    #[error("Lỗi khác: {0}")]
    Other(String),
}
