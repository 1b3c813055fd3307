//! Thuộc tính tĩnh của lượt nằm ICU, lấy từ thông tin nhập viện.

use crate::{AdmissionFacts, IcuStay, StaticAttributes};

/// Tính một lần cho mỗi lượt nằm; thiếu thông tin nhập viện thì mọi thuộc tính đều thiếu.
pub fn resolve_static(stay: &IcuStay, facts: Option<&AdmissionFacts>) -> StaticAttributes {
    let Some(facts) = facts else {
        return StaticAttributes::default();
    };

    StaticAttributes {
        pre_icu_los: match (stay.intake_time, facts.admission_time) {
            (Some(intake), Some(admitted)) => Some(intake - admitted),
            _ => None,
        },
        elective_surgery: elective_surgery(facts.admission_type.as_deref(), facts.surgical),
        age: facts.age,
    }
}

/// `None` nếu thiếu loại nhập viện hoặc cờ phẫu thuật.
pub fn elective_surgery(admission_type: Option<&str>, surgical: Option<bool>) -> Option<bool> {
    let admission_type = admission_type?;
    let surgical = surgical?;
    Some(admission_type.trim().eq_ignore_ascii_case("elective") && surgical)
}
