//! Pure attendance arithmetic shared by the ledger handlers.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        // Accept the single-letter stamps the marking UI sends alongside
        // the stored long form.
        match raw.trim() {
            "P" | "p" => Some(AttendanceStatus::Present),
            "A" | "a" => Some(AttendanceStatus::Absent),
            s if s.eq_ignore_ascii_case("present") => Some(AttendanceStatus::Present),
            s if s.eq_ignore_ascii_case("absent") => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub present: i64,
    pub absent: i64,
    pub total: i64,
    pub percentage: i64,
}

/// Half-up integer rounding of `100 * present / total`:
/// `Int(100*p/t + 0.5)`.
pub fn percentage(present: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((100.0 * present as f64 / total as f64) + 0.5).floor() as i64
}

pub fn compute_stats<I>(statuses: I) -> AttendanceStats
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut present: i64 = 0;
    let mut absent: i64 = 0;
    for s in statuses {
        match s {
            AttendanceStatus::Present => present += 1,
            AttendanceStatus::Absent => absent += 1,
        }
    }
    let total = present + absent;
    AttendanceStats {
        present,
        absent,
        total,
        percentage: percentage(present, total),
    }
}
