use crate::auth::normalize_identifier;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats::{compute_stats, percentage, AttendanceStatus};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn student_exists(conn: &Connection, roll: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE roll_no = ?", [roll], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn require_student(conn: &Connection, roll: &str) -> Result<(), HandlerErr> {
    if student_exists(conn, roll)? {
        return Ok(());
    }
    Err(HandlerErr {
        code: "unknown_student",
        message: format!("no student with roll {}", roll),
        details: None,
    })
}

fn today_key() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Day granularity; explicit dates must be YYYY-MM-DD, otherwise today.
fn parse_date_param(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let Some(raw) = params.get("date").and_then(|v| v.as_str()) else {
        return Ok(today_key());
    };
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: "date must be YYYY-MM-DD".to_string(),
        details: None,
    })?;
    Ok(date.format("%Y-%m-%d").to_string())
}

fn parse_status_param(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, "status")?;
    AttendanceStatus::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "status must be Present or Absent".to_string(),
        details: None,
    })
}

fn attendance_mark(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = normalize_identifier(&get_required_str(params, "studentId")?);
    let status = parse_status_param(params)?;
    let date = parse_date_param(params)?;

    require_student(conn, &roll)?;

    // Single atomic upsert on the (student_roll, date) key: concurrent marks
    // for the same day resolve last-writer-wins with no duplicate rows.
    conn.execute(
        "INSERT INTO attendance_logs(id, student_roll, date, status, updated_at)
         VALUES(?, ?, ?, ?, datetime('now'))
         ON CONFLICT(student_roll, date) DO UPDATE SET
           status = excluded.status,
           updated_at = excluded.updated_at",
        (Uuid::new_v4().to_string(), &roll, &date, status.as_str()),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance_logs" })),
    })?;

    Ok(json!({
        "studentId": roll,
        "date": date,
        "status": status.as_str()
    }))
}

fn history_statuses(conn: &Connection, roll: &str) -> Result<Vec<(String, String)>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT date, status FROM attendance_logs
             WHERE student_roll = ?
             ORDER BY date DESC",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    stmt.query_map([roll], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn attendance_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = normalize_identifier(&get_required_str(params, "studentId")?);
    require_student(conn, &roll)?;

    let records: Vec<serde_json::Value> = history_statuses(conn, &roll)?
        .into_iter()
        .map(|(date, status)| {
            json!({
                "studentId": roll,
                "date": date,
                "status": status
            })
        })
        .collect();

    Ok(json!({ "records": records }))
}

fn attendance_stats(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = normalize_identifier(&get_required_str(params, "studentId")?);
    require_student(conn, &roll)?;

    let stats = compute_stats(
        history_statuses(conn, &roll)?
            .iter()
            .filter_map(|(_, s)| AttendanceStatus::parse(s)),
    );

    Ok(json!({
        "present": stats.present,
        "absent": stats.absent,
        "total": stats.total,
        "percentage": stats.percentage
    }))
}

fn attendance_today_snapshot(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let today = today_key();

    // Left join so a student with no record yet still shows up, with a null
    // status standing in for "no record yet".
    let mut stmt = conn
        .prepare(
            "SELECT s.roll_no, s.name, l.status
             FROM students s
             LEFT JOIN attendance_logs l
               ON l.student_roll = s.roll_no AND l.date = ?
             ORDER BY s.roll_no",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map([&today], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    let mut present: i64 = 0;
    let mut absent: i64 = 0;
    let mut unmarked: i64 = 0;
    let students: Vec<serde_json::Value> = rows
        .iter()
        .map(|(roll, name, status)| {
            match status.as_deref().and_then(AttendanceStatus::parse) {
                Some(AttendanceStatus::Present) => present += 1,
                Some(AttendanceStatus::Absent) => absent += 1,
                None => unmarked += 1,
            }
            json!({
                "studentId": roll,
                "displayName": name,
                "today": status
            })
        })
        .collect();

    let roster_size = rows.len() as i64;
    Ok(json!({
        "date": today,
        "students": students,
        "summary": {
            "present": present,
            "absent": absent,
            "unmarked": unmarked,
            "percentage": percentage(present, roster_size)
        }
    }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.history" => Some(with_conn(state, req, attendance_history)),
        "attendance.stats" => Some(with_conn(state, req, attendance_stats)),
        "attendance.todaySnapshot" => Some(with_conn(state, req, attendance_today_snapshot)),
        _ => None,
    }
}
