use crate::auth::{normalize_identifier, PrincipalKind, ADMIN_EMPLOYEE_ID};
use crate::blob::BlobStore;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, ErrorCode};
use serde_json::json;

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

fn get_kind(params: &serde_json::Value) -> Result<PrincipalKind, HandlerErr> {
    let raw = get_required_str(params, "kind")?;
    PrincipalKind::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "kind must be teacher or student".to_string(),
        details: None,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}

fn roster_register(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_kind(params)?;
    let identifier = normalize_identifier(&get_required_str(params, "identifier")?);
    let name = get_required_str(params, "name")?.trim().to_uppercase();

    // Rejected before any store call.
    if identifier.is_empty() || name.is_empty() {
        return Err(HandlerErr {
            code: "validation_error",
            message: "identifier and name must be non-empty".to_string(),
            details: None,
        });
    }

    // Uniqueness is the primary key's job, not a prior existence check;
    // two concurrent registrations cannot both succeed.
    let sql = format!(
        "INSERT INTO {}({}, name, created_at) VALUES(?, ?, datetime('now'))",
        kind.table(),
        kind.id_column()
    );
    conn.execute(&sql, (&identifier, &name)).map_err(|e| {
        if is_unique_violation(&e) {
            HandlerErr {
                code: "duplicate_identifier",
                message: format!("{} already registered", identifier),
                details: Some(json!({ "field": kind.id_column() })),
            }
        } else {
            HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": kind.table() })),
            }
        }
    })?;

    Ok(json!({ "identifier": identifier, "displayName": name }))
}

fn roster_rename(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_kind(params)?;
    let identifier = normalize_identifier(&get_required_str(params, "identifier")?);
    let name = get_required_str(params, "name")?.trim().to_uppercase();

    if name.is_empty() {
        return Err(HandlerErr {
            code: "validation_error",
            message: "name must be non-empty".to_string(),
            details: None,
        });
    }

    let sql = format!(
        "UPDATE {} SET name = ? WHERE {} = ?",
        kind.table(),
        kind.id_column()
    );
    let changed = conn
        .execute(&sql, (&name, &identifier))
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": kind.table() })),
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("{} not found", identifier),
            details: None,
        });
    }

    Ok(json!({ "identifier": identifier, "displayName": name }))
}

fn roster_remove(
    conn: &Connection,
    docs: &dyn BlobStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_kind(params)?;
    let identifier = normalize_identifier(&get_required_str(params, "identifier")?);

    // The reserved admin row is the only path into the admin role; deleting
    // it would brick the workspace.
    if kind == PrincipalKind::Teacher && identifier == ADMIN_EMPLOYEE_ID {
        return Err(HandlerErr {
            code: "validation_error",
            message: "the reserved administrator cannot be removed".to_string(),
            details: None,
        });
    }

    if kind == PrincipalKind::Teacher {
        let changed = conn
            .execute("DELETE FROM teachers WHERE employee_id = ?", [&identifier])
            .map_err(|e| HandlerErr {
                code: "db_update_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "teachers" })),
            })?;
        if changed == 0 {
            return Err(HandlerErr {
                code: "not_found",
                message: format!("{} not found", identifier),
                details: None,
            });
        }
        return Ok(json!({ "removed": identifier }));
    }

    // Student removal cascades: roll numbers are reused across cohorts, so
    // orphaned history would attach to the wrong person.
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;

    let mut stmt = tx
        .prepare("SELECT blob_key FROM document_bindings WHERE student_roll = ?")
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let blob_keys = stmt
        .query_map([&identifier], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    drop(stmt);

    tx.execute(
        "DELETE FROM attendance_logs WHERE student_roll = ?",
        [&identifier],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance_logs" })),
    })?;
    tx.execute(
        "DELETE FROM document_bindings WHERE student_roll = ?",
        [&identifier],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "document_bindings" })),
    })?;
    let changed = tx
        .execute("DELETE FROM students WHERE roll_no = ?", [&identifier])
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students" })),
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("{} not found", identifier),
            details: None,
        });
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    // Blobs go after the rows; the binding table is the source of truth and
    // no longer references these keys.
    for key in &blob_keys {
        docs.remove(key).map_err(|e| HandlerErr {
            code: "storage_error",
            message: format!("{e:?}"),
            details: Some(json!({ "blobKey": key })),
        })?;
    }

    Ok(json!({ "removed": identifier, "cascadedBlobs": blob_keys.len() }))
}

fn roster_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = get_kind(params)?;
    let sql = format!(
        "SELECT {}, name, created_at FROM {} ORDER BY created_at DESC, rowid DESC",
        kind.id_column(),
        kind.table()
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    let rows = stmt
        .query_map([], |r| {
            let identifier: String = r.get(0)?;
            let name: String = r.get(1)?;
            let created_at: Option<String> = r.get(2)?;
            Ok(json!({
                "identifier": identifier,
                "displayName": name,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    Ok(json!({ "principals": rows }))
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

fn handle_roster_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(docs)) = (state.db.as_ref(), state.docs.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match roster_remove(conn, docs, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.register" => Some(with_conn(state, req, roster_register)),
        "roster.rename" => Some(with_conn(state, req, roster_rename)),
        "roster.remove" => Some(handle_roster_remove(state, req)),
        "roster.list" => Some(with_conn(state, req, roster_list)),
        _ => None,
    }
}
