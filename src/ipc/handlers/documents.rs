use crate::auth::normalize_identifier;
use crate::blob::BlobStore;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::{Connection, OptionalExtension};
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Marksheet,
    Certificate,
}

impl DocumentKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "marksheet" => Some(DocumentKind::Marksheet),
            "certificate" => Some(DocumentKind::Certificate),
            _ => None,
        }
    }

    fn slug(self) -> &'static str {
        match self {
            DocumentKind::Marksheet => "marksheet",
            DocumentKind::Certificate => "certificate",
        }
    }
}

/// One blob per (student, kind); rebinding lands on the same key.
fn blob_key(roll: &str, kind: DocumentKind) -> String {
    format!("{}-{}.pdf", roll, kind.slug())
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

fn get_kind(params: &serde_json::Value) -> Result<DocumentKind, HandlerErr> {
    let raw = get_required_str(params, "kind")?;
    DocumentKind::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "kind must be Marksheet or Certificate".to_string(),
        details: None,
    })
}

fn require_student(conn: &Connection, roll: &str) -> Result<(), HandlerErr> {
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE roll_no = ?", [roll], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "unknown_student",
            message: format!("no student with roll {}", roll),
            details: None,
        });
    }
    Ok(())
}

fn documents_bind(
    conn: &Connection,
    docs: &dyn BlobStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = normalize_identifier(&get_required_str(params, "studentId")?);
    let kind = get_kind(params)?;
    let content = get_required_str(params, "contentBase64")?;
    let bytes = BASE64.decode(content.as_bytes()).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("contentBase64 is not valid base64: {}", e),
        details: None,
    })?;

    require_student(conn, &roll)?;

    let key = blob_key(&roll, kind);
    docs.put(&key, &bytes).map_err(|e| HandlerErr {
        code: "storage_error",
        message: format!("{e:?}"),
        details: Some(json!({ "blobKey": key })),
    })?;

    conn.execute(
        "INSERT INTO document_bindings(student_roll, kind, blob_key, updated_at)
         VALUES(?, ?, ?, datetime('now'))
         ON CONFLICT(student_roll, kind) DO UPDATE SET
           blob_key = excluded.blob_key,
           updated_at = excluded.updated_at",
        (&roll, kind.slug(), &key),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "document_bindings" })),
    })?;

    let url = docs.public_url(&key);
    Ok(json!({ "blobKey": key, "url": url }))
}

fn documents_resolve_url(
    conn: &Connection,
    docs: &dyn BlobStore,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll = normalize_identifier(&get_required_str(params, "studentId")?);
    let kind = get_kind(params)?;

    let bound_key: Option<String> = conn
        .query_row(
            "SELECT blob_key FROM document_bindings WHERE student_roll = ? AND kind = ?",
            (&roll, kind.slug()),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let Some(key) = bound_key else {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("no {} bound for {}", kind.slug(), roll),
            details: None,
        });
    };

    // Trust the backend's report of existence, nothing more.
    let Some(url) = docs.public_url(&key) else {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("blob missing for key {}", key),
            details: Some(json!({ "blobKey": key })),
        });
    };

    Ok(json!({ "blobKey": key, "url": url }))
}

fn with_stores(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &dyn BlobStore, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let (Some(conn), Some(docs)) = (state.db.as_ref(), state.docs.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, docs, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "documents.bind" => Some(with_stores(state, req, documents_bind)),
        "documents.resolveUrl" => Some(with_stores(state, req, documents_resolve_url)),
        _ => None,
    }
}
