use crate::auth::{normalize_identifier, role_for, PrincipalKind, SecretVerifier};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
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

// Deliberately generic: never reveals which table or field failed.
fn invalid_credentials() -> HandlerErr {
    HandlerErr {
        code: "invalid_credentials",
        message: "invalid credentials".to_string(),
        details: None,
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

fn lookup_name(
    conn: &Connection,
    kind: PrincipalKind,
    identifier: &str,
) -> Result<Option<String>, HandlerErr> {
    let sql = format!(
        "SELECT name FROM {} WHERE {} = ?",
        kind.table(),
        kind.id_column()
    );
    conn.query_row(&sql, [identifier], |r| r.get::<_, String>(0))
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })
}

fn auth_resolve(
    conn: &Connection,
    verifier: &dyn SecretVerifier,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let identifier = normalize_identifier(&get_required_str(params, "identifier")?);
    let secret = get_required_str(params, "secret")?;

    // Teachers win on an identifier collision across kinds; an unverified
    // teacher match still falls through to the student lookup.
    for kind in [PrincipalKind::Teacher, PrincipalKind::Student] {
        if let Some(name) = lookup_name(conn, kind, &identifier)? {
            if verifier.verify(kind, &identifier, &secret) {
                return Ok(json!({
                    "identifier": identifier,
                    "displayName": name,
                    "role": role_for(kind, &identifier).as_str()
                }));
            }
        }
    }

    Err(invalid_credentials())
}

fn handle_auth_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match auth_resolve(conn, state.verifier.as_ref(), &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.resolve" => Some(handle_auth_resolve(state, req)),
        _ => None,
    }
}
