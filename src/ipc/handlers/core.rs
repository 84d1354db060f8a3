use crate::auth::SharedSecrets;
use crate::blob::DirBlobStore;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let docs = match DirBlobStore::open(&path) {
        Ok(store) => store,
        Err(e) => return err(&req.id, "storage_error", format!("{e:?}"), None),
    };

    // Workspace-level override of the role-class secrets, used for parity
    // testing until per-principal verification replaces them.
    let mut secrets = SharedSecrets::default();
    if let Some(s) = req.params.get("staffSecret").and_then(|v| v.as_str()) {
        secrets.staff = s.to_string();
    }
    if let Some(s) = req.params.get("studentSecret").and_then(|v| v.as_str()) {
        secrets.student = s.to_string();
    }

    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.docs = Some(docs);
    state.verifier = Box::new(secrets);
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
