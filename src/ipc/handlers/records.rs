use crate::catalog::Entity;
use crate::ipc::error::{require_db, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{RecordStore, SqliteStore};
use serde_json::json;

fn records_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(req, "entity")?;
    let entity = Entity::parse(&name).ok_or_else(|| {
        HandlerErr::new("bad_params", format!("unknown entity: {name}"))
            .with_details(json!({ "known": Entity::ALL.map(Entity::as_str) }))
    })?;
    let conn = require_db(state)?;
    let records = SqliteStore::new(conn)
        .get_all(entity)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({
        "entity": entity,
        "count": records.len(),
        "records": records
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.list" => Some(respond(req, records_list(state, req))),
        _ => None,
    }
}
