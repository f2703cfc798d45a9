use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    core::{
        orchestrator::AccessOrchestrator,
        types::{Credentials, PageRequest},
    },
    error::{ErrorKind, ExposedError},
};

use super::protocol::*;

pub struct BridgeHandler {
    orchestrator: Arc<AccessOrchestrator>,
}

impl BridgeHandler {
    pub fn new(orchestrator: Arc<AccessOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, req: BridgeRequest) -> BridgeResponse<Value> {
        if req.v != 1 {
            return BridgeResponse::err(
                req.v,
                req.id,
                ErrorKind::Validation.code(),
                format!("unsupported protocol version: {}", req.v),
            );
        }

        let session = req.session_id();
        let orch = &self.orchestrator;

        match req.cmd.as_str() {
            "connect" => match payload::<Credentials>(&req) {
                Ok(creds) => reply(&req, orch.connect(&session, &creds).await),
                Err(resp) => resp,
            },
            "tables" => reply(&req, orch.list_tables(&session).await),
            "columns" => match payload::<ColumnsPayload>(&req) {
                Ok(p) => reply(&req, orch.list_columns(&session, &p.table).await),
                Err(resp) => resp,
            },
            "page" => match payload::<PageRequest>(&req) {
                Ok(p) => reply(&req, orch.get_page(&session, &p).await),
                Err(resp) => resp,
            },
            "query" => match payload::<QueryPayload>(&req) {
                Ok(p) => reply(&req, orch.execute_query(&session, &p.sql).await),
                Err(resp) => resp,
            },
            "release" => BridgeResponse::ok(req.v, req.id, Value::Bool(orch.release(&session))),
            other => BridgeResponse::err(
                req.v,
                req.id.clone(),
                ErrorKind::Validation.code(),
                format!("unknown cmd: {other}"),
            ),
        }
    }
}

fn payload<T: DeserializeOwned>(req: &BridgeRequest) -> Result<T, BridgeResponse<Value>> {
    serde_json::from_value(req.payload.clone()).map_err(|e| {
        BridgeResponse::err(
            req.v,
            req.id.clone(),
            ErrorKind::Validation.code(),
            format!("invalid payload: {e}"),
        )
    })
}

fn reply<T: Serialize>(req: &BridgeRequest, res: Result<T, ExposedError>) -> BridgeResponse<Value> {
    match res.map(|data| serde_json::to_value(data)) {
        Ok(Ok(data)) => BridgeResponse::ok(req.v, req.id.clone(), data),
        Ok(Err(e)) => BridgeResponse::err(
            req.v,
            req.id.clone(),
            ErrorKind::Internal.code(),
            format!("failed to encode response: {e}"),
        ),
        Err(e) => BridgeResponse::err(req.v, req.id.clone(), e.code(), e.message),
    }
}
