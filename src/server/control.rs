use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::protocol::control::{
    control_message::Kind, DeleteShardResponse, ExecutorInfo, ExecutorStatus, GetStatusResponse,
    ListResponse, StartResponse, StopResponse,
};
use crate::protocol::ControlMessage;
use crate::server::RequestHandler;
use crate::worker::LaunchSpec;

/// Answer a control message. Returns `None` when there is nothing to reply.
///
/// Errors from the request become the `error` field of the reply rather than
/// failing the connection.
pub async fn dispatch(handler: &RequestHandler, message: ControlMessage) -> Option<ControlMessage> {
    let reply = match message.kind? {
        Kind::StartRequest(req) => Kind::StartResponse(match handler.executors.launch(LaunchSpec::from(req)) {
            Ok(snapshot) => StartResponse {
                handle: snapshot.handle.to_string(),
                pid: snapshot.pid.unwrap_or_default(),
                error: String::new(),
            },
            Err(e) => StartResponse {
                error: e.to_string(),
                ..Default::default()
            },
        }),
        Kind::StopRequest(req) => {
            let result = match parse_handle(&req.handle) {
                Ok(handle) => handler.executors.stop(handle).await,
                Err(e) => Err(e),
            };
            Kind::StopResponse(StopResponse {
                error: error_text(result),
            })
        }
        Kind::GetStatusRequest(req) => {
            let status = parse_handle(&req.handle).and_then(|h| handler.executors.status(h));
            Kind::GetStatusResponse(match status {
                Ok(snapshot) => GetStatusResponse {
                    handle: req.handle,
                    status: ExecutorStatus::from(snapshot.state) as i32,
                    exit_code: snapshot.exit_code,
                    error: String::new(),
                },
                Err(e) => GetStatusResponse {
                    handle: req.handle,
                    status: ExecutorStatus::Unknown as i32,
                    exit_code: None,
                    error: e.to_string(),
                },
            })
        }
        Kind::ListRequest(_) => Kind::ListResponse(ListResponse {
            executors: handler
                .executors
                .list()
                .iter()
                .map(ExecutorInfo::from)
                .collect(),
        }),
        Kind::DeleteShardRequest(req) => Kind::DeleteShardResponse(match handler.store.delete(&req.name).await {
            Ok(deleted) => DeleteShardResponse {
                deleted,
                error: String::new(),
            },
            Err(e) => DeleteShardResponse {
                deleted: false,
                error: e.to_string(),
            },
        }),
        other => {
            tracing::warn!(kind = ?other, "Ignoring reply-type control message");
            return None;
        }
    };
    Some(ControlMessage::from(reply))
}

fn parse_handle(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AgentError::InvalidHandle(raw.to_string()))
}

fn error_text(result: Result<()>) -> String {
    result.err().map(|e| e.to_string()).unwrap_or_default()
}
