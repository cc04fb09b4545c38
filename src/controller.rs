//! Request lifecycle for the two mutating provisioning calls.
//!
//! The controller accepts at most one request at a time. An accepted request
//! runs on its own task and reports back through a [`Completion`] that the
//! owner of the controller passes to [`RequestController::complete`].

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::{ClientError, ProvisionerApi, RawReply};
use crate::input::InputState;
use crate::models::{OperationKind, ProvisionRequest, ValidationError};

pub const GENERIC_SUCCESS: &str = "Request completed successfully";
pub const GENERIC_FAILURE: &str = "Request was rejected by the server";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        message: String,
        job_id: Option<String>,
    },
    ServerRejected {
        status: u16,
        detail: String,
    },
    TransportFailure(String),
    ValidationFailed(ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Outcome {
    pub fn severity(&self) -> Severity {
        match self {
            Outcome::Success { .. } => Severity::Info,
            Outcome::ValidationFailed(_) => Severity::Warning,
            Outcome::ServerRejected { .. } | Outcome::TransportFailure(_) => Severity::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { message, job_id: None } => f.write_str(message),
            Outcome::Success {
                message,
                job_id: Some(job_id),
            } => write!(f, "{} (job {})", message, job_id),
            Outcome::ServerRejected { status, detail } => {
                write!(f, "Server rejected request (HTTP {}): {}", status, detail)
            }
            Outcome::TransportFailure(reason) => write!(f, "Request failed: {}", reason),
            Outcome::ValidationFailed(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    Validating,
    InFlight(OperationKind),
    Completed(Outcome),
}

impl RequestState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RequestState::InFlight(_))
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            RequestState::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Text shown for a state: the busy label while in flight, the last outcome
/// once completed, nothing otherwise.
pub fn status_message(state: &RequestState) -> String {
    match state {
        RequestState::Idle | RequestState::Validating => String::new(),
        RequestState::InFlight(kind) => kind.busy_label().to_string(),
        RequestState::Completed(outcome) => outcome.to_string(),
    }
}

/// Result of a finished provisioning call, posted back by the request task.
#[derive(Debug)]
pub struct Completion {
    pub kind: OperationKind,
    pub reply: Result<RawReply, ClientError>,
}

/// What `trigger` did with a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Sent(ProvisionRequest),
    Rejected(ValidationError),
    Ignored,
}

pub struct RequestController<A: ProvisionerApi + ?Sized> {
    api: Arc<A>,
    state: watch::Sender<RequestState>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl<A: ProvisionerApi + ?Sized> RequestController<A> {
    pub fn new(api: Arc<A>) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(RequestState::Idle);
        (
            Self {
                api,
                state,
                completions,
            },
            rx,
        )
    }

    pub fn state(&self) -> RequestState {
        self.state.borrow().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().is_in_flight()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    /// Validates the current input and, if valid, starts the request on a
    /// new task. Must be called from within a tokio runtime.
    pub fn trigger(&mut self, kind: OperationKind, input: &InputState) -> Dispatch {
        if self.is_in_flight() {
            warn!(%kind, "request already in flight, ignoring trigger");
            return Dispatch::Ignored;
        }

        self.transition(RequestState::Validating);
        let identity = input.current_identity();
        if let Err(e) = identity.validate() {
            warn!(%kind, error = %e, "input validation failed");
            self.transition(RequestState::Completed(Outcome::ValidationFailed(e)));
            return Dispatch::Rejected(e);
        }

        let request = ProvisionRequest::from(&identity);
        self.transition(RequestState::InFlight(kind));
        debug!(%kind, instance = %request.instance_name, "dispatching request");

        let api = Arc::clone(&self.api);
        let completions = self.completions.clone();
        let payload = request.clone();
        tokio::spawn(async move {
            let reply = api.submit(kind, &payload).await;
            // Receiver gone means the panel is shutting down
            let _ = completions.send(Completion { kind, reply });
        });

        Dispatch::Sent(request)
    }

    /// Applies the terminal transition for an in-flight request. Returns
    /// `None` if no request of that kind is in flight.
    pub fn complete(&mut self, completion: Completion) -> Option<Outcome> {
        let expected = RequestState::InFlight(completion.kind);
        let matches = *self.state.borrow() == expected;
        if !matches {
            warn!(kind = %completion.kind, "dropping completion with no matching request");
            return None;
        }

        let outcome = interpret(completion.reply);
        match &outcome {
            Outcome::Success { message, job_id } => {
                info!(kind = %completion.kind, %message, job_id = ?job_id, "request succeeded")
            }
            Outcome::ServerRejected { status, detail } => {
                warn!(kind = %completion.kind, status, %detail, "request rejected")
            }
            Outcome::TransportFailure(reason) => {
                warn!(kind = %completion.kind, %reason, "request failed")
            }
            Outcome::ValidationFailed(_) => {}
        }

        self.transition(RequestState::Completed(outcome.clone()));
        Some(outcome)
    }

    fn transition(&self, next: RequestState) {
        self.state.send_replace(next);
    }
}

/// Maps a provisioning reply to its outcome.
pub fn interpret(reply: Result<RawReply, ClientError>) -> Outcome {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => return Outcome::TransportFailure(e.reason()),
    };

    let mut body = match reply_object(&reply.body) {
        Ok(body) => body,
        Err(reason) => return Outcome::TransportFailure(reason),
    };

    if reply.status.is_success() {
        Outcome::Success {
            message: body
                .remove("message")
                .and_then(detail_text)
                .unwrap_or_else(|| GENERIC_SUCCESS.to_string()),
            job_id: body.remove("job_id").and_then(job_id_text),
        }
    } else {
        Outcome::ServerRejected {
            status: reply.status.as_u16(),
            detail: body
                .remove("detail")
                .and_then(detail_text)
                .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
        }
    }
}

/// Reply bodies must be JSON objects; individual fields are read leniently.
fn reply_object(body: &[u8]) -> Result<Map<String, Value>, String> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!(
            "Failed to parse response: expected a JSON object, found {}",
            other
        )),
        Err(e) => Err(ClientError::from(e).reason()),
    }
}

fn detail_text(detail: Value) -> Option<String> {
    match detail {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn job_id_text(job_id: Value) -> Option<String> {
    match job_id {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
