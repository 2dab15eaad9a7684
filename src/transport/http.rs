//! HTTP Transport
//!
//! Server side is an axum router exposing the two ping endpoints; client side
//! is a shared reqwest client. Bodies are encoded with the configured codec.
//!
//! Status codes: `200` answered, `400` undecodable body, `503` detector
//! overloaded or shutting down, `504` target of an indirect ping unreachable.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response as HttpResponse},
    routing::post,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Transport;
use super::inbound::{InboundReceiver, InboundSender, ReplyFailure};
use super::protocol::{ENDPOINT_PING_DIRECT, ENDPOINT_PING_INDIRECT, Request, RequestKind, Response};
use crate::codec::Codec;
use crate::error::TransportError;
use crate::membership::Peer;

pub struct HttpTransport {
    codec: Arc<dyn Codec>,
    http_client: reqwest::Client,
    inbound: InboundSender,
    incoming: Mutex<Option<InboundReceiver>>,
}

#[derive(Clone)]
struct HttpState {
    codec: Arc<dyn Codec>,
    inbound: InboundSender,
}

impl HttpTransport {
    pub fn new(codec: Arc<dyn Codec>, inbound: InboundSender, incoming: InboundReceiver) -> Self {
        Self {
            codec,
            http_client: reqwest::Client::new(),
            inbound,
            incoming: Mutex::new(Some(incoming)),
        }
    }

    /// Routes serving requests from other peers. Merge into the node's app.
    pub fn router(&self) -> Router {
        Router::new()
            .route(ENDPOINT_PING_DIRECT, post(ping_direct_handler))
            .route(ENDPOINT_PING_INDIRECT, post(ping_indirect_handler))
            .with_state(HttpState {
                codec: self.codec.clone(),
                inbound: self.inbound.clone(),
            })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn rpc(
        &self,
        peer: &Peer,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let Peer::Http(http_peer) = peer;
        let kind = request.kind();
        let url = format!("{}{}", http_peer.base_url(), kind.endpoint());

        tracing::debug!("About to make rpc to {}", url);

        let body = self.codec.encode_request(&request)?;

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, self.codec.content_type())
            .body(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, &url, timeout))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, &url, timeout))?;

        if status == reqwest::StatusCode::OK {
            return Ok(self.codec.decode_response(&bytes)?);
        }

        if status == reqwest::StatusCode::GATEWAY_TIMEOUT && kind == RequestKind::IndirectPing {
            return Err(TransportError::TargetUnreachable);
        }

        Err(TransportError::Remote {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    fn incoming_requests(&self) -> Option<InboundReceiver> {
        self.incoming.lock().ok()?.take()
    }
}

fn map_reqwest_error(e: reqwest::Error, url: &str, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(format!("rpc error to {}: {}", url, e))
    }
}

async fn ping_direct_handler(State(state): State<HttpState>, body: Bytes) -> HttpResponse {
    handle_ping(state, RequestKind::DirectPing, body).await
}

async fn ping_indirect_handler(State(state): State<HttpState>, body: Bytes) -> HttpResponse {
    handle_ping(state, RequestKind::IndirectPing, body).await
}

async fn handle_ping(state: HttpState, expected: RequestKind, body: Bytes) -> HttpResponse {
    let request = match state.codec.decode_request(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("Error decoding request body: {}", e);
            return api_error(StatusCode::BAD_REQUEST, "error decoding request body");
        }
    };

    if request.kind() != expected {
        return api_error(
            StatusCode::BAD_REQUEST,
            &format!("expected {} request", expected.as_str()),
        );
    }

    match state.inbound.submit(request).await {
        Ok(Ok(response)) => api_response(state.codec.as_ref(), &response),
        Ok(Err(ReplyFailure::TargetUnreachable)) => {
            api_error(StatusCode::GATEWAY_TIMEOUT, "target peer did not answer")
        }
        Err(e) => api_error(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    }
}

fn api_response(codec: &dyn Codec, response: &Response) -> HttpResponse {
    match codec.encode_response(response) {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, codec.content_type()),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Error sending API response: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "error encoding response")
        }
    }
}

fn api_error(code: StatusCode, message: &str) -> HttpResponse {
    (
        code,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        message.to_string(),
    )
        .into_response()
}
