//! Shared test utilities: a scripted transport and response builders.
//!
//! The scripted transport replays a fixed queue of responses and records
//! every request it receives, so login-flow tests can assert both the
//! terminal outcome and the exact request sequence (URLs, Referer headers,
//! Cookie headers).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use campus_session::{Transport, TransportError, TransportRequest, TransportResponse};

/// Transport that pops pre-scripted responses in order and records requests.
///
/// Running out of scripted responses yields a timeout error, which makes an
/// over-long flow fail loudly instead of hanging.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: impl IntoIterator<Item = TransportResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// All requests performed so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::timeout(&url))
    }
}

pub fn ok(body: &str) -> TransportResponse {
    TransportResponse {
        status: 200,
        location: None,
        set_cookies: Vec::new(),
        body: body.to_string(),
    }
}

pub fn ok_with_cookies(body: &str, cookies: &[&str]) -> TransportResponse {
    TransportResponse {
        set_cookies: cookies.iter().map(ToString::to_string).collect(),
        ..ok(body)
    }
}

pub fn redirect(location: &str) -> TransportResponse {
    TransportResponse {
        status: 302,
        location: Some(location.to_string()),
        set_cookies: Vec::new(),
        body: String::new(),
    }
}

pub fn redirect_with_cookies(location: &str, cookies: &[&str]) -> TransportResponse {
    TransportResponse {
        set_cookies: cookies.iter().map(ToString::to_string).collect(),
        ..redirect(location)
    }
}

/// A CAS login page body carrying the given transaction token.
pub fn cas_login_page(token: &str) -> String {
    format!(
        r#"<html><body><form id="casLoginForm" method="post">
            <input type="hidden" name="lt" value="{token}" />
            <input type="hidden" name="execution" value="e1s1" />
            <input type="hidden" name="_eventId" value="submit" />
        </form></body></html>"#
    )
}
