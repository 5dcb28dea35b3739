//! Scripted transport shared by the client and export tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::{ApiError, RawResponse, Transport};

#[derive(Debug, Clone)]
pub struct Call {
    pub verb: &'static str,
    pub url: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<RawResponse>,
    calls: Vec<Call>,
}

/// Transport that replays canned responses and records every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    headers: Vec<(String, String)>,
}

impl ScriptedTransport {
    pub fn push(&self, response: RawResponse) {
        self.script.lock().unwrap().responses.push_back(response);
    }

    pub fn push_json(&self, body: Value) {
        self.push(ok(&body.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    fn record(&self, verb: &'static str, url: &str, body: Option<&Value>) -> RawResponse {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            verb,
            url: url.to_string(),
            body: body.cloned(),
            headers: self.headers.clone(),
        });
        script.responses.pop_front().expect("no scripted response left")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, url: &str, body: Option<&Value>) -> Result<RawResponse, ApiError> {
        Ok(self.record("POST", url, body))
    }

    async fn delete(&self, url: &str, body: Option<&Value>) -> Result<RawResponse, ApiError> {
        Ok(self.record("DELETE", url, body))
    }

    fn set_headers(&mut self, headers: &[(&str, &str)]) -> Result<(), ApiError> {
        for (name, value) in headers {
            self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
            self.headers.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }
}

pub fn ok(body: &str) -> RawResponse {
    RawResponse {
        status: 200,
        headers: HeaderMap::new(),
        body: body.to_string(),
    }
}

pub fn login_response(token: &str) -> RawResponse {
    let mut headers = HeaderMap::new();
    headers.insert("Xsrf-Token", HeaderValue::from_str(token).unwrap());
    RawResponse {
        status: 200,
        headers,
        body: String::new(),
    }
}

