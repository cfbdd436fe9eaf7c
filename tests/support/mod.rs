#![allow(dead_code, clippy::unwrap_used)]

use anyhow::Result;
use holdfast::{
    mailbox::{MailMessage, Mailbox},
    remote::BoxFuture,
    AuthOutcome, CallError, RemoteClient,
};
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Platform client whose answers are queued up front. Unscripted logins and
/// challenge completions succeed; unscripted calls echo the endpoint.
#[derive(Default)]
pub struct FakeClient {
    logins: Mutex<VecDeque<AuthOutcome>>,
    completions: Mutex<VecDeque<AuthOutcome>>,
    replies: Mutex<HashMap<String, VecDeque<Result<Value, CallError>>>>,
    state: Mutex<Map<String, Value>>,
    loaded: Mutex<Vec<Map<String, Value>>>,
    authenticate_calls: Mutex<u32>,
    codes: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    proxy: Mutex<Option<String>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_login(&self, outcome: AuthOutcome) -> &Self {
        self.logins.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_completion(&self, outcome: AuthOutcome) -> &Self {
        self.completions.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_call(&self, endpoint: &str, reply: Result<Value, CallError>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn authenticate_calls(&self) -> u32 {
        *self.authenticate_calls.lock().unwrap()
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<Map<String, Value>> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn proxy(&self) -> Option<String> {
        self.proxy.lock().unwrap().clone()
    }

    fn issue_session(&self, identity: &str, serial: u32) {
        let settings = json!({
            "cookies": { "sessionid": format!("{identity}-{serial}") },
            "uuids": { "device_id": format!("android-{identity}") },
        });
        if let Value::Object(map) = settings {
            *self.state.lock().unwrap() = map;
        }
    }
}

impl RemoteClient for FakeClient {
    fn authenticate<'a>(
        &'a self,
        identity: &'a str,
        _credential: &'a SecretString,
    ) -> BoxFuture<'a, AuthOutcome> {
        Box::pin(async move {
            let serial = {
                let mut calls = self.authenticate_calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            let outcome = self
                .logins
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(AuthOutcome::Authenticated);
            if outcome == AuthOutcome::Authenticated {
                self.issue_session(identity, serial);
            }
            outcome
        })
    }

    fn complete_challenge<'a>(&'a self, code: &'a str) -> BoxFuture<'a, AuthOutcome> {
        Box::pin(async move {
            self.codes.lock().unwrap().push(code.to_string());
            let outcome = self
                .completions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(AuthOutcome::Authenticated);
            if outcome == AuthOutcome::Authenticated {
                self.issue_session("verified", 100 + self.codes.lock().unwrap().len() as u32);
            }
            outcome
        })
    }

    fn call<'a>(
        &'a self,
        endpoint: &'a str,
        _args: &'a Value,
    ) -> BoxFuture<'a, Result<Value, CallError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(endpoint.to_string());
            self.replies
                .lock()
                .unwrap()
                .get_mut(endpoint)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(json!({ "endpoint": endpoint })))
        })
    }

    fn set_session_state(&self, settings: &Map<String, Value>) {
        self.loaded.lock().unwrap().push(settings.clone());
        *self.state.lock().unwrap() = settings.clone();
    }

    fn session_state(&self) -> Map<String, Value> {
        self.state.lock().unwrap().clone()
    }

    fn set_proxy(&self, proxy: &SecretString) {
        use secrecy::ExposeSecret;
        *self.proxy.lock().unwrap() = Some(proxy.expose_secret().to_string());
    }
}

/// Mailbox where each message becomes visible from a given fetch onward.
#[derive(Default)]
pub struct FakeMailbox {
    pending: Mutex<Vec<(u32, MailMessage)>>,
    seen: Mutex<Vec<String>>,
    fetches: Mutex<u32>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, visible_from_fetch: u32, message: MailMessage) -> &Self {
        self.pending
            .lock()
            .unwrap()
            .push((visible_from_fetch, message));
        self
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Mailbox for FakeMailbox {
    fn fetch_unseen(&self, limit: usize) -> BoxFuture<'_, Result<Vec<MailMessage>>> {
        Box::pin(async move {
            let fetch = {
                let mut fetches = self.fetches.lock().unwrap();
                *fetches += 1;
                *fetches
            };
            let seen = self.seen.lock().unwrap().clone();
            let mut visible: Vec<MailMessage> = self
                .pending
                .lock()
                .unwrap()
                .iter()
                .filter(|(from, message)| *from <= fetch && !seen.contains(&message.id))
                .map(|(_, message)| message.clone())
                .collect();
            visible.sort_by(|a, b| b.received_order.cmp(&a.received_order));
            visible.truncate(limit);
            Ok(visible)
        })
    }

    fn mark_seen<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(id.to_string());
            Ok(())
        })
    }
}

pub fn email(id: &str, received_order: u64, body: &str) -> MailMessage {
    let raw = format!(
        "From: Instagram <security@mail.instagram.com>\r\n\
         To: alice@example.com\r\n\
         Subject: Verify your account\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    );
    MailMessage {
        id: id.to_string(),
        received_order,
        raw: raw.into_bytes(),
    }
}
