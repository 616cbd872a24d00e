//! Firebase Realtime Database adapter over its REST streaming API.
//!
//! Inserts are `POST {base}/{collection}.json`; the server answers with the
//! generated push id. Live queries are `GET` requests carrying
//! `orderBy="domain"&equalTo="<domain>"` with `Accept: text/event-stream`.
//! The server first sends a `put` at `/` with the whole result set, then
//! `put` / `patch` events relative to it.

use anyhow::{anyhow, bail, Context, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header::ACCEPT, Client};
use serde::Deserialize;
use serde_json::{Map, Value};
use shared::domain::{Domain, NewUser, UserRecord};
use tracing::{debug, warn};
use url::Url;

use super::{RealtimeStore, SnapshotStream};

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub(crate) event: String,
    pub(crate) data: String,
}

pub struct FirebaseRealtimeStore {
    http: Client,
    collection_url: Url,
    auth: Option<String>,
}

impl FirebaseRealtimeStore {
    pub fn new(
        base_url: &str,
        collection: impl Into<String>,
        auth: Option<String>,
    ) -> Result<Self> {
        Self::with_http(Client::new(), base_url, collection, auth)
    }

    pub fn with_http(
        http: Client,
        base_url: &str,
        collection: impl Into<String>,
        auth: Option<String>,
    ) -> Result<Self> {
        let collection = collection.into();
        let mut base = base_url.trim().trim_end_matches('/').to_string();
        base.push('/');
        let collection_url = Url::parse(&base)
            .and_then(|base| base.join(&format!("{collection}.json")))
            .with_context(|| format!("invalid realtime database url: {base_url}"))?;
        Ok(Self {
            http,
            collection_url,
            auth,
        })
    }

    fn url(&self) -> Url {
        let mut url = self.collection_url.clone();
        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        url
    }

    pub(crate) fn query_url(&self, domain: Domain) -> Result<Url> {
        let mut url = self.url();
        url.query_pairs_mut()
            .append_pair("orderBy", &serde_json::to_string("domain")?)
            .append_pair("equalTo", &serde_json::to_string(domain.as_str())?);
        Ok(url)
    }
}

#[async_trait]
impl RealtimeStore for FirebaseRealtimeStore {
    async fn insert_user(&self, user: &NewUser) -> Result<String> {
        let response = self.http.post(self.url()).json(user).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("realtime insert failed with {status}: {body}");
        }
        let body: PushResponse = response.json().await?;
        debug!(id = %body.name, domain = %user.domain, "realtime: inserted document");
        Ok(body.name)
    }

    async fn listen(&self, domain: Domain) -> Result<SnapshotStream> {
        let url = self.query_url(domain)?;
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .context("failed to open realtime stream")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("realtime listen failed with {status}: {body}");
        }

        let snapshots: SnapshotStream = Box::pin(stream! {
            let mut buffer = Vec::new();
            let mut result = QueryResult::new(domain);
            let mut bytes = std::pin::pin!(response.bytes_stream());

            loop {
                let Some(chunk) = bytes.next().await else {
                    yield Err(anyhow!("realtime stream closed by server"));
                    break;
                };
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(anyhow!("realtime stream receive failed: {err}"));
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                let mut failed = false;
                while let Some(frame) = extract_sse_frame(&mut buffer) {
                    match result.apply(&frame) {
                        Ok(true) => yield Ok(result.snapshot()),
                        Ok(false) => {}
                        Err(err) => {
                            yield Err(err);
                            failed = true;
                            break;
                        }
                    }
                }
                if failed {
                    break;
                }
            }
        });
        Ok(snapshots)
    }
}

/// Removes and parses one complete frame from the front of `buffer`.
pub(crate) fn extract_sse_frame(buffer: &mut Vec<u8>) -> Option<SseFrame> {
    loop {
        let (end, separator_len) = find_frame_end(buffer)?;
        let raw: Vec<u8> = buffer.drain(..end + separator_len).take(end).collect();
        if let Some(frame) = parse_sse_frame(&String::from_utf8_lossy(&raw)) {
            return Some(frame);
        }
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_sse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

/// Local copy of a live query's result set.
pub(crate) struct QueryResult {
    domain: Domain,
    root: Value,
}

impl QueryResult {
    pub(crate) fn new(domain: Domain) -> Self {
        Self {
            domain,
            root: Value::Object(Map::new()),
        }
    }

    /// Applies one server event. Returns whether the result set may have
    /// changed.
    pub(crate) fn apply(&mut self, frame: &SseFrame) -> Result<bool> {
        match frame.event.as_str() {
            "put" | "patch" => {
                let payload: StreamPayload = serde_json::from_str(&frame.data)
                    .with_context(|| format!("malformed realtime {} event", frame.event))?;
                let segments: Vec<&str> = payload
                    .path
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .collect();
                if frame.event == "put" {
                    set_path(&mut self.root, &segments, payload.data);
                } else if let Value::Object(children) = payload.data {
                    for (key, value) in children {
                        let mut child_path = segments.clone();
                        child_path.push(&key);
                        set_path(&mut self.root, &child_path, value);
                    }
                }
                Ok(true)
            }
            "keep-alive" => Ok(false),
            "cancel" => bail!("realtime query cancelled by server: {}", frame.data),
            "auth_revoked" => bail!("realtime credentials revoked: {}", frame.data),
            other => {
                debug!(event = other, "realtime: ignoring unknown stream event");
                Ok(false)
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<UserRecord> {
        let Some(documents) = self.root.as_object() else {
            return Vec::new();
        };
        documents
            .iter()
            .filter_map(|(id, document)| {
                match serde_json::from_value::<NewUser>(document.clone()) {
                    Ok(user) => Some(UserRecord::from_new(id.clone(), user)),
                    Err(err) => {
                        warn!(%id, %err, "realtime: skipping malformed document");
                        None
                    }
                }
            })
            .filter(|user| user.domain == self.domain)
            .collect()
    }
}

/// Writes `data` at `segments` below `node`; `null` deletes, and emptied
/// parents are pruned.
fn set_path(node: &mut Value, segments: &[&str], data: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = data;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() {
        if data.is_null() {
            map.remove(*first);
        } else {
            map.insert((*first).to_string(), data);
        }
        return;
    }

    let child = map.entry((*first).to_string()).or_insert(Value::Null);
    set_path(child, rest, data);
    let prune = match child {
        Value::Null => true,
        Value::Object(children) => children.is_empty(),
        _ => false,
    };
    if prune {
        map.remove(*first);
    }
}

#[cfg(test)]
#[path = "../tests/firebase_tests.rs"]
mod tests;
