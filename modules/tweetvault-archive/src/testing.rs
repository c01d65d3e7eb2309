// Test doubles for the archive pipeline.
//
// One mock per trait boundary:
// - MockLookup (LookupApi): id→record maps plus scripted failures
// - MockMediaSource (MediaSource): URL→body/status, counts requests
// - ScriptedConsent (Consent): queued answers, records prompts

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use twitter_lookup::{identity_of, LookupError, LookupKind};

use crate::consent::Consent;
use crate::fetch::LookupApi;
use crate::media::{DownloadError, MediaResponse, MediaSource};

// ---------------------------------------------------------------------------
// MockLookup
// ---------------------------------------------------------------------------

/// One recorded `lookup` call.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupCall {
    pub kind: LookupKind,
    pub ids: Vec<String>,
    pub session: String,
}

/// In-memory lookup API. Unknown identities are silently omitted from
/// responses, like deleted or protected tweets.
/// Builder pattern: `.on_tweet()`, `.on_user()`, `.fail_call()`.
pub struct MockLookup {
    tweets: HashMap<String, serde_json::Value>,
    users: HashMap<String, serde_json::Value>,
    failures: Mutex<HashMap<usize, LookupError>>,
    calls: Mutex<Vec<LookupCall>>,
    sessions: AtomicUsize,
}

impl MockLookup {
    pub fn new() -> Self {
        Self {
            tweets: HashMap::new(),
            users: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            sessions: AtomicUsize::new(0),
        }
    }

    pub fn on_tweet(mut self, tweet: serde_json::Value) -> Self {
        let id = identity_of(&tweet).expect("mock tweet needs id_str");
        self.tweets.insert(id, tweet);
        self
    }

    pub fn on_user(mut self, user: serde_json::Value) -> Self {
        let id = identity_of(&user).expect("mock user needs id_str");
        self.users.insert(id, user);
        self
    }

    /// Make the `index`-th lookup call (zero-based, counting retries) fail
    /// once with `error`.
    pub fn fail_call(self, index: usize, error: LookupError) -> Self {
        self.failures.lock().unwrap().insert(index, error);
        self
    }

    pub fn calls(&self) -> Vec<LookupCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Default for MockLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LookupApi for MockLookup {
    async fn open_session(&self) -> Result<String, LookupError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("guest-{n}"))
    }

    async fn lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
        session: &str,
    ) -> Result<Vec<serde_json::Value>, LookupError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(LookupCall {
                kind,
                ids: ids.to_vec(),
                session: session.to_string(),
            });
            calls.len() - 1
        };
        if let Some(error) = self.failures.lock().unwrap().remove(&index) {
            return Err(error);
        }

        let source = match kind {
            LookupKind::Tweets => &self.tweets,
            LookupKind::Users => &self.users,
        };
        Ok(ids.iter().filter_map(|id| source.get(id).cloned()).collect())
    }
}

// ---------------------------------------------------------------------------
// MockMediaSource
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct MockMedia {
    body: Bytes,
    /// Content length the server claims; `None` omits the header.
    reported: Option<u64>,
    status: Option<u16>,
}

/// URL→response map. Unregistered URLs answer 404.
/// Builder pattern: `.on_body()`, `.on_truncated()`, `.on_status()`, `.fail_first()`.
pub struct MockMediaSource {
    media: HashMap<String, MockMedia>,
    transient: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<String>>,
}

impl MockMediaSource {
    pub fn new() -> Self {
        Self {
            media: HashMap::new(),
            transient: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on_body(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let reported = Some(body.len() as u64);
        self.media.insert(
            url.to_string(),
            MockMedia {
                body,
                reported,
                status: None,
            },
        );
        self
    }

    /// Serve `body` while claiming `reported` bytes.
    pub fn on_truncated(mut self, url: &str, body: impl Into<Bytes>, reported: u64) -> Self {
        self.media.insert(
            url.to_string(),
            MockMedia {
                body: body.into(),
                reported: Some(reported),
                status: None,
            },
        );
        self
    }

    pub fn on_status(mut self, url: &str, status: u16) -> Self {
        self.media.insert(
            url.to_string(),
            MockMedia {
                body: Bytes::new(),
                reported: None,
                status: Some(status),
            },
        );
        self
    }

    /// Answer 503 for the first `times` requests to `url`.
    pub fn fail_first(self, url: &str, times: usize) -> Self {
        self.transient.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl Default for MockMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn open(&self, url: &str) -> Result<Box<dyn MediaResponse>, DownloadError> {
        self.requests.lock().unwrap().push(url.to_string());

        if let Some(left) = self.transient.lock().unwrap().get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(DownloadError::Status(503));
            }
        }

        let media = self.media.get(url).cloned().ok_or(DownloadError::Status(404))?;
        if let Some(status) = media.status {
            return Err(DownloadError::Status(status));
        }

        // Serve in small chunks so streaming is exercised.
        let chunks: VecDeque<Bytes> = media
            .body
            .chunks(4096)
            .map(Bytes::copy_from_slice)
            .collect();
        Ok(Box::new(MockResponse {
            reported: media.reported,
            chunks,
        }))
    }
}

struct MockResponse {
    reported: Option<u64>,
    chunks: VecDeque<Bytes>,
}

#[async_trait]
impl MediaResponse for MockResponse {
    fn content_length(&self) -> Option<u64> {
        self.reported
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        Ok(self.chunks.pop_front())
    }
}

// ---------------------------------------------------------------------------
// ScriptedConsent
// ---------------------------------------------------------------------------

/// Answers prompts from a queue; declines once the queue runs out.
pub struct ScriptedConsent {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConsent {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Consent for ScriptedConsent {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}
