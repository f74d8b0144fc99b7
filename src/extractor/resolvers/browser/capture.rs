// Capture slot shared between the network listener and the waiting resolver
//
// Policy:
// - a leaf playlist (body lists #EXTINF segments) completes the wait at once
// - anything else is held as provisional; the waiter keeps listening for a
//   leaf for a short settle window, then takes the provisional candidate
// - a leaf replaces a provisional candidate, never the other way round
// - once the waiter has taken a candidate, further publishes are rejected

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::extractor::errors::ExtractError;
use crate::extractor::headers::HeaderSet;
use crate::extractor::models::{PLAYLIST_MARKER, SEGMENT_MARKER};

/// A playlist response observed by the browser session
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: String,
    pub request_headers: HeaderSet,
    pub body: Option<String>,
}

/// Why a candidate was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureReason {
    FirstSeen,
    ContainsSegments,
    NestedPlaylist,
}

impl CaptureReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::FirstSeen => "first seen",
            Self::ContainsSegments => "contains #EXTINF segments",
            Self::NestedPlaylist => "nested m3u8 discovered in response body",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub url: String,
    pub headers: HeaderSet,
    pub reason: CaptureReason,
}

impl Candidate {
    pub fn is_leaf(&self) -> bool {
        self.reason == CaptureReason::ContainsSegments
    }
}

/// First non-comment line of a playlist body that references another playlist,
/// resolved against the response URL
pub fn find_nested_playlist(body: &str, base_url: &str) -> Option<String> {
    let line = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find(|line| line.to_ascii_lowercase().contains(PLAYLIST_MARKER))?;

    let resolved = Url::parse(base_url)
        .and_then(|base| base.join(line))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| line.to_string());
    Some(resolved)
}

/// Turn a raw response into a capture candidate
pub fn classify(response: InterceptedResponse) -> Candidate {
    let body = response.body.as_deref().unwrap_or("");

    if body.contains(SEGMENT_MARKER) {
        return Candidate {
            url: response.url,
            headers: response.request_headers,
            reason: CaptureReason::ContainsSegments,
        };
    }

    match find_nested_playlist(body, &response.url) {
        Some(nested) => Candidate {
            url: nested,
            headers: response.request_headers,
            reason: CaptureReason::NestedPlaylist,
        },
        None => Candidate {
            url: response.url,
            headers: response.request_headers,
            reason: CaptureReason::FirstSeen,
        },
    }
}

#[derive(Default)]
struct SlotState {
    candidate: Option<Candidate>,
    consumed: bool,
}

/// Single-slot, non-blocking capture signal
#[derive(Default)]
pub struct CaptureSlot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer a candidate. Returns whether it was stored.
    pub fn publish(&self, candidate: Candidate) -> bool {
        let stored = {
            let mut state = self.lock();
            if state.consumed {
                false
            } else {
                let replace = match &state.candidate {
                    None => true,
                    Some(current) => candidate.is_leaf() && !current.is_leaf(),
                };
                if replace {
                    state.candidate = Some(candidate);
                }
                replace
            }
        };
        if stored {
            self.notify.notify_one();
        }
        stored
    }

    fn consume(&self) -> Option<Candidate> {
        let mut state = self.lock();
        state.consumed = true;
        state.candidate.take()
    }

    /// Wait up to `window` for a capture.
    ///
    /// Returns `Ok(None)` when nothing was published in time. The slot is
    /// consumed on every exit path.
    ///
    /// A leaf ends the wait at once. A provisional candidate only holds the
    /// wait open for `settle` more (never past `window`); a leaf arriving
    /// after that is ignored and the provisional candidate is returned.
    pub async fn wait(
        &self,
        window: Duration,
        settle: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Candidate>, ExtractError> {
        let deadline = Instant::now() + window;
        let mut settle_deadline: Option<Instant> = None;

        loop {
            {
                let mut state = self.lock();
                match &state.candidate {
                    Some(c) if c.is_leaf() => {
                        state.consumed = true;
                        return Ok(state.candidate.take());
                    }
                    Some(_) if settle_deadline.is_none() => {
                        settle_deadline = Some((Instant::now() + settle).min(deadline));
                    }
                    _ => {}
                }
            }

            let until = settle_deadline.unwrap_or(deadline);
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.consume();
                    return Err(ExtractError::Cancelled);
                }
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep_until(until) => return Ok(self.consume()),
            }
        }
    }
}
