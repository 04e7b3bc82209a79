//! Per-session ordered log with bounded retention and any number of cursors.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Synthetic lines written by the supervisor itself.
    Marker,
}

impl LogStream {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
            LogStream::Marker => "marker",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub session_id: String,
    /// Starts at 0 per session, gapless.
    pub seq: u64,
    pub stream: LogStream,
    pub text: String,
    /// Milliseconds since the session started, from a monotonic clock.
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
}

struct LogState {
    lines: VecDeque<LogLine>,
    next_seq: u64,
    dropped: u64,
    closed: bool,
}

struct Shared {
    session_id: String,
    started: Instant,
    capacity: usize,
    state: Mutex<LogState>,
    notify: watch::Sender<u64>,
}

/// Cheap to clone; every clone sees the same log.
#[derive(Clone)]
pub struct SessionLog {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog")
            .field("session_id", &self.shared.session_id)
            .field("next_seq", &self.next_seq())
            .finish()
    }
}

impl SessionLog {
    pub fn new(session_id: impl Into<String>, capacity: usize, started: Instant) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                started,
                capacity: capacity.max(1),
                state: Mutex::new(LogState {
                    lines: VecDeque::new(),
                    next_seq: 0,
                    dropped: 0,
                    closed: false,
                }),
                notify,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        // A poisoned lock only means a panicking writer; the data is still consistent.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one line and assigns it the next sequence number.
    /// Only the session's sequencer calls this.
    pub(crate) fn push(&self, stream: LogStream, text: String, at: Instant) -> u64 {
        let seq = {
            let mut st = self.state();
            if st.closed {
                return st.next_seq;
            }
            let seq = st.next_seq;
            st.next_seq += 1;
            st.lines.push_back(LogLine {
                session_id: self.shared.session_id.clone(),
                seq,
                stream,
                text,
                elapsed_ms: at.saturating_duration_since(self.shared.started).as_millis() as u64,
                at: Utc::now(),
            });
            while st.lines.len() > self.shared.capacity {
                st.lines.pop_front();
            }
            seq
        };
        self.shared.notify.send_replace(seq + 1);
        seq
    }

    pub(crate) fn record_dropped(&self, count: u64) {
        self.state().dropped += count;
    }

    /// No more lines will arrive. Wakes every waiting subscriber.
    pub(crate) fn close(&self) {
        let next = {
            let mut st = self.state();
            st.closed = true;
            st.next_seq
        };
        self.shared.notify.send_replace(next);
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn next_seq(&self) -> u64 {
        self.state().next_seq
    }

    pub fn dropped(&self) -> u64 {
        self.state().dropped
    }

    /// Oldest sequence number still retained.
    pub fn first_retained(&self) -> u64 {
        let st = self.state();
        st.lines.front().map(|l| l.seq).unwrap_or(st.next_seq)
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.state().lines.iter().cloned().collect()
    }

    /// A new cursor starting at the beginning of the session.
    pub fn subscribe(&self) -> LogSubscription {
        self.subscribe_from(0)
    }

    pub fn subscribe_from(&self, seq: u64) -> LogSubscription {
        LogSubscription {
            log: self.clone(),
            cursor: seq,
            rx: self.shared.notify.subscribe(),
        }
    }

    fn read_at(&self, cursor: u64, max: usize) -> (Vec<LogLine>, bool) {
        let st = self.state();
        let first = st.lines.front().map(|l| l.seq).unwrap_or(st.next_seq);
        let mut out = Vec::new();
        if cursor < first && max > 0 {
            out.push(self.evicted_marker(&st, cursor, first));
        }
        let start = cursor.max(first);
        let skip = (start - first) as usize;
        let room = max - out.len();
        out.extend(st.lines.iter().skip(skip).take(room).cloned());
        let delivered_to = out.last().map(|l| l.seq + 1).unwrap_or(start);
        let exhausted = st.closed && delivered_to >= st.next_seq;
        (out, exhausted)
    }

    /// Stands in for lines `cursor..first` that left retention before this
    /// reader got to them. Carries the last skipped sequence number.
    fn evicted_marker(&self, st: &LogState, cursor: u64, first: u64) -> LogLine {
        let (elapsed_ms, at) = st
            .lines
            .front()
            .map(|l| (l.elapsed_ms, l.at))
            .unwrap_or_else(|| (self.shared.started.elapsed().as_millis() as u64, Utc::now()));
        LogLine {
            session_id: self.shared.session_id.clone(),
            seq: first - 1,
            stream: LogStream::Marker,
            text: format!("[log retention: {} lines dropped]", first - cursor),
            elapsed_ms,
            at,
        }
    }
}

/// One reader's position in a [`SessionLog`].
///
/// A subscriber that falls behind retention gets one marker line for the
/// evicted range and continues at the oldest retained line.
pub struct LogSubscription {
    log: SessionLog,
    cursor: u64,
    rx: watch::Receiver<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPoll {
    Line(LogLine),
    /// Nothing new yet; the session is still producing.
    Pending,
    /// Every line has been delivered and the session is closed.
    Finished,
}

impl LogSubscription {
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Start over from the first line of the session.
    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    /// Non-blocking read of the next line.
    pub fn try_next(&mut self) -> LogPoll {
        let (mut lines, exhausted) = self.log.read_at(self.cursor, 1);
        match lines.pop() {
            Some(line) => {
                self.cursor = line.seq + 1;
                LogPoll::Line(line)
            }
            None if exhausted => LogPoll::Finished,
            None => LogPoll::Pending,
        }
    }

    /// Up to `max` lines that are available right now.
    pub fn drain(&mut self, max: usize) -> Vec<LogLine> {
        let (lines, _) = self.log.read_at(self.cursor, max);
        if let Some(last) = lines.last() {
            self.cursor = last.seq + 1;
        }
        lines
    }

    /// Waits for the next line. `None` once the session is closed and drained.
    pub async fn next(&mut self) -> Option<LogLine> {
        loop {
            // Mark the current value seen before checking, so a push that lands
            // between the check and the wait still wakes us.
            let _ = self.rx.borrow_and_update();
            match self.try_next() {
                LogPoll::Line(line) => return Some(line),
                LogPoll::Finished => return None,
                LogPoll::Pending => {
                    if self.rx.changed().await.is_err() {
                        return match self.try_next() {
                            LogPoll::Line(line) => Some(line),
                            _ => None,
                        };
                    }
                }
            }
        }
    }
}
