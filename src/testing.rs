//! Shared fixtures: people, documents, and recording collaborators.

use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
};

use jiff::{SignedDuration, Timestamp};
use tempfile::TempDir;

use crate::{
    archive::{Archive, ArchiveError},
    clock::Clock,
    model::{Actor, Axis, Document, Person, Snapshot, Stream},
    notify::{Notification, Notifier, NotifyError},
    storage::Storage,
    tracker::{NewDocument, Tracker},
};

pub fn t0() -> Timestamp {
    "2026-03-02T15:00:00Z".parse().unwrap()
}

/// `n` whole days. Timestamps do not take calendar spans.
pub fn days(n: i64) -> SignedDuration {
    SignedDuration::from_hours(n * 24)
}

pub fn ad() -> Person {
    Person::new("Ada Director", "ada@ietf.org")
}

pub fn ad_actor() -> Actor {
    Actor::Person(ad())
}

pub fn authors() -> Vec<Person> {
    vec![
        Person::new("Alice Author", "alice@example.org"),
        Person::new("Bob Writer", "bob@example.com"),
    ]
}

/// A stored-shape document in AD evaluation, with no holders.
pub fn document(name: &str) -> Document {
    Document {
        name: name.to_string(),
        stream: Stream::Ietf,
        group: Some("quic".to_string()),
        ad: Some(ad()),
        authors: authors(),
        snapshot: Snapshot {
            rev: "00".to_string(),
            expires: Some(t0() + days(185)),
            states: BTreeMap::from([
                (Axis::Draft, "active".to_string()),
                (Axis::Iesg, "ad-eval".to_string()),
            ]),
            ..Snapshot::default()
        },
        time: t0(),
        last_seq: 0,
    }
}

/// A creation request for a WG draft entering AD evaluation.
pub fn new_document(name: &str) -> NewDocument {
    NewDocument {
        name: name.to_string(),
        rev: "00".to_string(),
        stream: Stream::Ietf,
        group: Some("quic".to_string()),
        ad: Some(ad()),
        authors: authors(),
        states: BTreeMap::from([(Axis::Iesg, "ad-eval".to_string())]),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Records nothing and fails every send.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(io::Error::other("mail relay unreachable").into());
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingArchive {
    archived: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingArchive {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn archived(&self) -> Vec<(String, String)> {
        self.archived.lock().unwrap().clone()
    }
}

impl Archive for RecordingArchive {
    fn archive(&self, document: &str, rev: &str) -> Result<(), ArchiveError> {
        if self.fail {
            return Err(io::Error::other("archive volume full").into());
        }
        self.archived
            .lock()
            .unwrap()
            .push((document.to_string(), rev.to_string()));
        Ok(())
    }

    fn restore(&self, _document: &str, _rev: &str) -> Result<(), ArchiveError> {
        Ok(())
    }
}

/// A clock that moves only when told to. Starts at [`t0`].
#[derive(Debug, Clone)]
pub struct TestClock(Arc<Mutex<Timestamp>>);

impl TestClock {
    pub fn new(at: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(at)))
    }

    pub fn set(&self, at: Timestamp) {
        *self.0.lock().unwrap() = at;
    }

    pub fn advance(&self, by: SignedDuration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        *self.0.lock().unwrap()
    }
}

/// A tracker over a scratch database, with handles on its collaborators.
pub struct Harness {
    pub tracker: Tracker,
    pub notifier: RecordingNotifier,
    pub archive: RecordingArchive,
    pub clock: TestClock,
    _dir: TempDir,
}

pub fn harness() -> Harness {
    build(RecordingNotifier::default(), RecordingArchive::default())
}

pub fn harness_with(notifier: RecordingNotifier) -> Harness {
    build(notifier, RecordingArchive::default())
}

pub fn harness_with_archive(archive: RecordingArchive) -> Harness {
    build(RecordingNotifier::default(), archive)
}

fn build(notifier: RecordingNotifier, archive: RecordingArchive) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(dir.path().join("doctrack.sqlite")).unwrap();
    let clock = TestClock::new(t0());
    let tracker = Tracker::new(storage)
        .with_notifier(notifier.clone())
        .with_archive(archive.clone())
        .with_clock(clock.clone());
    Harness {
        tracker,
        notifier,
        archive,
        clock,
        _dir: dir,
    }
}
