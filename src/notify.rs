//! Notifications: who hears about a change, and how it reaches them.
//!
//! The tracker builds fully addressed messages from a static template table
//! and hands them to a [`Notifier`]. Delivery failures are the caller's to
//! log; they never undo a committed change.

use std::{
    collections::BTreeMap,
    fmt, fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    model::{Actor, Axis, Document, Stream},
    registry::Registry,
};

/// Address of the RFC Editor, told when a document is pulled from its queue.
pub const RFC_EDITOR: &str = "rfc-editor@rfc-editor.org";

/// Which group of recipients a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Audience {
    /// The responsible AD and the stream's chairs.
    Responsible,
    /// The document's own mailing list.
    DocumentList,
    /// The document's authors.
    Authors,
    RfcEditor,
}

/// A fully resolved outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub audience: Audience,
    pub to: Vec<String>,
    pub subject: String,

    /// Template identifier; rendering is the notifier's business.
    pub template: String,
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Delivers notifications. Retries and formatting are the implementation's concern.
pub trait Notifier: Send + Sync + fmt::Debug {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes each notification to the log and nowhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            to = %notification.to.join(", "),
            template = %notification.template,
            subject = %notification.subject,
            "notification"
        );
        Ok(())
    }
}

/// Appends each notification as one JSON line to an outbox file.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(notification)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Reads back every notification in an outbox file. A missing file is empty.
pub fn read_outbox(path: &Path) -> Result<Vec<Notification>, NotifyError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        if !line.is_empty() {
            out.push(serde_json::from_str(&line)?);
        }
    }
    Ok(out)
}

/// A state change as seen by the notification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChanged {
    pub axis: Axis,
    pub old: Option<String>,
    pub new: String,
}

impl StateChanged {
    pub fn moved(&self) -> bool {
        self.old.as_deref() != Some(self.new.as_str())
    }
}

/// `(axis, old, new, template)`. `None` matches any state; first match wins.
type TemplateRow = (Axis, Option<&'static str>, Option<&'static str>, &'static str);

const TEMPLATES: &[TemplateRow] = &[
    (Axis::Iesg, None, Some("approved"), "iesg-approved"),
    (Axis::Iesg, None, Some("lc"), "last-call-issued"),
    (Axis::Iesg, Some("lc"), None, "last-call-ended"),
    (Axis::Iesg, None, Some("dead"), "iesg-dead"),
    (Axis::Iesg, None, None, "iesg-state-changed"),
    (Axis::Draft, None, Some("expired"), "draft-expired"),
    (Axis::Draft, Some("expired"), Some("active"), "draft-revived"),
    (Axis::IanaReview, None, None, "iana-review-changed"),
];

/// Template for a change; stream axes share a generic one.
pub fn template_for(axis: Axis, old: Option<&str>, new: &str) -> &'static str {
    TEMPLATES
        .iter()
        .find(|(a, o, n, _)| {
            *a == axis && o.is_none_or(|o| old == Some(o)) && n.is_none_or(|n| n == new)
        })
        .map_or("state-changed", |row| row.3)
}

/// The chairs' address for a document's stream.
pub fn stream_chairs(document: &Document) -> Option<String> {
    match document.stream {
        Stream::Ietf => document
            .group
            .as_ref()
            .map(|group| format!("{group}-chairs@ietf.org")),
        Stream::Irtf => Some("irtf-chair@irtf.org".to_string()),
        Stream::Ise => Some("rfc-ise@rfc-editor.org".to_string()),
        Stream::Iab => Some("iab-chair@iab.org".to_string()),
    }
}

pub fn document_list(document: &Document) -> String {
    format!("{}@ietf.org", document.name)
}

/// Messages for one committed state change, one per distinct audience.
pub fn for_state_change(
    registry: &Registry,
    document: &Document,
    change: &StateChanged,
    actor: &Actor,
) -> Vec<Notification> {
    let name_of = |slug: &str| {
        registry
            .state(change.axis, slug)
            .map_or_else(|| slug.to_string(), |d| d.name.clone())
    };
    let new_name = name_of(&change.new);
    let old_name = change.old.as_deref().map(name_of);
    let template = template_for(change.axis, change.old.as_deref(), &change.new);
    let subject = format!(
        "{}: {} changed to {new_name}",
        document.name,
        change.axis.label()
    );

    let mut vars = base_vars(document);
    vars.insert("axis".into(), change.axis.slug().into());
    vars.insert("new_state".into(), change.new.clone());
    vars.insert("new_state_name".into(), new_name);
    vars.insert("old_state".into(), change.old.clone().unwrap_or_default());
    vars.insert("old_state_name".into(), old_name.unwrap_or_default());
    vars.insert("actor".into(), actor.to_string());

    let responsible: Vec<String> = match change.axis {
        Axis::Iesg => document
            .ad
            .iter()
            .map(|ad| ad.email.clone())
            .chain(stream_chairs(document))
            .collect(),
        Axis::StreamIetf | Axis::StreamIrtf | Axis::StreamIab | Axis::StreamIse => {
            stream_chairs(document).into_iter().collect()
        }
        Axis::Draft => document.authors.iter().map(|a| a.email.clone()).collect(),
        Axis::IanaReview => document.ad.iter().map(|ad| ad.email.clone()).collect(),
    };

    let mut out = Vec::new();
    if !responsible.is_empty() {
        out.push(Notification {
            audience: if change.axis == Axis::Draft {
                Audience::Authors
            } else {
                Audience::Responsible
            },
            to: responsible,
            subject: subject.clone(),
            template: template.to_string(),
            vars: vars.clone(),
        });
    }
    out.push(Notification {
        audience: Audience::DocumentList,
        to: vec![document_list(document)],
        subject: subject.clone(),
        template: template.to_string(),
        vars: vars.clone(),
    });
    if change.axis == Axis::Iesg
        && change.old.as_deref() == Some("rfcqueue")
        && change.new != "pub"
    {
        out.push(Notification {
            audience: Audience::RfcEditor,
            to: vec![RFC_EDITOR.to_string()],
            subject: format!("{} pulled from the RFC Editor queue", document.name),
            template: "pulled-from-rfc-queue".to_string(),
            vars,
        });
    }
    out
}

/// Advance notice that a draft is about to expire.
pub fn expiry_warning(document: &Document, expires: Timestamp) -> Notification {
    let mut to: Vec<String> = document.authors.iter().map(|a| a.email.clone()).collect();
    let audience = if to.is_empty() {
        to.push(document_list(document));
        Audience::DocumentList
    } else {
        Audience::Authors
    };
    let mut vars = base_vars(document);
    vars.insert("expires".into(), expires.to_string());
    Notification {
        audience,
        to,
        subject: format!("Expiration impending: {}", document.name),
        template: "draft-expires-soon".to_string(),
        vars,
    }
}

fn base_vars(document: &Document) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("document".into(), document.name.clone());
    vars.insert("rev".into(), document.rev().to_string());
    vars.insert("stream".into(), document.stream.slug().to_string());
    if let Some(group) = &document.group {
        vars.insert("group".into(), group.clone());
    }
    if let Some(ad) = &document.ad {
        vars.insert("ad".into(), ad.name.clone());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::testing;

    fn change(axis: Axis, old: &str, new: &str) -> StateChanged {
        StateChanged {
            axis,
            old: Some(old.into()),
            new: new.into(),
        }
    }

    #[test]
    fn templates_fall_back_by_axis() {
        assert_eq!(template_for(Axis::Iesg, Some("iesg-eva"), "approved"), "iesg-approved");
        assert_eq!(template_for(Axis::Iesg, Some("lc"), "writeupw"), "last-call-ended");
        assert_eq!(template_for(Axis::Iesg, Some("ad-eval"), "review-e"), "iesg-state-changed");
        assert_eq!(template_for(Axis::Draft, Some("active"), "expired"), "draft-expired");
        assert_eq!(template_for(Axis::StreamIetf, Some("wg-doc"), "wg-lc"), "state-changed");
    }

    #[test]
    fn iesg_change_reaches_ad_and_chairs() {
        let doc = testing::document("draft-ietf-quic-foo");
        let sent = for_state_change(
            &Registry::builtin(),
            &doc,
            &change(Axis::Iesg, "ad-eval", "review-e"),
            &Actor::System,
        );
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].audience, Audience::Responsible);
        assert_eq!(sent[0].to, ["ada@ietf.org", "quic-chairs@ietf.org"]);
        assert_eq!(sent[0].vars["new_state_name"], "Expert Review");
        assert_eq!(sent[1].to, ["draft-ietf-quic-foo@ietf.org"]);
    }

    #[test]
    fn leaving_rfc_queue_tells_the_rfc_editor() {
        let doc = testing::document("draft-ietf-quic-foo");
        let registry = Registry::builtin();

        let pulled = for_state_change(
            &registry,
            &doc,
            &change(Axis::Iesg, "rfcqueue", "iesg-eva"),
            &Actor::System,
        );
        assert!(pulled.iter().any(|n| n.audience == Audience::RfcEditor));

        let published = for_state_change(
            &registry,
            &doc,
            &change(Axis::Iesg, "rfcqueue", "pub"),
            &Actor::System,
        );
        assert!(!published.iter().any(|n| n.audience == Audience::RfcEditor));
    }

    #[test]
    fn chairs_by_stream() {
        let mut doc = testing::document("draft-foo");
        assert_eq!(stream_chairs(&doc).unwrap(), "quic-chairs@ietf.org");
        doc.group = None;
        assert!(stream_chairs(&doc).is_none());
        doc.stream = Stream::Irtf;
        assert_eq!(stream_chairs(&doc).unwrap(), "irtf-chair@irtf.org");
        doc.stream = Stream::Ise;
        assert_eq!(stream_chairs(&doc).unwrap(), "rfc-ise@rfc-editor.org");
    }

    #[test]
    fn outbox_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let outbox = OutboxNotifier::new(dir.path().join("mail").join("outbox.jsonl"));
        let doc = testing::document("draft-foo");

        outbox.send(&expiry_warning(&doc, testing::t0())).unwrap();
        outbox.send(&expiry_warning(&doc, testing::t0())).unwrap();

        let read = read_outbox(outbox.path()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].template, "draft-expires-soon");
        assert_eq!(read[0].audience, Audience::Authors);
    }

    #[test]
    fn missing_outbox_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_outbox(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }
}
