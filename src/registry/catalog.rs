//! The seeded IETF state and tag catalog.

use crate::model::Axis;

/// `(slug, display name, default next states)`.
type Row = (&'static str, &'static str, &'static [&'static str]);

const DRAFT: &[Row] = &[
    ("active", "Active", &["expired", "repl", "auth-rm", "ietf-rm", "rfc"]),
    ("expired", "Expired", &["active"]),
    ("repl", "Replaced", &[]),
    ("auth-rm", "Withdrawn by Submitter", &[]),
    ("ietf-rm", "Withdrawn by IETF", &[]),
    ("rfc", "RFC", &[]),
];

const IESG: &[Row] = &[
    ("pub-req", "Publication Requested", &["ad-eval", "watching"]),
    ("ad-eval", "AD Evaluation", &["review-e", "lc-req", "iesg-eva", "watching"]),
    ("review-e", "Expert Review", &["ad-eval", "lc-req"]),
    ("lc-req", "Last Call Requested", &["lc"]),
    ("lc", "In Last Call", &["writeupw", "goaheadw"]),
    ("writeupw", "Waiting for Writeup", &["goaheadw", "iesg-eva"]),
    ("goaheadw", "Waiting for AD Go-Ahead", &["iesg-eva", "writeupw"]),
    ("iesg-eva", "IESG Evaluation", &["defer", "approved"]),
    ("defer", "IESG Evaluation - Defer", &["iesg-eva", "approved"]),
    ("approved", "Approved-announcement to be sent", &["ann"]),
    ("ann", "Approved-announcement sent", &["rfcqueue"]),
    ("rfcqueue", "RFC Ed Queue", &["pub", "iesg-eva"]),
    ("pub", "RFC Published", &[]),
    ("dead", "Dead", &[]),
    ("watching", "AD is watching", &["pub-req"]),
    ("idexists", "I-D Exists", &["pub-req", "ad-eval", "watching"]),
];

const STREAM_IETF: &[Row] = &[
    ("c-adopt", "Call For Adoption By WG Issued", &["adopt-wg", "info", "dead"]),
    ("adopt-wg", "Adopted by a WG", &["wg-doc", "parked", "dead"]),
    ("info", "Adopted for WG Info Only", &["dead"]),
    ("wg-doc", "WG Document", &["parked", "wg-lc", "dead"]),
    ("parked", "Parked WG Document", &["wg-doc", "dead"]),
    ("dead", "Dead WG Document", &["wg-doc"]),
    ("wg-lc", "In WG Last Call", &["chair-w", "writeupw", "wg-doc"]),
    ("chair-w", "Waiting for WG Chair Go-Ahead", &["writeupw", "wg-doc"]),
    ("writeupw", "WG Consensus: Waiting for Write-Up", &["sub-pub", "wg-doc"]),
    ("sub-pub", "Submitted to IESG for Publication", &[]),
];

const STREAM_IRTF: &[Row] = &[
    ("candidat", "Candidate RG Document", &["active", "dead"]),
    ("active", "Active RG Document", &["rg-lc", "dead"]),
    ("rg-lc", "In RG Last Call", &["sheph-w", "active"]),
    ("sheph-w", "Waiting for Document Shepherd", &["irsgpoll"]),
    ("irsgpoll", "In IRSG Poll", &["iesg-rev", "rfc-edit", "active"]),
    ("iesg-rev", "In IESG Review", &["rfc-edit"]),
    ("rfc-edit", "Sent to the RFC Editor", &["pub"]),
    ("pub", "Published RFC", &[]),
    ("dead", "Dead IRTF Document", &[]),
];

const STREAM_IAB: &[Row] = &[
    ("candidat", "Candidate IAB Document", &["active", "dead"]),
    ("active", "Active IAB Document", &["review-c", "dead"]),
    ("review-c", "Community Review", &["rfc-edit", "active"]),
    ("rfc-edit", "Sent to the RFC Editor", &["pub"]),
    ("pub", "Published RFC", &[]),
    ("dead", "Dead IAB Document", &[]),
];

const STREAM_ISE: &[Row] = &[
    ("receive", "Submission Received", &["find-rev", "dead"]),
    ("find-rev", "Finding Reviewers", &["review", "dead"]),
    ("review", "In ISE Review", &["need-res", "iesg-rev", "dead"]),
    ("need-res", "Response to Review Needed", &["review", "dead"]),
    ("iesg-rev", "In IESG Review", &["response", "rfc-edit"]),
    ("response", "Response to IESG Needed", &["rfc-edit", "dead"]),
    ("rfc-edit", "Sent to the RFC Editor", &["pub"]),
    ("pub", "Published RFC", &[]),
    ("dead", "No Longer In Independent Submission Stream", &[]),
];

const IANA_REVIEW: &[Row] = &[
    ("need-rev", "IANA Review Needed", &["ok-act", "ok-noact", "not-ok"]),
    ("ok-act", "IANA OK - Actions Needed", &["changed"]),
    ("ok-noact", "IANA OK - No Actions Needed", &["changed"]),
    ("not-ok", "IANA - Not OK", &["changed", "need-rev"]),
    ("changed", "Version Changed - Review Needed", &["ok-act", "ok-noact", "not-ok"]),
];

pub(super) fn states(axis: Axis) -> &'static [Row] {
    match axis {
        Axis::Draft => DRAFT,
        Axis::Iesg => IESG,
        Axis::StreamIetf => STREAM_IETF,
        Axis::StreamIrtf => STREAM_IRTF,
        Axis::StreamIab => STREAM_IAB,
        Axis::StreamIse => STREAM_ISE,
        Axis::IanaReview => IANA_REVIEW,
    }
}

/// IESG tags: `(slug, display name)`.
pub(super) const IESG_TAGS: &[(&str, &str)] = &[
    ("need-rev", "Revised I-D Needed"),
    ("ad-f-up", "AD Followup"),
    ("point", "Point Raised - writeup needed"),
    ("extpty", "External Party"),
    ("rfc-rev", "Under RFC Editor review"),
];

/// States that may be entered from anywhere on their axis.
pub(super) const SINKS: &[(Axis, &str)] = &[(Axis::Iesg, "dead")];

/// IESG states in which nobody is expected to act.
pub(super) const CLEARS_ACTION_HOLDERS: &[&str] =
    &["approved", "ann", "rfcqueue", "pub", "dead", "idexists"];
