//! Doctrack configuration.
//!
//! Loaded from `~/.doctrack/config.toml`. A missing file means defaults.
//! Group overlays and ballot settings are folded into the registry and
//! ballot policies once, at startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use doctrack::ballot::{BallotPolicies, Threshold};
use doctrack::expiry::{ExpiryPolicy, MAX_DAYS};
use doctrack::model::{Axis, Person};
use doctrack::registry::{GroupOverrides, Registry};
use doctrack::storage::Storage;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Database path. Defaults to `~/.doctrack/doctrack.sqlite`.
    pub database: Option<PathBuf>,

    /// Default acting person, `Name <email>` or an address.
    pub actor: Option<String>,
    pub expiry: ExpiryConfig,
    pub mail: MailConfig,
    pub archive: ArchiveConfig,
    pub groups: Vec<GroupConfig>,
    pub ballots: BTreeMap<String, BallotConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ExpiryConfig {
    pub draft_lifetime_days: i64,
    pub warning_days: i64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            draft_lifetime_days: 185,
            warning_days: 14,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct MailConfig {
    /// JSON-lines file notifications are appended to. Logged only when unset.
    pub outbox: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub drafts_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GroupConfig {
    pub acronym: String,

    /// `axis:state` pairs, e.g. `draft-stream-ietf:parked`.
    #[serde(default)]
    pub unused_states: Vec<String>,
    #[serde(default)]
    pub unused_tags: Vec<String>,
    #[serde(default)]
    pub next_states: Vec<NextStates>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NextStates {
    pub axis: String,
    pub state: String,
    pub next: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BallotConfig {
    /// The authorized pool. Empty means everyone who takes a position.
    pub voters: Vec<String>,

    /// `two-thirds` or a count.
    pub threshold: Option<String>,
}

impl Config {
    /// Load config from `~/.doctrack/config.toml`, or defaults if it is absent.
    pub fn load() -> Result<Self, String> {
        let Some(path) = Self::path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::parse(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// The config file path: `~/.doctrack/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".doctrack").join("config.toml"))
    }

    pub fn database_path(&self) -> Result<PathBuf, String> {
        self.database
            .clone()
            .or_else(Storage::default_path)
            .ok_or_else(|| "could not determine home directory".to_string())
    }

    pub fn expiry_policy(&self) -> Result<ExpiryPolicy, String> {
        let ExpiryConfig {
            draft_lifetime_days,
            warning_days,
        } = self.expiry;
        if draft_lifetime_days <= 0 || warning_days < 0 || warning_days >= draft_lifetime_days {
            return Err(format!(
                "expiry: need 0 <= warning-days < draft-lifetime-days, got {warning_days} and {draft_lifetime_days}"
            ));
        }
        ExpiryPolicy::from_days(draft_lifetime_days, warning_days).ok_or_else(|| {
            format!("expiry: draft-lifetime-days must be at most {MAX_DAYS}, got {draft_lifetime_days}")
        })
    }

    /// The built-in catalog with every configured group overlay applied.
    pub fn registry(&self) -> Result<Registry, String> {
        let mut registry = Registry::builtin();
        for group in &self.groups {
            let mut overrides = GroupOverrides::default();
            for pair in &group.unused_states {
                let (axis, state) = pair.split_once(':').ok_or_else(|| {
                    format!("group {}: expected `axis:state`, got {pair:?}", group.acronym)
                })?;
                let axis = parse_axis(&group.acronym, axis)?;
                known_state(&registry, &group.acronym, axis, state)?;
                overrides.unused_states.insert((axis, state.to_string()));
            }
            for tag in &group.unused_tags {
                if registry.tag(Axis::Iesg, tag).is_none() {
                    return Err(format!("group {}: unknown tag {tag:?}", group.acronym));
                }
                overrides.unused_tags.insert(tag.clone());
            }
            for rule in &group.next_states {
                let axis = parse_axis(&group.acronym, &rule.axis)?;
                known_state(&registry, &group.acronym, axis, &rule.state)?;
                for next in &rule.next {
                    known_state(&registry, &group.acronym, axis, next)?;
                }
                overrides
                    .next_states
                    .insert((axis, rule.state.clone()), rule.next.clone());
            }
            registry = registry.with_group(group.acronym.clone(), overrides);
        }
        Ok(registry)
    }

    /// Built-in ballot policies with configured voters and thresholds.
    pub fn ballot_policies(&self) -> Result<BallotPolicies, String> {
        let mut policies = BallotPolicies::builtin();
        for (purpose, settings) in &self.ballots {
            let policy = policies
                .get_mut(purpose)
                .ok_or_else(|| format!("ballots: unknown purpose {purpose:?}"))?;
            policy.voters = settings
                .voters
                .iter()
                .map(|v| v.parse::<Person>())
                .collect::<Result<_, _>>()
                .map_err(|e| format!("ballots.{purpose}: {e}"))?;
            if let Some(threshold) = &settings.threshold {
                policy.threshold = threshold
                    .parse::<Threshold>()
                    .map_err(|e| format!("ballots.{purpose}: {e}"))?;
            }
        }
        Ok(policies)
    }
}

fn parse_axis(group: &str, slug: &str) -> Result<Axis, String> {
    slug.parse::<Axis>().map_err(|e| format!("group {group}: {e}"))
}

fn known_state(registry: &Registry, group: &str, axis: Axis, state: &str) -> Result<(), String> {
    if registry.state(axis, state).is_none() {
        return Err(format!("group {group}: unknown state {state:?} on {axis}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn empty_file_means_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.expiry_policy().unwrap(), ExpiryPolicy::default());
        assert!(config.ballot_policies().unwrap().get("iesg-approve").is_some());
    }

    #[test]
    fn full_config_applies_overlays() {
        let config = Config::parse(
            r#"
            database = "/var/lib/doctrack/db.sqlite"
            actor = "Ada Director <ada@ietf.org>"

            [expiry]
            draft-lifetime-days = 90
            warning-days = 7

            [mail]
            outbox = "/var/spool/doctrack/outbox.jsonl"

            [[groups]]
            acronym = "quic"
            unused-states = ["draft-stream-ietf:parked"]
            unused-tags = ["extpty"]

            [[groups.next-states]]
            axis = "draft-stream-ietf"
            state = "wg-doc"
            next = ["wg-lc"]

            [ballots.irsg-approve]
            voters = ["Ruth <ruth@irtf.org>", "sam@irtf.org"]
            threshold = "two-thirds"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path().unwrap(), PathBuf::from("/var/lib/doctrack/db.sqlite"));
        assert_eq!(config.expiry_policy().unwrap(), ExpiryPolicy::from_days(90, 7).unwrap());

        let registry = config.registry().unwrap();
        let next: Vec<_> = registry
            .allowed_next_states(Axis::StreamIetf, Some("wg-doc"), Some("quic"))
            .iter()
            .map(|d| d.slug.clone())
            .collect();
        assert_eq!(next, ["wg-lc"]);
        assert!(
            !registry
                .visible_tags(Axis::Iesg, Some("quic"))
                .iter()
                .any(|t| t.slug == "extpty")
        );

        let policies = config.ballot_policies().unwrap();
        let irsg = policies.get("irsg-approve").unwrap();
        assert_eq!(irsg.voters.len(), 2);
        assert_eq!(irsg.threshold, Threshold::TwoThirds);
    }

    #[test]
    fn bad_overlays_are_rejected() {
        let config = Config::parse(
            r#"
            [[groups]]
            acronym = "quic"
            unused-states = ["draft-iesg:limbo"]
            "#,
        )
        .unwrap();
        assert!(config.registry().unwrap_err().contains("limbo"));

        let config = Config::parse("[ballots.iab-approve]\nthreshold = \"3\"\n").unwrap();
        assert!(config.ballot_policies().is_err());

        let config = Config::parse("[expiry]\ndraft-lifetime-days = 10\nwarning-days = 14\n").unwrap();
        assert!(config.expiry_policy().is_err());

        let config =
            Config::parse("[expiry]\ndraft-lifetime-days = 9223372036854775807\n").unwrap();
        assert!(config.expiry_policy().unwrap_err().contains("at most"));

        assert!(Config::parse("colour = \"blue\"").is_err());
    }

    #[test]
    fn load_from_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "database = 42").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.contains("config.toml"));
    }
}
