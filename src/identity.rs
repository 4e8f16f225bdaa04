//! Identity resolution for doctrack commands.
//!
//! Every write is attributed to a person. Rather than requiring `--as` on
//! every invocation, the acting person is resolved through a chain:
//!
//! 1. `--as <person>`: explicit per-command override
//! 2. `DOCTRACK_ACTOR` env var: process/session level
//! 3. `actor` in `~/.doctrack/config.toml`: global default
//!
//! Each source holds `Name <email>` or a bare address. Sweeps do not resolve
//! an identity; they always act as the system.

use std::env;

use doctrack::model::Person;

/// Error message shown when identity cannot be resolved.
pub const IDENTITY_REQUIRED: &str = "identity required: pass --as \"Name <email>\", \
    set DOCTRACK_ACTOR, or add `actor = \"...\"` to ~/.doctrack/config.toml";

/// Resolve the acting person from the tiered resolution chain.
pub fn resolve_identity(explicit: Option<&str>, configured: Option<&str>) -> Result<Person, String> {
    let from_env = env::var("DOCTRACK_ACTOR").ok();
    resolve_from(explicit, from_env.as_deref(), configured)
}

fn resolve_from(
    explicit: Option<&str>,
    from_env: Option<&str>,
    configured: Option<&str>,
) -> Result<Person, String> {
    let chosen = [explicit, from_env, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .ok_or(IDENTITY_REQUIRED)?;
    chosen.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_wins() {
        let person = resolve_from(
            Some("Ada Director <ada@ietf.org>"),
            Some("env@ietf.org"),
            Some("config@ietf.org"),
        )
        .unwrap();
        assert_eq!(person.email, "ada@ietf.org");
    }

    #[test]
    fn falls_through_empty_sources() {
        let person = resolve_from(None, Some(""), Some("config@ietf.org")).unwrap();
        assert_eq!(person.email, "config@ietf.org");
        assert_eq!(person.name, "config");
    }

    #[test]
    fn nothing_configured_is_an_error() {
        assert_eq!(resolve_from(None, None, None).unwrap_err(), IDENTITY_REQUIRED);
    }

    #[test]
    fn malformed_identity_is_reported() {
        assert!(resolve_from(Some("just a name"), None, None).is_err());
    }
}
