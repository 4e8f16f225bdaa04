//! People and actors: who is responsible, who acted.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A person known to the tracker: an author, an AD, a voter, an action holder.
///
/// Identity is the email address; the name is carried for display.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
}

impl Person {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Whether two records refer to the same person.
    pub fn same_as(&self, other: &Person) -> bool {
        self.email.eq_ignore_ascii_case(&other.email)
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Parses `Name <email>` or a bare email address.
///
/// A bare address uses its local part as the display name.
impl FromStr for Person {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((name, rest)) = s.split_once('<') {
            let email = rest
                .strip_suffix('>')
                .ok_or_else(|| format!("unterminated address in {s:?}"))?
                .trim();
            let name = name.trim();
            if email.is_empty() || !email.contains('@') {
                return Err(format!("invalid email address in {s:?}"));
            }
            let name = if name.is_empty() { local_part(email) } else { name };
            return Ok(Person::new(name, email));
        }
        if !s.contains('@') {
            return Err(format!("expected `Name <email>` or an email address, got {s:?}"));
        }
        Ok(Person::new(local_part(s), s))
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Who performed an operation.
///
/// Scheduled sweeps act as the synthetic system actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Actor {
    System,
    Person(Person),
}

impl Actor {
    pub fn person(&self) -> Option<&Person> {
        match self {
            Actor::System => None,
            Actor::Person(p) => Some(p),
        }
    }
}

impl From<Person> for Actor {
    fn from(person: Person) -> Self {
        Actor::Person(person)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("(System)"),
            Actor::Person(p) => f.write_str(&p.name),
        }
    }
}
