//! Author attribution: which identity counts as "me" for a project, and how
//! that choice is probed, confirmed and persisted.

use crate::error::{Result, TimekeepError};
use crate::model::CommitRecord;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityScope {
    Local,
    Global,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCandidate {
    pub email: String,
    pub scope: IdentityScope,
}

impl IdentityCandidate {
    pub fn new(email: impl Into<String>, scope: IdentityScope) -> Self {
        Self {
            email: email.into(),
            scope,
        }
    }
}

/// Reads `user.email` from a repository's git configuration.
pub trait IdentityProbe {
    fn local_email(&self) -> Option<String>;
    fn global_email(&self) -> Option<String>;

    /// Local identity first, global as fallback.
    fn probe(&self) -> Option<IdentityCandidate> {
        if let Some(email) = non_empty(self.local_email()) {
            return Some(IdentityCandidate::new(email, IdentityScope::Local));
        }
        non_empty(self.global_email()).map(|email| IdentityCandidate::new(email, IdentityScope::Global))
    }
}

fn non_empty(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

/// Persisted author email per project.
pub trait AuthorStore {
    fn author_email(&self, project: &str) -> Option<String>;
    fn save_author_email(&mut self, project: &str, email: &str) -> Result<()>;
}

impl AuthorStore for HashMap<String, String> {
    fn author_email(&self, project: &str) -> Option<String> {
        self.get(project).cloned()
    }

    fn save_author_email(&mut self, project: &str, email: &str) -> Result<()> {
        self.insert(project.to_string(), email.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub project: String,
    pub candidate: IdentityCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Reject { correct_email: String },
}

/// Answers identity questions at the boundary (console prompt, scripted tests).
pub trait Confirmer {
    fn decide(&mut self, request: &ConfirmationRequest) -> Decision;

    /// Asked when no identity could be probed. `None` leaves the project unresolved.
    fn provide(&mut self, project: &str) -> Option<String>;
}

/// Accepts every probed candidate and never invents one.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn decide(&mut self, _request: &ConfirmationRequest) -> Decision {
        Decision::Confirm
    }

    fn provide(&mut self, _project: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorState {
    Unset,
    Probing(IdentityCandidate),
    Confirmed(String),
}

#[derive(Debug, Clone)]
pub struct AuthorAttribution {
    project: String,
    state: AuthorState,
}

impl AuthorAttribution {
    pub fn new(project: impl Into<String>, stored: Option<&str>) -> Self {
        let state = match stored.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => AuthorState::Confirmed(email.to_string()),
            None => AuthorState::Unset,
        };
        Self {
            project: project.into(),
            state,
        }
    }

    pub fn state(&self) -> &AuthorState {
        &self.state
    }

    pub fn confirmed_email(&self) -> Option<&str> {
        match &self.state {
            AuthorState::Confirmed(email) => Some(email.as_str()),
            _ => None,
        }
    }

    pub fn reconfigure(&mut self) {
        self.state = AuthorState::Unset;
    }

    pub fn propose(&mut self, candidate: IdentityCandidate) -> ConfirmationRequest {
        self.state = AuthorState::Probing(candidate.clone());
        ConfirmationRequest {
            project: self.project.clone(),
            candidate,
        }
    }

    pub fn confirm(&mut self) -> Result<&str> {
        match &self.state {
            AuthorState::Probing(candidate) => {
                let email = candidate.email.trim().to_string();
                self.state = AuthorState::Confirmed(email);
                self.confirmed()
            }
            _ => Err(TimekeepError::AuthorUnresolved(self.project.clone())),
        }
    }

    pub fn reject(&mut self, correct_email: &str) -> Result<&str> {
        let email = correct_email.trim();
        if email.is_empty() || !matches!(self.state, AuthorState::Probing(_)) {
            return Err(TimekeepError::AuthorUnresolved(self.project.clone()));
        }
        self.state = AuthorState::Confirmed(email.to_string());
        self.confirmed()
    }

    fn confirmed(&self) -> Result<&str> {
        self.confirmed_email()
            .ok_or_else(|| TimekeepError::AuthorUnresolved(self.project.clone()))
    }
}

/// Drive the attribution state machine for one project and persist the result.
///
/// `probe` is only called when no confirmed email is stored, or when
/// `reconfigure` is set.
pub fn resolve_author<F>(
    project: &str,
    store: &mut dyn AuthorStore,
    probe: F,
    confirmer: &mut dyn Confirmer,
    reconfigure: bool,
) -> Result<String>
where
    F: FnOnce() -> Result<Option<IdentityCandidate>>,
{
    let stored = store.author_email(project);
    let mut attribution = AuthorAttribution::new(project, stored.as_deref());
    if reconfigure {
        attribution.reconfigure();
    }

    if let Some(email) = attribution.confirmed_email() {
        debug!(project, email, "using stored author");
        return Ok(email.to_string());
    }

    let email = match probe()? {
        Some(candidate) => {
            debug!(project, email = %candidate.email, scope = ?candidate.scope, "probed author");
            let request = attribution.propose(candidate);
            match confirmer.decide(&request) {
                Decision::Confirm => attribution.confirm()?.to_string(),
                Decision::Reject { correct_email } => attribution.reject(&correct_email)?.to_string(),
            }
        }
        None => {
            let manual = confirmer
                .provide(project)
                .ok_or_else(|| TimekeepError::AuthorUnresolved(project.to_string()))?;
            attribution.propose(IdentityCandidate::new(manual, IdentityScope::Manual));
            attribution.confirm()?.to_string()
        }
    };

    store.save_author_email(project, &email)?;
    info!(project, email = %email, "author confirmed");
    Ok(email)
}

/// Keep only commits whose author email equals `author_email`. Comparison is
/// case-sensitive; only surrounding whitespace is ignored.
pub fn filter_by_author(records: Vec<CommitRecord>, author_email: &str) -> Vec<CommitRecord> {
    let wanted = author_email.trim();
    records
        .into_iter()
        .filter(|r| r.author_email.trim() == wanted)
        .collect()
}
