use crate::author::{ConfirmationRequest, Confirmer, Decision, IdentityScope};
use console::{style, Term};
use std::io;
use tracing::warn;

/// Asks on the terminal which identity to attribute commits to.
pub struct ConsoleConfirmer {
    term: Term,
}

impl ConsoleConfirmer {
    pub fn new() -> Self {
        Self { term: Term::stderr() }
    }

    fn ask(&self, question: &str) -> io::Result<String> {
        self.term.write_str(question)?;
        Ok(self.term.read_line()?.trim().to_string())
    }

    fn ask_decision(&self, request: &ConfirmationRequest) -> io::Result<Decision> {
        let scope = match request.candidate.scope {
            IdentityScope::Local => "repository config",
            IdentityScope::Global => "global config",
            IdentityScope::Manual => "manual entry",
        };
        self.term.write_line(&format!(
            "{} {}",
            style("Project").bold(),
            style(&request.project).cyan()
        ))?;
        let answer = self.ask(&format!(
            "  Count commits by {} (from {scope})? [Y/n] ",
            style(&request.candidate.email).green()
        ))?;

        if answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
            return Ok(Decision::Confirm);
        }

        let correct_email = self.ask("  Author email to use instead: ")?;
        Ok(Decision::Reject { correct_email })
    }
}

impl Default for ConsoleConfirmer {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirmer for ConsoleConfirmer {
    fn decide(&mut self, request: &ConfirmationRequest) -> Decision {
        self.ask_decision(request).unwrap_or_else(|e| {
            warn!(project = %request.project, "could not read answer: {e}");
            Decision::Reject {
                correct_email: String::new(),
            }
        })
    }

    fn provide(&mut self, project: &str) -> Option<String> {
        let question = format!(
            "No git identity found for {}. Author email (empty to skip): ",
            style(project).cyan()
        );
        match self.ask(&question) {
            Ok(email) if !email.is_empty() => Some(email),
            Ok(_) => None,
            Err(e) => {
                warn!(project, "could not read answer: {e}");
                None
            }
        }
    }
}
