//! # civic-cli: Operator CLI for the Service Request Workflow
//!
//! ## Subcommands
//!
//! - `civic transitions`: Print the transition table as a table, JSON or YAML.
//! - `civic check`: Whether a role may perform an action from a status.
//! - `civic verify`: Verify the hash chain of an exported request history.
//!
//! Every subcommand returns a process exit code: `0` for success or "yes",
//! `1` for a negative answer, `2` when the command itself fails.

pub mod transitions;
pub mod verify;

use std::str::FromStr;

/// Output format for machine-readable subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns for humans.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
}

/// Parse a status name for clap, accepting any letter case.
pub fn parse_status(s: &str) -> Result<civic_workflow::RequestStatus, String> {
    civic_workflow::RequestStatus::from_name(&s.trim().to_ascii_uppercase())
        .ok_or_else(|| format!("unknown status '{s}'"))
}

/// Parse a role name for clap (`clerk` or `CLERK`).
pub fn parse_role(s: &str) -> Result<civic_core::Role, String> {
    civic_core::Role::from_str(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::Role;
    use civic_workflow::RequestStatus;

    #[test]
    fn status_parsing_ignores_case() {
        assert_eq!(parse_status("in_progress"), Ok(RequestStatus::InProgress));
        assert_eq!(parse_status("RESOLVED"), Ok(RequestStatus::Resolved));
        assert!(parse_status("archived").is_err());
    }

    #[test]
    fn role_parsing_accepts_token_form() {
        assert_eq!(parse_role("field_agent"), Ok(Role::FieldAgent));
        assert!(parse_role("mayor").is_err());
    }
}
