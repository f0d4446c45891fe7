//! # Transition Table Subcommands
//!
//! `civic transitions` prints the table, optionally narrowed to one status
//! or one role. `civic check` answers a single permission question.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use civic_core::Role;
use civic_workflow::{table, Action, RequestStatus, TransitionRule, WorkflowPolicy};

use crate::{parse_role, parse_status, OutputFormat};

/// Arguments for `civic transitions`.
#[derive(Args, Debug)]
pub struct TransitionsArgs {
    /// Only rules leaving this status.
    #[arg(long, value_parser = parse_status)]
    pub from: Option<RequestStatus>,

    /// Only rules this role may invoke.
    #[arg(long, value_parser = parse_role)]
    pub role: Option<Role>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Arguments for `civic check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Current status of the request.
    #[arg(long, value_parser = parse_status)]
    pub status: RequestStatus,

    /// Action name, e.g. `triage`.
    #[arg(long)]
    pub action: String,

    /// Role of the caller.
    #[arg(long, value_parser = parse_role)]
    pub role: Role,
}

#[derive(Debug, Serialize)]
struct RuleRow<'a> {
    from: &'a str,
    action: &'a str,
    to: &'a str,
    roles: Vec<&'a str>,
    reason_required: bool,
}

impl<'a> RuleRow<'a> {
    fn new(rule: &'a TransitionRule, policy: &WorkflowPolicy) -> Self {
        Self {
            from: rule.from.as_str(),
            action: rule.action.as_str(),
            to: rule.to.as_str(),
            roles: rule.authorized_roles.iter().map(|r| r.as_str()).collect(),
            reason_required: policy.requires_reason(rule.action),
        }
    }
}

/// Render the selected rules in `format`.
pub fn render_transitions(args: &TransitionsArgs, policy: &WorkflowPolicy) -> Result<String> {
    let rows: Vec<RuleRow<'_>> = table::rules()
        .iter()
        .filter(|r| args.from.map_or(true, |f| r.from == f))
        .filter(|r| args.role.map_or(true, |role| r.authorizes(role)))
        .map(|r| RuleRow::new(r, policy))
        .collect();

    match args.format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&rows).context("failed to serialize transitions as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(&rows).context("failed to serialize transitions as YAML")
        }
        OutputFormat::Table => Ok(render_table(&rows)),
    }
}

fn render_table(rows: &[RuleRow<'_>]) -> String {
    let header = ["FROM", "ACTION", "TO", "ROLES"];
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|r| {
            let action = if r.reason_required {
                format!("{}*", r.action)
            } else {
                r.action.to_string()
            };
            [r.from.to_string(), action, r.to.to_string(), r.roles.join(",")]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_line = |cols: [&str; 4]| {
        let line = cols
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };
    push_line(header);
    for row in &cells {
        push_line([&row[0], &row[1], &row[2], &row[3]]);
    }
    if rows.iter().any(|r| r.reason_required) {
        out.push_str("\n* requires a reason\n");
    }
    out
}

/// The answer to a `check` query, as printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The role may perform the action; the request moves to `to`.
    Allowed { to: RequestStatus, reason_required: bool },
    /// The action name is unknown or not legal from the status.
    InvalidTransition,
    /// The pair is legal but not for this role.
    Forbidden { allowed: Vec<Role> },
}

/// Decide a `check` query against the table.
pub fn check(args: &CheckArgs, policy: &WorkflowPolicy) -> CheckOutcome {
    let Some(rule) = Action::from_name(&args.action).and_then(|a| table::lookup(args.status, a))
    else {
        return CheckOutcome::InvalidTransition;
    };
    if rule.authorizes(args.role) {
        CheckOutcome::Allowed {
            to: rule.to,
            reason_required: policy.requires_reason(rule.action),
        }
    } else {
        CheckOutcome::Forbidden {
            allowed: rule.authorized_roles.to_vec(),
        }
    }
}

/// Execute `civic transitions`.
pub fn run_transitions(args: &TransitionsArgs) -> Result<u8> {
    let rendered = render_transitions(args, &WorkflowPolicy::default())?;
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(0)
}

/// Execute `civic check`. Exit code 1 when the action is not permitted.
pub fn run_check(args: &CheckArgs) -> Result<u8> {
    let outcome = check(args, &WorkflowPolicy::default());
    tracing::debug!(?outcome, "check evaluated");
    match outcome {
        CheckOutcome::Allowed {
            to,
            reason_required,
        } => {
            let note = if reason_required { " (reason required)" } else { "" };
            println!(
                "ALLOWED: {} may {} from {} -> {}{note}",
                args.role, args.action, args.status, to
            );
            Ok(0)
        }
        CheckOutcome::InvalidTransition => {
            println!(
                "INVALID_TRANSITION: '{}' is not a valid action from {}",
                args.action, args.status
            );
            Ok(1)
        }
        CheckOutcome::Forbidden { allowed } => {
            let allowed: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
            println!(
                "FORBIDDEN: {} may not {} from {} (allowed: {})",
                args.role,
                args.action,
                args.status,
                allowed.join(", ")
            );
            Ok(1)
        }
    }
}
