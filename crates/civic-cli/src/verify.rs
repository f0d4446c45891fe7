//! # Verify Subcommand
//!
//! Recomputes the audit hash chain of a request history exported from
//! `GET /requests/{id}/history` (JSON or YAML) and reports the first broken
//! link. Only a complete history starting at sequence 1 verifies.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use civic_core::RequestId;
use civic_workflow::audit::{verify_chain, ChainVerification};
use civic_workflow::AuditEvent;

/// Arguments for `civic verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// History file, or `-` for stdin.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct HistoryExport {
    request_id: RequestId,
    events: Vec<serde_json::Value>,
}

/// Parse an exported history into audit events.
pub fn parse_history(raw: &str) -> Result<Vec<AuditEvent>> {
    let export: HistoryExport = match serde_json::from_str(raw) {
        Ok(export) => export,
        Err(json_err) => serde_yaml::from_str(raw).with_context(|| {
            format!("history is neither valid JSON ({json_err}) nor valid YAML")
        })?,
    };

    export
        .events
        .into_iter()
        .enumerate()
        .map(|(i, mut event)| {
            let Some(fields) = event.as_object_mut() else {
                bail!("event {i} is not an object");
            };
            fields.insert(
                "request_id".to_string(),
                serde_json::Value::String(export.request_id.to_string()),
            );
            serde_json::from_value(event).with_context(|| format!("event {i} is malformed"))
        })
        .collect()
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read history from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
    }
}

/// Verify the history at `args.path`.
pub fn verify_file(args: &VerifyArgs) -> Result<ChainVerification> {
    let raw = read_input(&args.path)?;
    let events = parse_history(&raw)?;
    Ok(verify_chain(&events))
}

/// Execute `civic verify`. Exit code 1 when the chain is broken.
pub fn run_verify(args: &VerifyArgs) -> Result<u8> {
    let result = verify_file(args)?;
    match result.first_broken {
        None => {
            println!("OK: {} events, chain intact", result.total_events);
            Ok(0)
        }
        Some(seq) => {
            println!(
                "BROKEN: chain fails at sequence {seq} ({} events)",
                result.total_events
            );
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use civic_core::{ActorId, Role};
    use civic_workflow::audit::{AuditDraft, GENESIS_HASH};
    use civic_workflow::{Action, RequestStatus};

    fn sealed_history(request_id: RequestId) -> Vec<AuditEvent> {
        let steps = [
            (Action::Triage, RequestStatus::Submitted, RequestStatus::Triaged),
            (Action::Start, RequestStatus::Triaged, RequestStatus::InProgress),
            (Action::Resolve, RequestStatus::InProgress, RequestStatus::Resolved),
        ];
        let mut events: Vec<AuditEvent> = Vec::new();
        for (i, (action, from, to)) in steps.into_iter().enumerate() {
            let previous = events
                .last()
                .map_or(GENESIS_HASH.to_string(), |e| e.event_hash.clone());
            let draft = AuditDraft {
                action,
                from_status: from,
                to_status: to,
                actor_id: ActorId::new(),
                actor_role: Role::FieldAgent,
                reason: None,
                created_at: chrono::Utc::now(),
            };
            events.push(draft.seal(request_id, i as u64 + 1, &previous));
        }
        events
    }

    /// Shape of `GET /requests/{id}/history`: events without `request_id`.
    fn export(request_id: RequestId, events: &[AuditEvent]) -> serde_json::Value {
        let events: Vec<serde_json::Value> = events
            .iter()
            .map(|e| {
                let mut v = serde_json::to_value(e).unwrap();
                v.as_object_mut().unwrap().remove("request_id");
                v
            })
            .collect();
        serde_json::json!({
            "request_id": request_id,
            "events": events,
            "next_after": null,
        })
    }

    #[test]
    fn intact_export_verifies() {
        let id = RequestId::new();
        let raw = export(id, &sealed_history(id)).to_string();
        let events = parse_history(&raw).unwrap();
        assert_eq!(events.len(), 3);
        assert!(verify_chain(&events).is_valid());
    }

    #[test]
    fn tampered_reason_is_detected() {
        let id = RequestId::new();
        let mut doc = export(id, &sealed_history(id));
        doc["events"][1]["reason"] = serde_json::json!("edited after the fact");
        let events = parse_history(&doc.to_string()).unwrap();
        assert_eq!(verify_chain(&events).first_broken, Some(2));
    }

    #[test]
    fn yaml_export_is_accepted() {
        let id = RequestId::new();
        let yaml = serde_yaml::to_string(&export(id, &sealed_history(id))).unwrap();
        let events = parse_history(&yaml).unwrap();
        assert!(verify_chain(&events).is_valid());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_history("not a history").is_err());
        assert!(parse_history(r#"{"request_id": "x", "events": []}"#).is_err());
    }

    #[test]
    fn run_verify_reads_file() {
        let id = RequestId::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", export(id, &sealed_history(id))).unwrap();
        let args = VerifyArgs {
            path: file.path().to_path_buf(),
        };
        assert_eq!(run_verify(&args).unwrap(), 0);
    }
}
