//! Shell command probe
//!
//! Runs an operator-supplied command and reads the verdict from its exit
//! status:
//!
//! | exit | meaning            |
//! |------|--------------------|
//! | 0    | matched            |
//! | 1    | ran, did not match |
//! | 2    | protocol mismatch  |
//! | 3    | unreachable        |
//! | 4    | unauthorized       |
//!
//! Any other status counts as a protocol mismatch. Trimmed stdout is the
//! detail shown to the operator (stderr when stdout is empty).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{expand_template, Probe, ProbeError, ProbeOutcome, ProbeRequest};
use crate::common::{Error, Result};
use crate::device::DeviceConnection;

/// Longest detail kept from command output
const MAX_DETAIL: usize = 2000;

/// Probe backed by `sh -c <command>`
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
}

impl CommandProbe {
    pub fn new(command: &str) -> Result<Self> {
        if command.trim().is_empty() {
            return Err(Error::Configuration(
                "command probe needs a non-empty 'command'".to_string(),
            ));
        }
        Ok(Self {
            command: command.to_string(),
        })
    }
}

fn env_name(param: &str) -> String {
    let sanitized: String = param
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("RIGCHECK_PARAM_{}", sanitized)
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.len() > MAX_DETAIL {
        let mut end = MAX_DETAIL;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}

#[async_trait]
impl Probe for CommandProbe {
    fn name(&self) -> &str {
        "command"
    }

    async fn probe(
        &self,
        conn: &dyn DeviceConnection,
        request: &ProbeRequest<'_>,
    ) -> std::result::Result<ProbeOutcome, ProbeError> {
        let command = expand_template(&self.command, request.params);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&command)
            .env("RIGCHECK_STEP_ID", request.step_id)
            .env("RIGCHECK_MACHINE_ADDRESS", conn.address())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a timed-out or aborted attempt drops the future; take the child with it
            .kill_on_drop(true);
        for (key, value) in request.params {
            cmd.env(env_name(key), value);
        }

        tracing::debug!("Running probe command: {}", command);
        let output = cmd
            .output()
            .await
            .map_err(|e| ProbeError::unreachable(format!("failed to run '{}': {}", command, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stdout.trim().is_empty() {
            truncate(&stderr)
        } else {
            truncate(&stdout)
        };

        match output.status.code() {
            Some(0) => Ok(ProbeOutcome::matched(detail)),
            Some(1) => Ok(ProbeOutcome::mismatch(detail)),
            Some(3) => Err(ProbeError::unreachable(detail)),
            Some(4) => Err(ProbeError::unauthorized(detail)),
            Some(code) => Err(ProbeError::protocol_mismatch(format!(
                "exit status {}: {}",
                code, detail
            ))),
            None => Err(ProbeError::protocol_mismatch(format!(
                "terminated by signal: {}",
                detail
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeErrorKind;
    use std::collections::BTreeMap;

    struct Loopback;

    #[async_trait]
    impl DeviceConnection for Loopback {
        fn address(&self) -> &str {
            "127.0.0.1:8080"
        }
        async fn is_alive(&self) -> bool {
            true
        }
        fn release(&mut self) {}
    }

    async fn run(command: &str, params: &[(&str, &str)]) -> std::result::Result<ProbeOutcome, ProbeError> {
        let params: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let probe = CommandProbe::new(command).unwrap();
        probe
            .probe(
                &Loopback,
                &ProbeRequest {
                    step_id: "onvif-discovery",
                    params: &params,
                },
            )
            .await
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("rtp_passthrough"), "RIGCHECK_PARAM_RTP_PASSTHROUGH");
        assert_eq!(env_name("video.preset"), "RIGCHECK_PARAM_VIDEO_PRESET");
    }

    #[test]
    fn test_rejects_empty_command() {
        assert!(CommandProbe::new("  ").is_err());
    }

    #[tokio::test]
    async fn test_exit_zero_matches_with_stdout_detail() {
        let outcome = run("echo found 1 camera", &[]).await.unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.detail, "found 1 camera");
    }

    #[tokio::test]
    async fn test_params_and_address_are_exported() {
        let outcome = run(
            "echo $RIGCHECK_STEP_ID $RIGCHECK_PARAM_PRESET $RIGCHECK_MACHINE_ADDRESS",
            &[("preset", "medium")],
        )
        .await
        .unwrap();
        assert_eq!(outcome.detail, "onvif-discovery medium 127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_template_placeholders_expand() {
        let outcome = run("echo {codec}", &[("codec", "h265")]).await.unwrap();
        assert_eq!(outcome.detail, "h265");
    }

    #[tokio::test]
    async fn test_exit_statuses_map_to_kinds() {
        let outcome = run("echo nothing; exit 1", &[]).await.unwrap();
        assert!(!outcome.matched);

        let err = run("exit 3", &[]).await.unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::Unreachable);

        let err = run("echo denied >&2; exit 4", &[]).await.unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::Unauthorized);
        assert_eq!(err.detail, "denied");

        let err = run("exit 2", &[]).await.unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::ProtocolMismatch);

        let err = run("exit 9", &[]).await.unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::ProtocolMismatch);
    }
}
