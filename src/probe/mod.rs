//! Probe adapters
//!
//! Each adapter performs one automated network-level check against the
//! device and normalizes the result into a [`ProbeOutcome`] or a
//! [`ProbeError`]. Adapters never retry or time out on their own; the
//! orchestrator owns that policy.

pub mod command;
pub mod ffprobe;
pub mod http;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::config::{Config, ProbeConfig};
use crate::common::credentials::Credentials;
use crate::common::{Error, Result};
use crate::device::DeviceConnection;

/// Automated check capabilities a step can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Stream reachability and codec
    Stream,
    /// Discovery service presence
    Discovery,
    /// Reconfiguration apply-and-verify
    Reconfigure,
    /// Upload presence and playability
    Upload,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Stream,
        Capability::Discovery,
        Capability::Reconfigure,
        Capability::Upload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Stream => "stream",
            Capability::Discovery => "discovery",
            Capability::Reconfigure => "reconfigure",
            Capability::Upload => "upload",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "Unknown probe capability '{}'. Supported: stream, discovery, reconfigure, upload",
                    s
                ))
            })
    }
}

/// Normalized result of a probe that ran to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the observed state matched what the step expects
    pub matched: bool,
    /// Human-readable evidence shown to the operator
    pub detail: String,
}

impl ProbeOutcome {
    pub fn matched(detail: impl Into<String>) -> Self {
        Self {
            matched: true,
            detail: detail.into(),
        }
    }

    pub fn mismatch(detail: impl Into<String>) -> Self {
        Self {
            matched: false,
            detail: detail.into(),
        }
    }
}

/// Why a probe could not produce an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeErrorKind {
    Timeout,
    Unreachable,
    ProtocolMismatch,
    Unauthorized,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::ProtocolMismatch => write!(f, "protocol mismatch"),
            Self::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// Probe failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub detail: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProbeErrorKind::Timeout,
            format!("no answer within {} seconds", after.as_secs_f64()),
        )
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Unreachable, detail)
    }

    pub fn protocol_mismatch(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::ProtocolMismatch, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Unauthorized, detail)
    }

    /// Unauthorized is fatal to the session; every other kind may be retried
    pub fn is_fatal(&self) -> bool {
        self.kind == ProbeErrorKind::Unauthorized
    }
}

/// What a step asks of a probe
#[derive(Debug, Clone, Copy)]
pub struct ProbeRequest<'a> {
    pub step_id: &'a str,
    pub params: &'a BTreeMap<String, String>,
}

impl<'a> ProbeRequest<'a> {
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params.get(name).map(String::as_str)
    }
}

/// One automated check capability
#[async_trait]
pub trait Probe: Send + Sync {
    /// Adapter name for logs and reports
    fn name(&self) -> &str;

    /// Run one attempt against the live connection
    async fn probe(
        &self,
        conn: &dyn DeviceConnection,
        request: &ProbeRequest<'_>,
    ) -> std::result::Result<ProbeOutcome, ProbeError>;
}

/// A registered adapter with its timeout override
#[derive(Clone)]
pub struct ProbeEntry {
    pub probe: Arc<dyn Probe>,
    pub timeout: Option<Duration>,
}

/// The available probe adapters, one per capability
#[derive(Clone, Default)]
pub struct ProbeSet {
    probes: HashMap<Capability, ProbeEntry>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the capability
    pub fn insert(&mut self, capability: Capability, probe: Arc<dyn Probe>) -> &mut Self {
        self.probes.insert(
            capability,
            ProbeEntry {
                probe,
                timeout: None,
            },
        );
        self
    }

    /// Register an adapter with its own per-attempt timeout
    pub fn insert_with_timeout(
        &mut self,
        capability: Capability,
        probe: Arc<dyn Probe>,
        timeout: Duration,
    ) -> &mut Self {
        self.probes.insert(
            capability,
            ProbeEntry {
                probe,
                timeout: Some(timeout),
            },
        );
        self
    }

    pub fn get(&self, capability: Capability) -> Option<&ProbeEntry> {
        self.probes.get(&capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.probes.contains_key(&capability)
    }

    /// Registered capabilities in a stable order
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.probes.keys().copied().collect();
        caps.sort();
        caps
    }

    /// Build the adapters named in the config file
    ///
    /// Without an explicit `[probes.stream]` section, an ffprobe stream probe
    /// is added when a camera IP is configured and ffprobe is installed.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Result<Self> {
        let mut set = Self::new();

        for (name, probe_config) in &config.probes {
            let capability: Capability = name.parse()?;
            let probe = build_probe(probe_config, credentials)?;
            tracing::debug!("Registered {} probe for '{}'", probe.name(), capability);
            match probe_config.timeout_secs() {
                Some(secs) => set.insert_with_timeout(capability, probe, Duration::from_secs(secs)),
                None => set.insert(capability, probe),
            };
        }

        if !set.contains(Capability::Stream) && credentials.camera_ip.is_some() {
            match ffprobe::FfprobeProbe::discover(None, credentials.clone()) {
                Ok(probe) => {
                    tracing::debug!("Using ffprobe at {} for stream checks", probe.binary().display());
                    set.insert(Capability::Stream, Arc::new(probe));
                }
                Err(e) => tracing::debug!("No default stream probe: {}", e),
            }
        }

        Ok(set)
    }
}

fn build_probe(config: &ProbeConfig, credentials: &Credentials) -> Result<Arc<dyn Probe>> {
    let probe: Arc<dyn Probe> = match config {
        ProbeConfig::Ffprobe { binary, .. } => Arc::new(ffprobe::FfprobeProbe::discover(
            binary.as_deref(),
            credentials.clone(),
        )?),
        ProbeConfig::Http { url, .. } => Arc::new(http::HttpProbe::new(url)?),
        ProbeConfig::Command { command, .. } => Arc::new(command::CommandProbe::new(command)?),
    };
    Ok(probe)
}

/// Fill `{name}` placeholders from step params; unknown placeholders are kept
pub(crate) fn expand_template(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}
