use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

use crate::model::{Fingerprint, ObjectSet};
use crate::pipeline::traits::{Analysis, AnalysisError, Inbox};

use super::offload;

/// Tracks which fingerprints were seen behind each `address:or_port`
/// endpoint and reports endpoints that presented more than one.
///
/// Relays that rotate their identity key while keeping the same endpoint
/// show up here.
pub struct FingerprintChanges<W> {
    state: Option<EndpointLog<W>>,
}

struct EndpointLog<W> {
    out: W,
    endpoints: BTreeMap<SocketAddr, BTreeSet<Fingerprint>>,
    changed: usize,
}

impl<W: Write + Send + 'static> FingerprintChanges<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Some(EndpointLog {
                out,
                endpoints: BTreeMap::new(),
                changed: 0,
            }),
        }
    }
}

impl<W: Write> EndpointLog<W> {
    fn observe(&mut self, address: IpAddr, or_port: u16, fingerprint: &Fingerprint) {
        self.endpoints
            .entry(SocketAddr::new(address, or_port))
            .or_default()
            .insert(fingerprint.clone());
    }

    fn process(&mut self, set: &ObjectSet) {
        if let Some(descriptors) = set.descriptors() {
            for d in descriptors.iter() {
                self.observe(d.address, d.or_port, &d.fingerprint);
            }
        }
        if let Some(consensus) = set.consensus() {
            for s in consensus.iter() {
                self.observe(s.address, s.or_port, &s.fingerprint);
            }
        }
    }

    /// Endpoints with more than one fingerprint, in endpoint order.
    fn changes(&self) -> impl Iterator<Item = (&SocketAddr, &BTreeSet<Fingerprint>)> {
        self.endpoints.iter().filter(|(_, fprs)| fprs.len() > 1)
    }

    fn report(&mut self) -> std::io::Result<()> {
        let mut lines = Vec::new();
        for (endpoint, fprs) in self.changes() {
            let joined: Vec<&str> = fprs.iter().map(Fingerprint::as_str).collect();
            lines.push(format!("{} {} {}", endpoint, fprs.len(), joined.join(",")));
        }
        for line in &lines {
            writeln!(self.out, "{}", line)?;
        }
        self.changed = lines.len();
        self.out.flush()
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Analysis for FingerprintChanges<W> {
    fn name(&self) -> &str {
        "fingerprint-changes"
    }

    async fn run(&mut self, mut inbox: Inbox) -> Result<(), AnalysisError> {
        while let Some(set) = inbox.recv().await {
            offload(&mut self.state, move |state: &mut EndpointLog<W>| {
                state.process(&set);
                Ok(())
            })
            .await?;
        }
        offload(&mut self.state, |state: &mut EndpointLog<W>| {
            state.report().map_err(AnalysisError::from)
        })
        .await?;

        if let Some(state) = &self.state {
            info!(
                endpoints = state.endpoints.len(),
                changed = state.changed,
                "Fingerprint changes reported"
            );
        }
        Ok(())
    }
}
