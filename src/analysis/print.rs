use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use tracing::info;

use crate::model::{ObjectSet, RelayDescriptor, RouterStatus};
use crate::pipeline::traits::{Analysis, AnalysisError, Inbox};

use super::offload;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Descriptor(&'a RelayDescriptor),
    Status(&'a RouterStatus),
}

/// Dumps every received document as one JSON object per line.
pub struct PrettyPrint<W> {
    state: Option<Printer<W>>,
}

struct Printer<W> {
    out: W,
    printed: usize,
}

impl<W: Write + Send + 'static> PrettyPrint<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Some(Printer { out, printed: 0 }),
        }
    }

    pub fn printed(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.printed)
    }
}

impl<W: Write> Printer<W> {
    fn emit(&mut self, record: Record<'_>) -> Result<(), AnalysisError> {
        serde_json::to_writer(&mut self.out, &record)?;
        self.out.write_all(b"\n")?;
        self.printed += 1;
        Ok(())
    }

    fn process(&mut self, set: &ObjectSet) -> Result<(), AnalysisError> {
        if let Some(descriptors) = set.descriptors() {
            for descriptor in descriptors.iter() {
                self.emit(Record::Descriptor(descriptor))?;
            }
        }
        if let Some(consensus) = set.consensus() {
            for status in consensus.iter() {
                self.emit(Record::Status(status))?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Analysis for PrettyPrint<W> {
    fn name(&self) -> &str {
        "pretty-print"
    }

    async fn run(&mut self, mut inbox: Inbox) -> Result<(), AnalysisError> {
        while let Some(set) = inbox.recv().await {
            offload(&mut self.state, move |state: &mut Printer<W>| state.process(&set)).await?;
        }
        info!(documents = self.printed(), "Documents printed");
        Ok(())
    }
}
