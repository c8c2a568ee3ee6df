use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;
use tracing::{debug, info};

use crate::model::ObjectSet;
use crate::pipeline::traits::{Analysis, AnalysisError, Inbox};
use crate::similarity::{pairwise, DescriptorSimilarity};

use super::offload;

/// Row layout of similarity CSV output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvFormat {
    /// One line per pair and dimension: `fpr1,fpr2,dimension,value`.
    #[default]
    Long,
    /// One line per pair with every dimension as a column.
    Wide,
}

impl FromStr for CsvFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(CsvFormat::Long),
            "wide" => Ok(CsvFormat::Wide),
            other => Err(format!(
                "CSV format must be either 'long' or 'wide', but is '{}'",
                other
            )),
        }
    }
}

/// Writes the similarity of every descriptor pair of each received set.
///
/// Pair enumeration and writing run on the blocking pool, one received set
/// at a time.
pub struct SimilarityMatrix<W> {
    state: Option<MatrixWriter<W>>,
}

struct MatrixWriter<W> {
    format: CsvFormat,
    out: W,
    header_written: bool,
    pairs_written: usize,
}

impl<W: Write + Send + 'static> SimilarityMatrix<W> {
    pub fn new(format: CsvFormat, out: W) -> Self {
        Self {
            state: Some(MatrixWriter {
                format,
                out,
                header_written: false,
                pairs_written: 0,
            }),
        }
    }

    pub fn pairs_written(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.pairs_written)
    }
}

impl<W: Write> MatrixWriter<W> {
    fn write_header(&mut self) -> std::io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        match self.format {
            CsvFormat::Long => writeln!(self.out, "fingerprint1,fingerprint2,dimension,value"),
            CsvFormat::Wide => writeln!(
                self.out,
                "fingerprint1,fingerprint2,{}",
                DescriptorSimilarity::COLUMNS.join(",")
            ),
        }
    }

    fn write_pair(&mut self, sim: &DescriptorSimilarity) -> std::io::Result<()> {
        let values = sim.values();
        match self.format {
            CsvFormat::Long => {
                for (column, value) in DescriptorSimilarity::COLUMNS.iter().zip(values.iter()) {
                    writeln!(
                        self.out,
                        "{},{},{},{}",
                        sim.fingerprint1, sim.fingerprint2, column, value
                    )?;
                }
                Ok(())
            }
            CsvFormat::Wide => writeln!(
                self.out,
                "{},{},{}",
                sim.fingerprint1,
                sim.fingerprint2,
                values.join(",")
            ),
        }
    }

    fn process(&mut self, set: &ObjectSet) -> std::io::Result<()> {
        let pairs = pairwise(set);
        if pairs.len() == 0 {
            debug!("Object set holds no descriptor pairs");
            return Ok(());
        }

        self.write_header()?;
        for sim in pairs {
            self.write_pair(&sim)?;
            self.pairs_written += 1;
        }
        self.out.flush()
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Analysis for SimilarityMatrix<W> {
    fn name(&self) -> &str {
        "similarity-matrix"
    }

    async fn run(&mut self, mut inbox: Inbox) -> Result<(), AnalysisError> {
        while let Some(set) = inbox.recv().await {
            offload(&mut self.state, move |state: &mut MatrixWriter<W>| {
                state.process(&set).map_err(AnalysisError::from)
            })
            .await?;
        }
        info!(pairs = self.pairs_written(), "Similarity matrix written");
        Ok(())
    }
}
