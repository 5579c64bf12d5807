use std::future::Future;
use std::sync::Arc;
use tailflux_core::{Config, LocationLookup, PointWriter, Result, TailfluxError};
use tailflux_ingestion::{create_line_channel, FileTail};
use tailflux_modules::{create_record_channel, ExtractorStats, RecordExtractor};
use tailflux_output::{SinkStats, TimeSeriesSink};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// What each stage reported when the pipeline stopped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub lines_read: u64,
    pub extractor: ExtractorStats,
    pub sink: SinkStats,
}

/// Reader, extractor and sink wired together by two hand-off channels
pub struct Pipeline {
    config: Config,
    lookup: Arc<dyn LocationLookup>,
    writer: Arc<dyn PointWriter>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        lookup: Arc<dyn LocationLookup>,
        writer: Arc<dyn PointWriter>,
    ) -> Self {
        Self {
            config,
            lookup,
            writer,
        }
    }

    /// Open the log file and spawn the three stages
    ///
    /// The file is positioned at its end before this returns, so anything
    /// appended afterwards is picked up.
    pub async fn start(self, cancel: CancellationToken) -> Result<RunningPipeline> {
        let file = &self.config.ingestion.file;

        let tail = FileTail::open(&file.path, file.poll_interval()).await?;
        let extractor = RecordExtractor::new(self.lookup.clone(), self.config.modules.geo.timeout());
        let sink = TimeSeriesSink::from_config(self.writer.clone(), &self.config.output.influx)?;

        info!(
            path = %tail.path().display(),
            lookup = self.lookup.name(),
            "Pipeline started"
        );

        let (line_tx, line_rx) = create_line_channel();
        let (record_tx, record_rx) = create_record_channel();

        let reader = spawn_stage("reader", cancel.clone(), {
            let cancel = cancel.clone();
            async move { tail.run(line_tx, cancel).await.map_err(TailfluxError::from) }
        });
        let extractor = spawn_stage("extractor", cancel.clone(), extractor.run(line_rx, record_tx));
        let sink = spawn_stage("sink", cancel.clone(), sink.run(record_rx));

        Ok(RunningPipeline {
            cancel,
            reader,
            extractor,
            sink,
        })
    }

    /// Start the pipeline and wait for it to stop
    pub async fn run(self, cancel: CancellationToken) -> Result<PipelineSummary> {
        self.start(cancel).await?.join().await
    }
}

/// Handles to the stages of a started pipeline
pub struct RunningPipeline {
    cancel: CancellationToken,
    reader: JoinHandle<Result<u64>>,
    extractor: JoinHandle<Result<ExtractorStats>>,
    sink: JoinHandle<Result<SinkStats>>,
}

impl RunningPipeline {
    /// Ask the reader to stop; work already handed off still drains
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for all stages to finish
    ///
    /// When several stages fail, the error that caused the others is
    /// returned rather than the closed-channel errors it produced.
    pub async fn join(self) -> Result<PipelineSummary> {
        let (reader, extractor, sink) = tokio::join!(self.reader, self.extractor, self.sink);
        let reader = flatten("reader", reader);
        let extractor = flatten("extractor", extractor);
        let sink = flatten("sink", sink);

        match (reader, extractor, sink) {
            (Ok(lines_read), Ok(extractor), Ok(sink)) => {
                let summary = PipelineSummary {
                    lines_read,
                    extractor,
                    sink,
                };
                info!(
                    lines_read,
                    records = extractor.records,
                    points_written = sink.points_written,
                    "Pipeline stopped"
                );
                Ok(summary)
            }
            (reader, extractor, sink) => {
                let errors: Vec<TailfluxError> = [reader.err(), extractor.err(), sink.err()]
                    .into_iter()
                    .flatten()
                    .collect();
                Err(root_cause(errors))
            }
        }
    }
}

/// Run a stage on its own task, cancelling the others if it fails or panics
fn spawn_stage<T, F>(stage: &'static str, cancel: CancellationToken, fut: F) -> JoinHandle<Result<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let task = tokio::spawn(fut);
    tokio::spawn(async move {
        let result = flatten(stage, task.await);
        if let Err(e) = &result {
            if !e.is_channel_closed() {
                error!(stage, error = %e, "Stage failed, stopping pipeline");
            }
            cancel.cancel();
        }
        result
    })
}

fn flatten<T>(stage: &'static str, joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    joined.unwrap_or_else(|e| {
        Err(TailfluxError::Stage {
            stage,
            message: e.to_string(),
        })
    })
}

/// First error that is not a consequence of another stage stopping
fn root_cause(errors: Vec<TailfluxError>) -> TailfluxError {
    let mut secondary = None;
    for e in errors {
        if !e.is_channel_closed() {
            return e;
        }
        secondary.get_or_insert(e);
    }
    secondary.unwrap_or_else(|| TailfluxError::Stage {
        stage: "pipeline",
        message: "stopped without reporting an error".to_string(),
    })
}
