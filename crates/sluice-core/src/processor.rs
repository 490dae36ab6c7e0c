//! Concurrent message processing
//!
//! [`MessageProcessor`] fans a batch of messages out to a pool of worker
//! threads. Every worker pins the current snapshot when it picks up a message
//! and runs the whole message under it, so a publication mid-batch affects
//! only messages picked up afterwards. Results are returned in input order.

use crate::config::EngineConfig;
use crate::error::{SluiceError, SluiceResult};
use crate::executor::PipelineOutcome;
use crate::listener::NoopListener;
use crate::metrics::RuleMetrics;
use crate::pipeline::Pipeline;
use crate::snapshot::SnapshotHandle;
use crossbeam::channel;
use sluice_types::Message;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Which pipelines a message runs through
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineSelection {
    /// Every pipeline of the snapshot, in name order
    #[default]
    All,
    /// The named pipelines, in the given order
    Named(Vec<String>),
}

/// One message after processing
#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub message: Message,
    pub outcomes: Vec<PipelineOutcome>,
    /// Version of the snapshot the message ran under
    pub snapshot_version: u64,
}

/// Runs batches of messages through the current snapshot on worker threads
#[derive(Debug, Clone)]
pub struct MessageProcessor {
    handle: Arc<SnapshotHandle>,
    config: EngineConfig,
    metrics: Option<Arc<RuleMetrics>>,
}

impl MessageProcessor {
    #[must_use]
    pub fn new(handle: Arc<SnapshotHandle>, config: EngineConfig) -> Self {
        Self { handle, config, metrics: None }
    }

    /// Report every evaluation into `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<RuleMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub const fn handle(&self) -> &Arc<SnapshotHandle> {
        &self.handle
    }

    #[must_use]
    pub fn metrics(&self) -> Option<&Arc<RuleMetrics>> {
        self.metrics.as_ref()
    }

    /// Process one message on the calling thread
    #[must_use]
    pub fn process(&self, message: Message, selection: &PipelineSelection) -> ProcessedMessage {
        let snapshot = self.handle.load();
        let pipelines: Vec<Arc<Pipeline>> = match selection {
            PipelineSelection::All => snapshot.pipelines().cloned().collect(),
            PipelineSelection::Named(names) => names
                .iter()
                .filter_map(|name| {
                    let pipeline = snapshot.pipeline(name).cloned();
                    if pipeline.is_none() {
                        warn!(pipeline = %name, version = snapshot.version(), "pipeline missing from snapshot");
                    }
                    pipeline
                })
                .collect(),
        };

        let mut message = message;
        let executor = snapshot.executor();
        let outcomes = match &self.metrics {
            Some(metrics) => {
                let mut listener: &RuleMetrics = metrics;
                executor.process(pipelines.iter().map(|p| &**p), &mut message, &mut listener)
            }
            None => executor.process(pipelines.iter().map(|p| &**p), &mut message, &mut NoopListener),
        };
        ProcessedMessage { message, outcomes, snapshot_version: snapshot.version() }
    }

    /// Process a batch on the worker pool
    ///
    /// # Errors
    ///
    /// `UnknownPipeline` if a named pipeline is missing from the current
    /// snapshot, `Worker` if a worker thread panicked.
    #[instrument(skip_all, fields(messages = messages.len(), workers = self.config.workers))]
    pub fn process_batch(
        &self,
        messages: Vec<Message>,
        selection: &PipelineSelection,
    ) -> SluiceResult<Vec<ProcessedMessage>> {
        if let PipelineSelection::Named(names) = selection {
            self.handle.load().select(names)?;
        }
        let total = messages.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let workers = self.config.workers.clamp(1, total);
        let (job_tx, job_rx) = channel::bounded::<(usize, Message)>(self.config.channel_capacity.max(1));
        let (done_tx, done_rx) = channel::unbounded::<(usize, ProcessedMessage)>();

        crossbeam::thread::scope(|scope| {
            for worker in 0..workers {
                let jobs = job_rx.clone();
                let done = done_tx.clone();
                scope.spawn(move |_| {
                    let mut handled = 0usize;
                    for (index, message) in jobs.iter() {
                        if done.send((index, self.process(message, selection))).is_err() {
                            break;
                        }
                        handled += 1;
                    }
                    debug!(worker, handled, "worker drained");
                });
            }
            drop(job_rx);
            drop(done_tx);

            for job in messages.into_iter().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        })
        .map_err(|_| SluiceError::Worker { message: "a worker thread panicked".to_string() })?;

        let mut results: Vec<(usize, ProcessedMessage)> = done_rx.iter().collect();
        if results.len() != total {
            return Err(SluiceError::Worker {
                message: format!("{} of {total} messages were not processed", total - results.len()),
            });
        }
        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, processed)| processed).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ConfigurationBuilder, ConfigurationSnapshot};
    use sluice_functions::FunctionRegistry;
    use sluice_types::Value;

    fn processor(workers: usize) -> MessageProcessor {
        let mut builder = ConfigurationBuilder::new(Arc::new(FunctionRegistry::with_builtins()));
        builder.add_source(
            r#"
            rule "double" when is_number($message.n) then set_field("doubled", to_long($message.n) * 2); end
            pipeline "math" stage 0 match pass rule "double"; end
            "#,
        );
        let (snapshot, report) = builder.build();
        assert!(report.is_clean());
        let config = EngineConfig { workers, channel_capacity: 2, ..EngineConfig::default() };
        MessageProcessor::new(Arc::new(SnapshotHandle::new(snapshot)), config)
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let messages: Vec<Message> = (0..50)
            .map(|n| {
                let mut message = Message::with_id(format!("m-{n}"));
                message.set_field("n", Value::Long(n));
                message
            })
            .collect();

        let processed = processor(4).process_batch(messages, &PipelineSelection::All).unwrap();
        assert_eq!(processed.len(), 50);
        for (n, item) in processed.iter().enumerate() {
            assert_eq!(item.message.id(), format!("m-{n}"));
            assert_eq!(item.message.field("doubled"), Some(&Value::Long(n as i64 * 2)));
            assert_eq!(item.snapshot_version, 1);
        }
    }

    #[test]
    fn test_unknown_pipeline_is_rejected_up_front() {
        let err = processor(2)
            .process_batch(vec![Message::with_id("m")], &PipelineSelection::Named(vec!["nope".into()]))
            .unwrap_err();
        assert_eq!(err, SluiceError::UnknownPipeline { name: "nope".into() });
    }

    #[test]
    fn test_empty_snapshot_passes_messages_through() {
        let registry = Arc::new(FunctionRegistry::with_builtins());
        let processor = MessageProcessor::new(
            Arc::new(SnapshotHandle::new(ConfigurationSnapshot::empty(registry))),
            EngineConfig::default(),
        );
        let processed = processor.process(Message::with_id("m"), &PipelineSelection::All);
        assert!(processed.outcomes.is_empty());
        assert_eq!(processed.message, Message::with_id("m"));
    }
}
