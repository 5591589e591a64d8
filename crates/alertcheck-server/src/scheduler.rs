use crate::config::ResolvedSettings;
use crate::exporter::Exporter;
use alertcheck_client::PrometheusClient;
use alertcheck_engine::extract::PromqlParser;
use alertcheck_engine::reconcile::{Collaborators, Reconciler};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Builds the reconciliation loop of every configured target. All loops
/// publish into the same exporter.
pub fn build_reconcilers(
    settings: &ResolvedSettings,
    exporter: Arc<Exporter>,
) -> anyhow::Result<Vec<Reconciler>> {
    let parser = Arc::new(PromqlParser);
    settings
        .targets
        .iter()
        .map(|target| -> anyhow::Result<Reconciler> {
            let client = Arc::new(PrometheusClient::for_target(
                target,
                settings.request_timeout,
            )?);
            Ok(Reconciler::new(
                target.clone(),
                settings.ladder.clone(),
                settings.compute_interval,
                Collaborators {
                    rules: client.clone(),
                    backend: client,
                    parser: parser.clone(),
                    sink: exporter.clone(),
                    reporter: exporter.clone(),
                },
            ))
        })
        .collect()
}

/// Runs one reconciliation loop per target, each on its own task.
pub struct ValidationScheduler {
    tasks: JoinSet<(String, alertcheck_engine::Result<()>)>,
}

impl ValidationScheduler {
    pub fn start(reconcilers: Vec<Reconciler>) -> Self {
        let mut tasks = JoinSet::new();
        for reconciler in reconcilers {
            let name = reconciler.target().display_name();
            tasks.spawn(async move { (name, reconciler.run().await) });
        }
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Resolves when a loop stops, which only happens on a fatal error.
    /// Never resolves when there are no loops.
    pub async fn wait_fatal(&mut self) -> anyhow::Error {
        match self.tasks.join_next().await {
            Some(Ok((name, Err(e)))) => anyhow::anyhow!("validation of {name} stopped: {e}"),
            Some(Ok((name, Ok(())))) => anyhow::anyhow!("validation of {name} stopped unexpectedly"),
            Some(Err(e)) => anyhow::anyhow!("validation task failed: {e}"),
            None => std::future::pending().await,
        }
    }

    pub fn shutdown(&mut self) {
        self.tasks.abort_all();
    }
}
