//! Pipeline wiring
//!
//! Builds the components from configuration, runs the startup checks and
//! drives the two periodic loops plus the status server.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api;
use crate::config::Config;
use crate::error::{Dependency, FatalConfigError, PipelineResult};
use crate::logic::context::{ContextGenerator, OllamaGenerator};
use crate::logic::enrich::{EnrichmentScanner, ScanSettings};
use crate::logic::features::NormalizeContext;
use crate::logic::index::{ElasticIndex, SearchIndex};
use crate::logic::kismet::KismetClient;
use crate::logic::model::{load_scorer, AnomalyScorer};
use crate::logic::scheduler::spawn_periodic;
use crate::logic::sync::{CursorStore, SyncLoop};
use crate::status::SharedStatus;

// ============================================================================
// COMPONENTS
// ============================================================================

pub fn cursor_store(config: &Config) -> CursorStore {
    CursorStore::new(config.sync.cursor_path.clone())
}

/// Connect to Elasticsearch and make sure the target index exists
pub async fn connect_index(config: &Config) -> Result<Arc<ElasticIndex>, FatalConfigError> {
    let index = ElasticIndex::new(&config.elastic, config.retry.policy())?;

    let unreachable = |e: crate::error::DependencyError| FatalConfigError::Unreachable {
        service: Dependency::SearchIndex,
        message: e.to_string(),
    };

    let cluster = index.info().await.map_err(unreachable)?;
    info!(
        "Connected to Elasticsearch cluster '{}' (version {})",
        cluster.cluster_name, cluster.version.number
    );

    if index.ensure_index().await.map_err(unreachable)? {
        info!("Created index '{}'", index.index_name());
    } else {
        info!("Using existing index '{}'", index.index_name());
    }
    Ok(Arc::new(index))
}

/// Load the anomaly model; any failure disables scoring only
pub fn scorer_or_disabled(config: &Config) -> Option<Arc<dyn AnomalyScorer>> {
    match load_scorer(&config.model) {
        Ok(scorer) => {
            info!(model_id = scorer.model_id(), "Anomaly scoring enabled");
            Some(scorer)
        }
        Err(FatalConfigError::Disabled(what, reason)) => {
            info!("{} disabled: {}", what, reason);
            None
        }
        Err(e) => {
            warn!(error = %e, "Anomaly model failed to load - scoring disabled");
            None
        }
    }
}

/// Build the Ollama generator; a client that cannot be built disables
/// summaries only, an unhealthy server only logs a warning
pub async fn generator_or_disabled(config: &Config) -> Option<Arc<dyn ContextGenerator>> {
    if !config.ollama.enabled {
        info!("Context summaries disabled (CONTEXT_ENABLED=false)");
        return None;
    }

    let generator = match OllamaGenerator::new(&config.ollama, config.retry.policy()) {
        Ok(generator) => generator,
        Err(e) => {
            warn!(error = %e, "Ollama client failed to build - summaries disabled");
            return None;
        }
    };
    match generator.health_check().await {
        Ok(true) => info!("Ollama ready with model '{}'", config.ollama.model),
        Ok(false) => warn!(
            "Ollama is up but model '{}' is not pulled - summaries will fail until it is",
            config.ollama.model
        ),
        Err(e) => warn!(error = %e, "Ollama health check failed - summaries will retry each scan"),
    }
    Some(Arc::new(generator))
}

pub fn build_sync_loop(
    config: &Config,
    index: Arc<dyn SearchIndex>,
    status: SharedStatus,
) -> PipelineResult<SyncLoop> {
    let source = KismetClient::new(&config.kismet, config.retry.policy())?;
    let store = cursor_store(config);
    let cursor = store.load_or_initial(config.sync.initial_lookback_secs)?;
    info!(cursor = cursor.last_seen, path = %store.path().display(), "Sync cursor loaded");

    let ctx = NormalizeContext {
        sensor: config.sync.sensor.clone(),
        identity: config.sync.identity,
    };
    Ok(SyncLoop::new(
        Arc::new(source),
        index,
        store,
        cursor,
        ctx,
        config.sync.batch_size,
        status,
    ))
}

/// Sync loop, or `None` when it cannot start; enrichment runs either way
pub fn sync_or_disabled(config: &Config, index: Arc<dyn SearchIndex>, status: &SharedStatus) -> Option<SyncLoop> {
    match build_sync_loop(config, index, status.clone()) {
        Ok(sync) => Some(sync),
        Err(e) => {
            error!(error = %e, "Sync loop disabled - enrichment keeps running");
            status.update_sync(|s| {
                s.enabled = false;
                s.disabled_reason = Some(e.to_string());
            });
            None
        }
    }
}

pub async fn build_scanner(
    config: &Config,
    index: Arc<dyn SearchIndex>,
    status: SharedStatus,
) -> EnrichmentScanner {
    let scorer = scorer_or_disabled(config);
    let generator = generator_or_disabled(config).await;
    EnrichmentScanner::new(
        index,
        scorer,
        generator,
        ScanSettings::from_config(&config.enrich, &config.ollama),
        status,
    )
}

// ============================================================================
// RUN
// ============================================================================

/// Connect to Elasticsearch, then run until `shutdown` resolves
pub async fn run<S>(config: Config, shutdown: S) -> PipelineResult<()>
where
    S: Future<Output = ()>,
{
    let index = connect_index(&config).await?;
    run_with_index(config, index, SharedStatus::new(), shutdown).await
}

/// Run both loops and the status server against `index` until `shutdown`
/// resolves. A loop that cannot start is left out; the rest keep running.
pub async fn run_with_index<S>(
    config: Config,
    index: Arc<dyn SearchIndex>,
    status: SharedStatus,
    shutdown: S,
) -> PipelineResult<()>
where
    S: Future<Output = ()>,
{
    let sync = sync_or_disabled(&config, index.clone(), &status).map(Arc::new);
    let scanner = Arc::new(build_scanner(&config, index, status.clone()).await);

    let (stop_tx, stop_rx) = watch::channel(false);

    let sync_task = sync.map(|sync| {
        spawn_periodic("sync", config.sync_interval(), stop_rx.clone(), move || {
            let sync = sync.clone();
            async move {
                // Failures are logged and recorded by the loop itself
                let _ = sync.poll_once().await;
            }
        })
    });

    let enrich_task = spawn_periodic("enrich", config.enrich_interval(), stop_rx.clone(), move || {
        let scanner = scanner.clone();
        async move {
            let _ = scanner.tick().await;
        }
    });

    let server = if config.status_port != 0 {
        let port = config.status_port;
        let status = status.clone();
        let rx = stop_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(port, status, rx).await {
                error!(error = %e, "Status server stopped");
            }
        }))
    } else {
        info!("Status server disabled (STATUS_PORT=0)");
        None
    };

    info!("Pipeline running");
    shutdown.await;
    info!("Shutdown requested, waiting for in-flight work");
    let _ = stop_tx.send(true);

    for handle in [sync_task, Some(enrich_task), server].into_iter().flatten() {
        if let Err(e) = handle.await {
            error!(error = %e, "Task ended abnormally");
        }
    }

    let snapshot = status.snapshot();
    info!(
        cursor = snapshot.sync.cursor,
        docs_written = snapshot.sync.docs_written,
        scored = snapshot.enrich.scored,
        summarized = snapshot.enrich.summarized,
        "Pipeline stopped"
    );
    Ok(())
}
