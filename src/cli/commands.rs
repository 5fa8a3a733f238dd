use crate::cli::{Commands, ServeArgs};
use crate::config::Config;
use crate::forwarder::HttpForwarder;
use crate::index::PodIndex;
use crate::k8s::{K8sClient, KubeEventSource, NamespaceScope};
use crate::lookup::{LabelFilter, LookupService};
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::server::{self, AppState};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn handle_command(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Serve(args) => handle_serve(load_config(config_path, &args)?).await,
        Commands::Config(args) => handle_config(load_config(config_path, &args)?),
    }
}

fn load_config(path: Option<&Path>, args: &ServeArgs) -> Result<Config> {
    let mut config = Config::load(path)?;
    config.apply_overrides(args);
    config.validate()?;
    Ok(config)
}

fn handle_config(config: Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

async fn handle_serve(config: Config) -> Result<()> {
    info!(
        scheme = %config.identity_scheme,
        namespaces = ?config.namespaces,
        forward_url = %config.forward_url,
        "Starting pod label index"
    );

    let metrics = Metrics::new()?;
    let index = PodIndex::new();
    let client = K8sClient::try_default().await?;
    let shutdown = CancellationToken::new();

    // Subscribe everything before serving so a failed subscription aborts startup.
    let mut reconcilers = Vec::new();
    for scope in NamespaceScope::from_namespaces(&config.namespaces) {
        let source = KubeEventSource::new(client.clone());
        let reconciler = Reconciler::subscribe(
            source,
            scope,
            index.clone(),
            config.identity_scheme,
            metrics.clone(),
        )
        .await?;
        reconcilers.push(reconciler);
    }

    let tasks: Vec<_> = reconcilers
        .into_iter()
        .map(|reconciler| tokio::spawn(reconciler.run(shutdown.clone())))
        .collect();

    let lookup = LookupService::new(
        index,
        config.identity_scheme,
        config.identity_keys.clone(),
        LabelFilter::new(config.label_allow_list.iter().cloned(), config.tag_prefix.clone()),
        metrics.clone(),
    )
    .with_max_body_bytes(config.max_body_bytes);
    let forwarder = Arc::new(HttpForwarder::new(
        config.forward_url.clone(),
        config.forward_timeout(),
    )?);
    let state =
        AppState::new(lookup, forwarder, metrics).with_max_body_bytes(config.max_body_bytes);

    let token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    let served = server::serve(config.listen, state, shutdown.clone()).await;

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Reconciler task failed: {}", e);
        }
    }

    info!("podtag stopped");
    served
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutdown signal received (Ctrl+C)"),
        _ = terminate => info!("Shutdown signal received (SIGTERM)"),
    }
}
