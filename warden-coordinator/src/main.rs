use anyhow::{Context, Result};
use clap::Parser;
use std::fs::read_to_string;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use warden_coordinator::admin;
use warden_coordinator::args_parse::Args;
use warden_coordinator::coordinator_metrics::init_metrics;
use warden_coordinator::membership::FileMembershipSource;
use warden_coordinator::rebalance::{start_rebalancing_loop, RebalanceTrigger};
use warden_coordinator::service_configuration::{
    LoadConfiguration, MetaStoreBackend, ServiceConfiguration,
};
use warden_load_manager::LoadManager;
use warden_metadata_store::{MemoryStore, MetadataStorage, MetadataStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(&args.config_file)
        .with_context(|| format!("unable to read config file {}", args.config_file))?;
    let mut load_config = LoadConfiguration::parse(&config_content)?;

    // CLI flags take precedence over the configuration file
    if let Some(roster_file) = args.roster_file {
        load_config.membership.path = roster_file.into();
    }

    let mut service_config: ServiceConfiguration = load_config.try_into()?;

    if let Some(admin_addr) = args.admin_addr {
        service_config.admin_addr = admin_addr
            .parse()
            .context("Failed to parse --admin-addr")?;
    }
    if let Some(prom_exporter) = args.prom_exporter {
        service_config.prom_exporter = Some(
            prom_exporter
                .parse()
                .context("Failed to parse --prom-exporter")?,
        );
    }

    init_metrics(service_config.prom_exporter)?;

    let meta_store = create_meta_store(&service_config).await?;

    // Load reports posted by the listeners feed the account weights
    let load_manager = LoadManager::new(meta_store.clone(), service_config.weight_params);
    let load_stream = load_manager
        .bootstrap()
        .await
        .context("unable to load account load reports")?;

    let membership = Arc::new(FileMembershipSource::new(
        service_config.roster_path.clone(),
        service_config.membership_max_age,
    ));
    info!(
        roster = %service_config.roster_path.display(),
        "membership is read from the roster file at every rebalance"
    );

    let trigger = Arc::new(RebalanceTrigger::new(
        meta_store.clone(),
        membership,
        load_manager.clone(),
    ));
    if let Err(e) = trigger.load_status().await {
        warn!(error = %format!("{:#}", e), "unable to read the committed assignment at startup");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let load_task = {
        let load_manager = load_manager.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { load_manager.start(load_stream, shutdown).await })
    };

    let rebalance_task = start_rebalancing_loop(
        trigger.clone(),
        service_config.rebalance_interval,
        service_config.run_on_start,
        shutdown_rx.clone(),
    );

    let admin_task = tokio::spawn(admin::run(
        service_config.admin_addr,
        trigger.clone(),
        shutdown_rx,
    ));

    info!("Warden coordinator started");

    tokio::signal::ctrl_c()
        .await
        .context("unable to listen for the shutdown signal")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = load_task.await {
        error!(error = %e, "load manager task failed");
    }
    if let Err(e) = rebalance_task.await {
        error!(error = %e, "rebalancing loop failed");
    }
    match admin_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "admin API stopped with an error"),
        Err(e) => error!(error = %e, "admin API task failed"),
    }

    info!("Warden coordinator stopped");
    Ok(())
}

async fn create_meta_store(config: &ServiceConfiguration) -> Result<Arc<dyn MetadataStore>> {
    let storage = match config.meta_store_backend {
        MetaStoreBackend::Memory => {
            warn!("using the in-memory metadata store, listeners in other processes will not see assignments");
            MetadataStorage::InMemory(MemoryStore::new().await?)
        }
        #[cfg(feature = "etcd")]
        MetaStoreBackend::Etcd => {
            let store = warden_metadata_store::EtcdStore::new(config.meta_store_addr.clone())
                .await
                .with_context(|| format!("unable to connect to etcd at {}", config.meta_store_addr))?;
            MetadataStorage::Etcd(store)
        }
        #[cfg(not(feature = "etcd"))]
        MetaStoreBackend::Etcd => {
            anyhow::bail!("etcd backend requested but the coordinator was built without the `etcd` feature")
        }
    };

    info!(backend = storage.backend_name(), "metadata store ready");
    Ok(Arc::new(storage))
}
