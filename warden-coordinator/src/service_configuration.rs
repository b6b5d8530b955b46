use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use warden_load_manager::{WeightParams, DEFAULT_WEIGHT_ALPHA, DEFAULT_WEIGHT_MIN};

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadConfiguration {
    /// Metadata store configuration
    pub meta_store: MetaStoreConfig,
    /// Admin API configuration
    pub admin: HostPort,
    /// Optional Prometheus exporter, no exporter is installed when missing
    #[serde(default)]
    pub prometheus: Option<HostPort>,
    /// Where the channel universe and account roster are read from
    pub membership: MembershipConfig,
    /// Rebalance scheduling
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    /// Account weight smoothing
    #[serde(default)]
    pub weights: WeightsConfig,
}

impl LoadConfiguration {
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("invalid coordinator configuration")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetaStoreBackend {
    #[default]
    Memory,
    Etcd,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaStoreConfig {
    #[serde(default)]
    pub backend: MetaStoreBackend,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_etcd_port")]
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HostPort {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Roster file (YAML or JSON), re-read at the start of every rebalance
    pub path: PathBuf,
    /// Accounts whose membership was refreshed longer ago than this are ineligible
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RebalanceConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        RebalanceConfig {
            interval_seconds: default_interval_seconds(),
            run_on_start: default_run_on_start(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_min")]
    pub min: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        WeightsConfig {
            alpha: default_alpha(),
            min: default_min(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_etcd_port() -> u16 {
    2379
}

fn default_interval_seconds() -> u64 {
    3600
}

fn default_run_on_start() -> bool {
    true
}

fn default_alpha() -> f64 {
    DEFAULT_WEIGHT_ALPHA
}

fn default_min() -> f64 {
    DEFAULT_WEIGHT_MIN
}

/// configuration settings for the Warden coordinator, validated and ready to use
#[derive(Debug)]
pub struct ServiceConfiguration {
    /// Metadata store backend
    pub meta_store_backend: MetaStoreBackend,
    /// Metadata Persistent Store (etcd) address
    pub meta_store_addr: String,
    /// Admin API address
    pub admin_addr: SocketAddr,
    /// Prometheus exporter address
    pub prom_exporter: Option<SocketAddr>,
    /// Roster file
    pub roster_path: PathBuf,
    /// Maximum membership age, if enforced
    pub membership_max_age: Option<chrono::Duration>,
    /// Period of the scheduled rebalance
    pub rebalance_interval: Duration,
    /// Run a rebalance immediately at startup
    pub run_on_start: bool,
    /// EMA parameters of the weight tracker
    pub weight_params: WeightParams,
}

impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let admin_addr: SocketAddr = format!("{}:{}", config.admin.host, config.admin.port)
            .parse()
            .context("Failed to create admin_addr")?;

        let prom_exporter: Option<SocketAddr> = match &config.prometheus {
            Some(prom) => Some(
                format!("{}:{}", prom.host, prom.port)
                    .parse()
                    .context("Failed to create prom_exporter")?,
            ),
            None => None,
        };

        let meta_store_addr = format!("{}:{}", config.meta_store.host, config.meta_store.port);

        if config.rebalance.interval_seconds == 0 {
            bail!("rebalance.interval_seconds must be greater than zero");
        }

        let membership_max_age = match config.membership.max_age_seconds {
            Some(0) => bail!("membership.max_age_seconds must be greater than zero"),
            Some(secs) => Some(
                chrono::Duration::try_seconds(secs as i64)
                    .context("membership.max_age_seconds is out of range")?,
            ),
            None => None,
        };

        let weight_params = WeightParams::new(config.weights.alpha, config.weights.min)
            .context("invalid weights configuration")?;

        Ok(ServiceConfiguration {
            meta_store_backend: config.meta_store.backend,
            meta_store_addr,
            admin_addr,
            prom_exporter,
            roster_path: config.membership.path,
            membership_max_age,
            rebalance_interval: Duration::from_secs(config.rebalance.interval_seconds),
            run_on_start: config.rebalance.run_on_start,
            weight_params,
        })
    }
}
