use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "warden-coordinator")]
#[command(about = "Warden coordinator - assigns channels to listener accounts and propagates changes", long_about = None)]
#[command(version)]
pub struct Args {
    /// Path to the coordinator YAML configuration file
    #[arg(long, env = "WARDEN_CONFIG_FILE", default_value = "./config/warden_coordinator.yml")]
    pub config_file: String,

    /// Admin API listen address, overrides the configuration file (e.g. 0.0.0.0:8090)
    #[arg(long, env = "WARDEN_ADMIN_ADDR")]
    pub admin_addr: Option<String>,

    /// Prometheus exporter address, overrides the configuration file (e.g. 0.0.0.0:9040)
    #[arg(long, env = "WARDEN_PROM_EXPORTER")]
    pub prom_exporter: Option<String>,

    /// Roster file with the channel universe and account membership, overrides the configuration file
    #[arg(long, env = "WARDEN_ROSTER_FILE")]
    pub roster_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_flags() {
        let args = Args::try_parse_from(["warden-coordinator"]).unwrap();
        assert_eq!(args.config_file, "./config/warden_coordinator.yml");
        assert!(args.admin_addr.is_none());
        assert!(args.prom_exporter.is_none());
    }

    #[test]
    fn flags_override() {
        let args = Args::try_parse_from([
            "warden-coordinator",
            "--config-file",
            "/etc/warden.yml",
            "--admin-addr",
            "127.0.0.1:9999",
            "--roster-file",
            "/var/lib/warden/roster.yml",
        ])
        .unwrap();
        assert_eq!(args.config_file, "/etc/warden.yml");
        assert_eq!(args.admin_addr.as_deref(), Some("127.0.0.1:9999"));
        assert_eq!(args.roster_file.as_deref(), Some("/var/lib/warden/roster.yml"));
    }
}
