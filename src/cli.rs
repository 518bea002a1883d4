//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// TensorFlow-as-a-Service front end with grid certificate authorization
#[derive(Parser, Debug)]
#[command(name = "tfaas-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "TFAAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Local directory to serve [default: models]
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Port to listen on [default: 8083]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Server certificate (PEM) [default: server.crt]
    #[arg(long, alias = "serverCert")]
    pub server_cert: Option<String>,

    /// Server private key (PEM) [default: server.key]
    #[arg(long, alias = "serverKey")]
    pub server_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TFAAS_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "TFAAS_LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.dir {
            config.server.dir.clone_from(dir);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(cert) = &self.server_cert {
            config.tls.server_cert.clone_from(cert);
        }
        if let Some(key) = &self.server_key {
            config.tls.server_key.clone_from(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::try_parse_from(["tfaas-server"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.server.port, 8083);
        assert_eq!(config.server.dir, PathBuf::from("models"));
        assert_eq!(config.tls.server_cert, "server.crt");
        assert_eq!(config.tls.server_key, "server.key");
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "tfaas-server",
            "--dir",
            "/srv/models",
            "--port",
            "9443",
            "--server-cert",
            "/etc/tfaas/tls.crt",
            "--serverKey",
            "/etc/tfaas/tls.key",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.server.dir, PathBuf::from("/srv/models"));
        assert_eq!(config.server.port, 9443);
        assert_eq!(config.tls.server_cert, "/etc/tfaas/tls.crt");
        assert_eq!(config.tls.server_key, "/etc/tfaas/tls.key");
    }

    #[test]
    fn subcommands_are_rejected() {
        assert!(Cli::try_parse_from(["tfaas-server", "serve"]).is_err());
    }
}
