//! Volume Expander CLI
//!
//! Inspects claims managed by the volume expander and previews what the
//! operator would do, without changing anything in the cluster.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::{claims, plan, policy};
use expander_lib::metrics::{
    BearerToken, MetricsPoller, PrometheusClient, PrometheusClientConfig, DEFAULT_PROMETHEUS_URL,
    TOKEN_FILE,
};
use expander_lib::policy::{parse_duration, DEFAULT_GROWTH_PERCENT, DEFAULT_THRESHOLD_PERCENT};
use expander_lib::{PolicyDefaults, PolicyResolver, Quantity, QuantityError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Volume Expander CLI
#[derive(Parser)]
#[command(name = "vexctl")]
#[command(author, version, about = "CLI for the Volume Expander operator", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Prometheus API address
    #[arg(long, env = "PROMETHEUS_URL", default_value = DEFAULT_PROMETHEUS_URL, global = true)]
    pub prometheus_url: String,

    /// Bearer token for Prometheus (defaults to the service account token)
    #[arg(long, env = "TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Skip TLS certificate verification towards Prometheus
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Output format
    #[arg(long = "output", short = 'o', default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub defaults: DefaultsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List claims and their resolved policy
    Claims {
        /// Namespace to list
        #[arg(long, short, conflicts_with = "all_namespaces")]
        namespace: Option<String>,

        /// List claims in every namespace
        #[arg(long = "all-namespaces", short = 'A')]
        all_namespaces: bool,

        /// Include claims that are not opted in
        #[arg(long)]
        all: bool,
    },

    /// Show what the operator would do for a claim right now
    Plan {
        /// Claim name
        name: String,

        /// Claim namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Resolve a policy from annotations, without a cluster
    Policy {
        /// Annotation as KEY=VALUE; bare keys get the operator prefix
        #[arg(long = "annotation", short = 'a')]
        annotations: Vec<String>,
    },
}

/// Fallbacks for claims without their own values; read from the same
/// variables as the operator so both resolve identical policies
#[derive(Args, Debug, Clone)]
pub struct DefaultsArgs {
    /// Polling interval used when a claim sets none
    #[arg(
        long = "default-polling-interval",
        env = "EXPANDER_DEFAULT_POLLING_INTERVAL",
        default_value = "30s",
        value_parser = parse_duration,
        global = true
    )]
    pub polling_interval: Duration,

    /// Growth percent used when a claim sets none
    #[arg(
        long = "default-expand-by-percent",
        env = "EXPANDER_DEFAULT_EXPAND_BY_PERCENT",
        default_value_t = DEFAULT_GROWTH_PERCENT,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    pub growth_percent: u32,

    /// Threshold percent used when a claim sets none
    #[arg(
        long = "default-expand-threshold-percent",
        env = "EXPANDER_DEFAULT_EXPAND_THRESHOLD_PERCENT",
        default_value_t = DEFAULT_THRESHOLD_PERCENT,
        value_parser = clap::value_parser!(u32).range(1..=99),
        global = true
    )]
    pub threshold_percent: u32,

    /// Ceiling used when a claim sets none; unbounded if unset
    #[arg(
        long = "default-expand-up-to",
        env = "EXPANDER_DEFAULT_EXPAND_UP_TO",
        value_parser = parse_quantity,
        global = true
    )]
    pub ceiling: Option<Quantity>,
}

fn parse_quantity(raw: &str) -> Result<Quantity, QuantityError> {
    raw.parse()
}

impl DefaultsArgs {
    pub fn resolver(&self) -> PolicyResolver {
        PolicyResolver::new(PolicyDefaults {
            polling_interval: self.polling_interval,
            growth_percent: self.growth_percent,
            threshold_percent: self.threshold_percent,
            ceiling: self.ceiling.unwrap_or_else(Quantity::max),
        })
    }
}

fn metrics_poller(cli: &Cli) -> Result<MetricsPoller> {
    let token = match &cli.token {
        Some(token) => BearerToken::new(token.as_str()),
        None => BearerToken::discover(None, Path::new(TOKEN_FILE)),
    };
    let config = PrometheusClientConfig {
        address: cli.prometheus_url.clone(),
        insecure_skip_verify: cli.insecure,
        ..Default::default()
    };
    let client = PrometheusClient::new(config, token).context("Failed to create Prometheus client")?;
    if cli.verbose {
        output::print_info(&format!("Querying {}", client.query_url()));
    }
    Ok(MetricsPoller::new(Arc::new(client)))
}

async fn run(cli: Cli) -> Result<()> {
    let settings = config::Config::load()?;
    let resolver = cli.defaults.resolver();

    match &cli.command {
        Commands::Claims {
            namespace,
            all_namespaces,
            all,
        } => {
            let namespace = if *all_namespaces {
                None
            } else {
                Some(settings.namespace(namespace.clone()))
            };
            let client = config::kube_client(cli.kubeconfig.as_deref()).await?;
            claims::list_claims(client, &resolver, namespace, *all, cli.format).await?;
        }
        Commands::Plan { name, namespace } => {
            let namespace = settings.namespace(namespace.clone());
            let poller = metrics_poller(&cli)?;
            let client = config::kube_client(cli.kubeconfig.as_deref()).await?;
            plan::plan_claim(client, &poller, &resolver, name, &namespace, cli.format).await?;
        }
        Commands::Policy { annotations } => {
            policy::resolve(annotations, &resolver, cli.format)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_namespace_flags_conflict() {
        let result = Cli::try_parse_from(["vexctl", "claims", "-n", "a", "-A"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_flags_feed_resolver() {
        let cli = Cli::try_parse_from([
            "vexctl",
            "policy",
            "--default-polling-interval",
            "2m",
            "--default-expand-by-percent",
            "50",
            "--default-expand-up-to",
            "100Gi",
        ])
        .unwrap();

        let defaults = cli.defaults.resolver().defaults().clone();
        assert_eq!(defaults.polling_interval, Duration::from_secs(120));
        assert_eq!(defaults.growth_percent, 50);
        assert_eq!(defaults.threshold_percent, DEFAULT_THRESHOLD_PERCENT);
        assert_eq!(defaults.ceiling, "100Gi".parse::<Quantity>().unwrap());
    }

    #[test]
    fn test_invalid_default_flags_rejected() {
        for args in [
            ["vexctl", "policy", "--default-expand-threshold-percent", "100"],
            ["vexctl", "policy", "--default-expand-by-percent", "0"],
            ["vexctl", "policy", "--default-polling-interval", "0s"],
            ["vexctl", "policy", "--default-expand-up-to", "lots"],
        ] {
            assert!(Cli::try_parse_from(args).is_err(), "{:?}", args);
        }
    }

    #[test]
    fn test_policy_annotations_repeat() {
        let cli =
            Cli::try_parse_from(["vexctl", "policy", "-a", "autoexpand=true", "-a", "x=1"]).unwrap();
        match cli.command {
            Commands::Policy { annotations } => assert_eq!(annotations.len(), 2),
            _ => panic!("expected policy command"),
        }
    }
}
