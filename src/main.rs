//! onvif-scout - ONVIF camera discovery CLI

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onvif_scout::{
    config::{default_credentials, DiscoveryConfig},
    device_info::{describe_all, DeviceInfoManager, DeviceReport},
    discovery::{self, DiscoveryPlan, IpRange},
    models::{Candidate, CandidateSource, Credential},
    report,
    soap::SoapClient,
    Error,
};

#[derive(Parser, Debug)]
#[command(name = "onvif-scout")]
#[command(about = "Discover ONVIF cameras and negotiate authentication", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find devices by multicast probe and/or IP range scan, then describe them
    Discover(DiscoverArgs),
    /// Describe a single device service URL
    Info(InfoArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// WS-Discovery multicast only
    Broadcast,
    /// A single IP address
    Ip,
    /// CIDR or --start/--end range
    Subnet,
    /// Multicast plus any given ranges
    Mixed,
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Credential as user:pass, repeatable; defaults to common factory logins
    #[arg(short = 'c', long = "cred")]
    creds: Vec<String>,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Show channels, negotiation attempts and partial failures
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    #[arg(long, value_enum, default_value_t = Mode::Broadcast)]
    mode: Mode,

    /// Network interface for multicast (default: all)
    #[arg(short, long)]
    interface: Option<String>,

    #[arg(long)]
    ip: Option<String>,

    /// CIDR such as 192.168.1.0/24
    #[arg(long)]
    subnet: Option<String>,

    #[arg(long)]
    start: Option<String>,

    #[arg(long)]
    end: Option<String>,

    /// Comma separated ports to scan
    #[arg(long, value_delimiter = ',')]
    ports: Vec<u16>,

    /// Per-probe timeout in seconds (multicast listen window in broadcast mode)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Maximum concurrent probes
    #[arg(long)]
    concurrency: Option<usize>,

    /// Also write results to this file
    #[arg(short = 'o', long = "save")]
    save: Option<PathBuf>,

    #[command(flatten)]
    auth: AuthArgs,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Device service URL, e.g. http://192.168.1.64/onvif/device_service
    #[arg(long)]
    xaddr: String,

    #[command(flatten)]
    auth: AuthArgs,
}

fn credentials(args: &AuthArgs) -> onvif_scout::Result<Vec<Credential>> {
    if args.creds.is_empty() {
        return Ok(default_credentials());
    }
    args.creds.iter().map(|c| Credential::parse(c)).collect()
}

fn plan(args: &DiscoverArgs) -> onvif_scout::Result<DiscoveryPlan> {
    let ranges = || -> onvif_scout::Result<Vec<IpRange>> {
        let mut ranges = Vec::new();
        if let Some(ip) = &args.ip {
            ranges.push(IpRange::single(discovery::range::parse_ipv4(ip)?));
        }
        if let Some(cidr) = &args.subnet {
            ranges.push(IpRange::from_cidr(cidr)?);
        }
        match (&args.start, &args.end) {
            (Some(start), Some(end)) => ranges.push(IpRange::parse(start, end)?),
            (None, None) => {}
            _ => {
                return Err(Error::Input(
                    "--start and --end must be given together".to_string(),
                ))
            }
        }
        Ok(ranges)
    };

    let plan = match args.mode {
        Mode::Broadcast => DiscoveryPlan::multicast(),
        Mode::Ip => {
            let ip = args
                .ip
                .as_deref()
                .ok_or_else(|| Error::Input("--mode ip requires --ip".to_string()))?;
            DiscoveryPlan::ranges(vec![IpRange::single(discovery::range::parse_ipv4(ip)?)])
        }
        Mode::Subnet => {
            let ranges = ranges()?;
            if ranges.is_empty() {
                return Err(Error::Input(
                    "--mode subnet requires --subnet or --start/--end".to_string(),
                ));
            }
            DiscoveryPlan::ranges(ranges)
        }
        Mode::Mixed => DiscoveryPlan {
            multicast: true,
            ranges: ranges()?,
        },
    };
    Ok(plan)
}

fn build_config(args: &DiscoverArgs) -> onvif_scout::Result<DiscoveryConfig> {
    let mut config = DiscoveryConfig::default();
    config.multicast.interface = args.interface.clone();
    if !args.ports.is_empty() {
        config.scan.ports = args.ports.clone();
    }
    if let Some(secs) = args.timeout {
        let timeout = Duration::from_secs(secs.max(1));
        config.scan.probe_timeout = timeout;
        if args.mode == Mode::Broadcast {
            config.multicast.timeout = timeout;
        }
    }
    if let Some(n) = args.concurrency {
        config.scan.max_in_flight = n.max(1);
    }
    config.credentials = credentials(&args.auth)?;
    config.verbose = args.auth.verbose;
    Ok(config)
}

fn print_reports(reports: &[DeviceReport], auth: &AuthArgs) -> anyhow::Result<()> {
    if auth.json {
        println!("{}", report::render_json(reports)?);
    } else {
        print!("{}", report::render_table(reports, auth.verbose));
    }
    Ok(())
}

async fn run_discover(args: DiscoverArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let plan = plan(&args)?;
    tracing::info!(
        mode = ?args.mode,
        multicast = plan.multicast,
        ranges = plan.ranges.len(),
        credentials = config.credentials.len(),
        "Starting discovery"
    );

    let candidates = discovery::discover(&config, &plan).await?;
    let manager = DeviceInfoManager::new(SoapClient::new(&config.client)?);
    let reports = describe_all(
        &manager,
        &candidates,
        &config.credentials,
        config.scan.max_in_flight,
    )
    .await;

    print_reports(&reports, &args.auth)?;
    if let Some(path) = &args.save {
        report::save(path, &reports)?;
    }
    Ok(())
}

async fn run_info(args: InfoArgs) -> anyhow::Result<()> {
    let config = DiscoveryConfig::default();
    let candidate = Candidate::from_xaddr(&args.xaddr, CandidateSource::Manual)?;
    let creds = credentials(&args.auth)?;
    let manager = DeviceInfoManager::new(SoapClient::new(&config.client)?);
    let report = manager.report(&candidate, &creds).await;
    print_reports(std::slice::from_ref(&report), &args.auth)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Discover(a) => a.auth.verbose,
        Command::Info(a) => a.auth.verbose,
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if verbose {
                    "onvif_scout=debug".into()
                } else {
                    "onvif_scout=info".into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("onvif-scout v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Discover(args) => run_discover(args).await,
        Command::Info(args) => run_info(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DiscoverArgs {
        let mut argv = vec!["onvif-scout", "discover"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Discover(a) => a,
            Command::Info(_) => panic!("expected discover"),
        }
    }

    #[test]
    fn test_mode_plans() {
        let p = plan(&parse(&[])).unwrap();
        assert!(p.multicast && p.ranges.is_empty());

        let p = plan(&parse(&["--mode", "ip", "--ip", "10.0.0.7"])).unwrap();
        assert!(!p.multicast);
        assert_eq!(p.ranges[0].len(), 1);

        let p = plan(&parse(&["--mode", "subnet", "--subnet", "10.0.0.0/24"])).unwrap();
        assert_eq!(p.ranges[0].len(), 254);

        let mixed = parse(&["--mode", "mixed", "--start", "10.0.0.1", "--end", "10.0.0.9"]);
        let p = plan(&mixed).unwrap();
        assert!(p.multicast);
        assert_eq!(p.ranges[0].len(), 9);
    }

    #[test]
    fn test_invalid_plans() {
        assert!(plan(&parse(&["--mode", "ip"])).is_err());
        assert!(plan(&parse(&["--mode", "subnet"])).is_err());
        assert!(plan(&parse(&["--mode", "subnet", "--start", "10.0.0.1"])).is_err());
        let reversed = parse(&["--mode", "subnet", "--start", "10.0.0.9", "--end", "10.0.0.1"]);
        assert!(plan(&reversed).is_err());
    }

    #[test]
    fn test_config_overrides() {
        let args = parse(&[
            "--ports",
            "80,8000",
            "-t",
            "5",
            "--concurrency",
            "20",
            "-c",
            "root:pw",
            "-c",
            "admin:",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.scan.ports, vec![80, 8000]);
        assert_eq!(config.scan.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.multicast.timeout, Duration::from_secs(5));
        assert_eq!(config.scan.max_in_flight, 20);
        assert_eq!(
            config.credentials,
            vec![Credential::new("root", "pw"), Credential::new("admin", "")]
        );
    }
}
