use crate::checks::cidr::Cidr;
use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `domcheck` binary.
///
/// Selects which checks to run on every domain, where the domains come from,
/// and what to print. Tuning knobs can also be set through environment
/// variables (a `.env` file in the working directory is honoured).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "domcheck",
    version,
    about = "Check a batch of domains for a valid TLS handshake, an expected CNAME and allowed IP ranges"
)]
pub struct CliArgs {
    /// Number of domains checked concurrently.
    ///
    /// Also bounds how many domains are read ahead of the checks in flight.
    ///
    /// Environment variable: `DOMCHECK_CONCURRENCY`
    #[arg(short, long, env = "DOMCHECK_CONCURRENCY", default_value_t = 32)]
    pub concurrency: usize,

    /// Check if the domain presents a valid certificate on port 443.
    #[arg(long, default_value_t = false)]
    pub tls: bool,

    /// CNAME the domain must resolve to (e.g. `edge.example-cdn.net`).
    #[arg(long)]
    pub cname: Option<String>,

    /// IP range every resolved address must fall into. Repeatable.
    ///
    /// Example: `--cidr 192.0.2.0/24 --cidr 2001:db8::/32`
    #[arg(long = "cidr", value_name = "NETWORK")]
    pub cidrs: Vec<Cidr>,

    /// Seconds allowed for each network operation of a check.
    ///
    /// Environment variable: `DOMCHECK_TIMEOUT`
    #[arg(long, env = "DOMCHECK_TIMEOUT", default_value_t = 10)]
    pub timeout: u64,

    /// Show more info on the console.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// File with the domains to check, one per line (`-` for stdin).
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Print valid domains.
    #[arg(short = 'p', long, default_value_t = false)]
    pub print_valid: bool,

    /// Print invalid domains.
    #[arg(short = 'i', long, default_value_t = false)]
    pub print_invalid: bool,

    /// Exit with code 1 upon detecting an invalid domain.
    #[arg(short = 'e', long = "exit", default_value_t = false)]
    pub exit_on_invalid: bool,

    /// Domains to check when no file is given.
    pub domains: Vec<String>,
}

/// Which checks to run on every domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckConfig {
    pub tls: bool,
    pub cname: Option<String>,
    pub cidrs: Vec<Cidr>,
    pub timeout: Duration,
}

impl CheckConfig {
    pub fn is_empty(&self) -> bool {
        !self.tls && self.cname.is_none() && self.cidrs.is_empty()
    }
}

/// Where the domains are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    File(PathBuf),
    Stdin,
    Args(Vec<String>),
}

/// What to do with each result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportConfig {
    pub print_valid: bool,
    pub print_invalid: bool,
    pub exit_on_invalid: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub concurrency: usize,
    pub verbose: bool,
    pub checks: CheckConfig,
    pub source: SourceConfig,
    pub report: ReportConfig,
}

impl Config {
    /// Builds the config, deciding on stdin only when neither a file nor
    /// domains were given and `stdin_is_terminal` is false.
    pub fn from_args(args: CliArgs, stdin_is_terminal: bool) -> anyhow::Result<Self> {
        if args.concurrency == 0 {
            bail!("DOMCHECK_CONCURRENCY must be greater than 0");
        }
        if args.timeout == 0 {
            bail!("DOMCHECK_TIMEOUT must be greater than 0");
        }

        let source = match args.file {
            Some(_) if !args.domains.is_empty() => {
                bail!("pass domains either with --file or as arguments, not both")
            }
            Some(path) if path.as_os_str() == "-" => SourceConfig::Stdin,
            Some(path) => SourceConfig::File(path),
            None if !args.domains.is_empty() => SourceConfig::Args(args.domains),
            None if !stdin_is_terminal => SourceConfig::Stdin,
            None => bail!("no domains to process: pass them as arguments, with --file, or on stdin"),
        };

        let cname = match args.cname {
            Some(name) if name.trim().is_empty() => bail!("--cname must not be empty"),
            other => other,
        };

        Ok(Self {
            concurrency: args.concurrency,
            verbose: args.verbose,
            checks: CheckConfig {
                tls: args.tls,
                cname,
                cidrs: args.cidrs,
                timeout: Duration::from_secs(args.timeout),
            },
            source,
            report: ReportConfig {
                print_valid: args.print_valid,
                print_invalid: args.print_invalid,
                exit_on_invalid: args.exit_on_invalid,
            },
        })
    }
}

impl TryFrom<CliArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        use std::io::IsTerminal;
        Self::from_args(args, std::io::stdin().is_terminal())
    }
}
