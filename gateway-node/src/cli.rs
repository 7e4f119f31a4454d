use anyhow::Context;
use argh::FromArgs;

use crate::config::GatewayConfig;

/// the payment gateway CLI
#[derive(Debug, FromArgs)]
pub struct Args {
    #[argh(subcommand)]
    cmd: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Serve(ServeCommand),
}

/// Run the gateway's HTTP server and background workers
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "serve")]
struct ServeCommand {
    /// address to bind the HTTP API to
    #[argh(option, default = "\"127.0.0.1:8080\".to_string()")]
    addr: String,

    /// path to a TOML config file (§6's `{DistributedLock, Queue, Deadlock,
    /// RateLimit, Webhook}` object). Missing sections fall back to defaults.
    #[argh(option)]
    config: Option<String>,

    /// team slug of a merchant seeded into the in-memory merchant source,
    /// since this crate has no `teams` table (§6 scopes persistence out)
    #[argh(option, default = "\"demo-team\".to_string()")]
    demo_team_slug: String,

    /// plaintext password for the seeded demo merchant; only its SHA-256 is
    /// ever held in memory, matching how a real `teams` row stores it
    #[argh(option, default = "\"demo-password\".to_string()")]
    demo_password: String,

    /// the seeded demo merchant's daily confirmed-amount limit, in minor
    /// units
    #[argh(option, default = "9_999_999")]
    demo_daily_limit: u64,
}

impl Args {
    pub fn run(self) -> anyhow::Result<()> {
        match self.cmd {
            Command::Serve(args) => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .context("Failed to build tokio runtime")?;
                rt.block_on(run_serve(args))
            }
        }
    }
}

async fn run_serve(args: ServeCommand) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => GatewayConfig::from_toml_file(std::path::Path::new(path))?,
        None => GatewayConfig::default(),
    };

    let addr: std::net::SocketAddr = args
        .addr
        .parse()
        .with_context(|| format!("Invalid --addr {:?}", args.addr))?;

    let demo_merchant = crate::app::DemoMerchantSeed {
        team_slug: args.demo_team_slug,
        password: args.demo_password,
        daily_limit: args.demo_daily_limit,
    };

    crate::app::run(addr, config, demo_merchant).await
}
