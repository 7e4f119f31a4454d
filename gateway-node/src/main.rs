mod app;
mod auth;
mod background;
mod cli;
mod config;
mod handlers;
mod logger;

fn main() -> anyhow::Result<()> {
    logger::init();
    let args: cli::Args = argh::from_env();
    args.run()
}
