use clap::{Parser, Subcommand};
use colored::Colorize;
use devicesweep::cmd;
use devicesweep::cmd::cleanup::CleanupCommands;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "devicesweep",
    about = "Find and clean up stale Intune devices",
    version,
    long_about = "Classify Intune and Entra ID devices that are stale, orphaned, stuck in \
                  enrollment or duplicated by re-enrollment, then export, retire or delete \
                  them under exclusions and a per-run cap."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// Classify and clean up stale devices
    #[command(subcommand)]
    Cleanup(CleanupCommands),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),

    /// Set per-tenant cleanup defaults
    Defaults(cmd::tenant::TenantDefaultsArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> devicesweep::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("devicesweep=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
            TenantCommands::Defaults(args) => cmd::tenant::defaults(args).await?,
        },
        Commands::Cleanup(cleanup_cmd) => match cleanup_cmd {
            CleanupCommands::Run(args) => cmd::cleanup::run(args).await?,
            CleanupCommands::Plan(args) => cmd::cleanup::plan(args).await?,
        },
    }

    Ok(())
}
