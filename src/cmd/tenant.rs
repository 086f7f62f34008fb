use crate::config::{AuthType, CleanupDefaults, CleanupOverrides, ConfigManager, TenantConfig};
use crate::error::Result;
use crate::graph::auth::REQUIRED_SCOPES;
use crate::lifecycle::RequestedAction;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Per-tenant replacements for the `[cleanup]` section of config.toml
#[derive(Args, Debug, Default)]
pub struct CleanupOverrideArgs {
    /// Days without sync before a device is stale
    #[arg(long)]
    stale_days: Option<i64>,

    /// Devices kept per duplicate group
    #[arg(long)]
    duplicate_threshold: Option<i64>,

    /// Most devices acted on per run
    #[arg(long)]
    max_count: Option<i64>,

    /// Default action for `cleanup run`
    #[arg(long, value_enum)]
    action: Option<RequestedAction>,

    /// Always include Entra ID directory devices
    #[arg(long)]
    include_directory: Option<bool>,

    /// Exclusions CSV used for this tenant
    #[arg(long)]
    exclusions: Option<PathBuf>,
}

impl CleanupOverrideArgs {
    fn into_overrides(self) -> CleanupOverrides {
        CleanupOverrides {
            stale_days: self.stale_days,
            duplicate_threshold: self.duplicate_threshold,
            max_count: self.max_count,
            action: self.action,
            include_directory: self.include_directory,
            exclusions_file: self.exclusions,
        }
    }

    /// Layer these flags over what the tenant already has
    fn merge_into(self, mut current: CleanupOverrides) -> CleanupOverrides {
        let given = self.into_overrides();
        current.stale_days = given.stale_days.or(current.stale_days);
        current.duplicate_threshold = given.duplicate_threshold.or(current.duplicate_threshold);
        current.max_count = given.max_count.or(current.max_count);
        current.action = given.action.or(current.action);
        current.include_directory = given.include_directory.or(current.include_directory);
        current.exclusions_file = given.exclusions_file.or(current.exclusions_file);
        current
    }
}

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    name: String,

    /// Tenant ID (Entra ID tenant ID)
    #[arg(long)]
    tenant_id: String,

    /// Client ID (Application ID)
    #[arg(long)]
    client_id: String,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,

    #[command(flatten)]
    cleanup: CleanupOverrideArgs,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Show credentials, auth status and effective cleanup settings
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    /// Tenant name to switch to
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    /// Tenant name to remove
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantDefaultsArgs {
    /// Tenant name
    name: String,

    /// Drop all overrides before applying the given flags
    #[arg(long)]
    clear: bool,

    #[command(flatten)]
    cleanup: CleanupOverrideArgs,
}

pub async fn add(args: TenantAddArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let auth_type = if args.client_credentials || args.client_secret.is_some() {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    };

    let cleanup = args.cleanup.into_overrides();
    cleanup.validate()?;

    config_manager.add_tenant(TenantConfig {
        name: args.name.clone(),
        tenant_id: args.tenant_id,
        client_id: args.client_id,
        client_secret: args.client_secret,
        auth_type: auth_type.clone(),
        description: args.description,
        cleanup,
    })?;

    println!("{} Tenant '{}' added", "✓".green(), args.name);

    // The app registration needs these before any cleanup run can succeed
    let grant = match auth_type {
        AuthType::DeviceCode => "delegated",
        AuthType::ClientCredentials => "application",
    };
    println!(
        "\n{} Grant the app registration these {} permissions:",
        "→".cyan(),
        grant
    );
    for scope in REQUIRED_SCOPES {
        println!("  • {}", scope);
    }
    println!(
        "\n{} Run {} to authenticate",
        "→".cyan(),
        format!("devicesweep login {}", args.name).bold()
    );

    Ok(())
}

pub async fn list(args: TenantListArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let tenants = config_manager.load_tenants()?;
    let config = config_manager.load_config()?;

    if tenants.is_empty() {
        println!("{} No tenants configured", "!".yellow());
        println!(
            "\n{} Run {} to add a tenant",
            "→".cyan(),
            "devicesweep tenant add".bold()
        );
        return Ok(());
    }

    println!("\n{}", "Configured Tenants:".bold());
    println!("{}", "─".repeat(60));

    for tenant in &tenants {
        let marker = if config.current_tenant.as_ref() == Some(&tenant.name) {
            "●".green()
        } else {
            "○".dimmed()
        };

        let overridden = if tenant.cleanup.is_empty() {
            String::new()
        } else {
            format!(" {}", "(custom cleanup)".dimmed())
        };
        println!("\n{} {}{}", marker, tenant.name.bold(), overridden);

        if args.verbose {
            println!("  Tenant ID:    {}", tenant.tenant_id);
            println!("  Client ID:    {}", tenant.client_id);
            println!("  Auth Type:    {:?}", tenant.auth_type);

            if let Some(desc) = &tenant.description {
                println!("  Description:  {}", desc);
            }

            match config_manager.load_token(&tenant.name) {
                Ok(token) => println!(
                    "  Status:       {} (expires: {})",
                    "Authenticated".green(),
                    token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                Err(_) => println!("  Status:       {}", "Not authenticated".yellow()),
            }

            let effective = config.cleanup.with_overrides(&tenant.cleanup);
            println!("  Cleanup:      {}", describe_cleanup(&effective));
        }
    }

    println!("\n{}", "─".repeat(60));
    println!("{} {} tenant(s) total", "→".cyan(), tenants.len());

    if let Some(current) = &config.current_tenant {
        println!("{} Active: {}", "→".cyan(), current.bold());
    }

    Ok(())
}

pub async fn switch(args: TenantSwitchArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    config_manager.set_active_tenant(&args.name)?;

    println!("{} Switched to tenant '{}'", "✓".green(), args.name);

    Ok(())
}

pub async fn remove(args: TenantRemoveArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    config_manager.remove_tenant(&args.name)?;

    println!("{} Tenant '{}' removed", "✓".green(), args.name);

    Ok(())
}

pub async fn defaults(args: TenantDefaultsArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let tenant = config_manager.get_tenant(&args.name)?;

    let base = if args.clear {
        CleanupOverrides::default()
    } else {
        tenant.cleanup
    };
    let overrides = args.cleanup.merge_into(base);
    config_manager.set_tenant_cleanup(&args.name, overrides.clone())?;

    println!(
        "{} Cleanup settings for '{}': {}",
        "✓".green(),
        args.name,
        describe_cleanup(&config.cleanup.with_overrides(&overrides))
    );

    Ok(())
}

fn describe_cleanup(settings: &CleanupDefaults) -> String {
    let mut parts = vec![
        format!("{} days", settings.stale_days),
        format!("keep {}", settings.duplicate_threshold),
        format!("max {}", settings.max_count),
        settings.action.to_string(),
    ];
    if settings.include_directory {
        parts.push("+directory".into());
    }
    if let Some(path) = &settings.exclusions_file {
        parts.push(format!("exclusions {}", path.display()));
    }
    parts.join(", ")
}
