use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{Result, SweepError};
use crate::graph::auth::{GraphAuth, REQUIRED_SCOPES};
use clap::Args;
use colored::Colorize;

/// Truncate to n characters, safe on non-ASCII input
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant name; loads tenants.toml, then <config dir>/<name>.env
    #[arg(index = 1)]
    name: Option<String>,

    /// Tenant ID (Entra ID tenant ID) for quick setup
    #[arg(long)]
    tenant_id: Option<String>,

    /// Client ID (Application ID) for quick setup
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow instead of device code
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name
    #[arg(short, long)]
    tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long)]
    all: bool,
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    let tenant_config = match (&args.tenant_id, &args.client_id) {
        (Some(tenant_id), Some(client_id)) => {
            let name = args.name.clone().unwrap_or_else(|| {
                tenant_id
                    .split('-')
                    .next()
                    .unwrap_or("my-tenant")
                    .to_string()
            });

            let auth_type = if args.client_credentials || args.client_secret.is_some() {
                AuthType::ClientCredentials
            } else {
                AuthType::DeviceCode
            };

            // Re-running quick setup keeps the tenant's cleanup overrides
            let cleanup = config_manager
                .get_tenant(&name)
                .map(|existing| existing.cleanup)
                .unwrap_or_default();

            let tenant = TenantConfig {
                name: name.clone(),
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                client_secret: args.client_secret.clone(),
                auth_type,
                description: args.description.clone(),
                cleanup,
            };
            config_manager.add_tenant(tenant.clone())?;
            println!("{} Tenant '{}' configuration saved", "✓".green(), name);
            tenant
        }
        _ => {
            let name = args.name.as_deref().ok_or_else(|| {
                SweepError::ConfigError(
                    "Usage:\n  \
                    devicesweep login NAME                            # tenants.toml or NAME.env\n  \
                    devicesweep login [NAME] --tenant-id ID --client-id ID  # Quick setup"
                        .into(),
                )
            })?;

            let tenant = config_manager.get_tenant_or_env(name).map_err(|_| {
                SweepError::ConfigError(format!(
                    "Tenant '{}' not found. Create {} with:\n   \
                     TENANT_ID=your-tenant-id\n   \
                     CLIENT_ID=your-client-id\n   \
                     CLIENT_SECRET=your-secret",
                    name,
                    config_manager
                        .config_dir()
                        .join(format!("{}.env", name.to_lowercase()))
                        .display()
                ))
            })?;

            println!("{} Loaded tenant: {}", "✓".green(), name.bold());
            println!("  Tenant ID: {}...", truncate_chars(&tenant.tenant_id, 8));
            println!("  Client ID: {}...", truncate_chars(&tenant.client_id, 8));
            tenant
        }
    };

    match tenant_config.auth_type {
        AuthType::DeviceCode => auth.login_device_code(&tenant_config).await?,
        AuthType::ClientCredentials => auth.login_client_credentials(&tenant_config).await?,
    };

    config_manager.set_active_tenant(&tenant_config.name)?;

    println!(
        "\n{} Active tenant: {}",
        "→".cyan(),
        tenant_config.name.bold()
    );
    println!("{} Required Graph permissions:", "→".cyan());
    for scope in REQUIRED_SCOPES {
        println!("  • {}", scope);
    }

    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    if args.all {
        for tenant in &config_manager.load_tenants()? {
            auth.logout(&tenant.name)?;
        }
        println!("{} Logged out from all tenants", "✓".green());
    } else if let Some(tenant_name) = &args.tenant {
        auth.logout(tenant_name)?;
    } else {
        match config_manager.load_config()?.current_tenant {
            Some(current_tenant) => auth.logout(&current_tenant)?,
            None => println!("{} No active tenant", "!".yellow()),
        }
    }

    Ok(())
}
