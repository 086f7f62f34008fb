use crate::error::{Result, SweepError};
use crate::lifecycle::RequestedAction;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub cleanup: CleanupDefaults,
}

/// Defaults for `cleanup run`, overridable per invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanupDefaults {
    pub stale_days: i64,
    pub duplicate_threshold: i64,
    pub max_count: i64,
    pub action: RequestedAction,
    pub include_directory: bool,
    pub output_dir: Option<PathBuf>,
    pub exclusions_file: Option<PathBuf>,
}

impl Default for CleanupDefaults {
    fn default() -> Self {
        Self {
            stale_days: 90,
            duplicate_threshold: 1,
            max_count: 50,
            action: RequestedAction::Export,
            include_directory: false,
            output_dir: None,
            exclusions_file: None,
        }
    }
}

impl CleanupDefaults {
    /// These defaults with a tenant's overrides applied on top
    pub fn with_overrides(&self, overrides: &CleanupOverrides) -> Self {
        Self {
            stale_days: overrides.stale_days.unwrap_or(self.stale_days),
            duplicate_threshold: overrides
                .duplicate_threshold
                .unwrap_or(self.duplicate_threshold),
            max_count: overrides.max_count.unwrap_or(self.max_count),
            action: overrides.action.unwrap_or(self.action),
            include_directory: overrides.include_directory.unwrap_or(self.include_directory),
            output_dir: self.output_dir.clone(),
            exclusions_file: overrides
                .exclusions_file
                .clone()
                .or_else(|| self.exclusions_file.clone()),
        }
    }
}

/// Per-tenant `[tenants.cleanup]` values that replace the global defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanupOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RequestedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_directory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusions_file: Option<PathBuf>,
}

impl CleanupOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Reject values the classifier and planner would refuse at run time
    pub fn validate(&self) -> Result<()> {
        if let Some(days) = self.stale_days.filter(|d| *d < 0) {
            return Err(SweepError::InvalidArgument(format!(
                "stale_days must be >= 0, got {}",
                days
            )));
        }
        if let Some(threshold) = self.duplicate_threshold.filter(|t| *t < 1) {
            return Err(SweepError::InvalidArgument(format!(
                "duplicate_threshold must be >= 1, got {}",
                threshold
            )));
        }
        if let Some(max) = self.max_count.filter(|m| *m < 0) {
            return Err(SweepError::InvalidArgument(format!(
                "max_count must be >= 0, got {}",
                max
            )));
        }
        Ok(())
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "CleanupOverrides::is_empty")]
    pub cleanup: CleanupOverrides,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

/// Configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "devicesweep", "devicesweep").ok_or_else(|| {
            SweepError::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir())
    }

    /// Use an explicit config directory, creating it if needed
    pub fn with_dir(config_dir: &Path) -> Result<Self> {
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
        })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn token_cache_file(&self, tenant_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.token", tenant_name))
    }

    /// Default location for reports when neither flag nor config sets one
    pub fn reports_dir(&self) -> PathBuf {
        self.config_dir.join("reports")
    }

    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| SweepError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants })
            .map_err(|e| SweepError::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant by name
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SweepError::TenantNotFound(name.to_string()))
    }

    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        match self.load_config()?.current_tenant {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Resolve `--tenant` if given, otherwise the active tenant
    pub fn resolve_tenant(&self, name: Option<&str>) -> Result<TenantConfig> {
        match name {
            Some(name) => self.get_tenant(name),
            None => self.get_active_tenant()?.ok_or_else(|| {
                SweepError::ConfigError(
                    "No active tenant. Run 'devicesweep login <name>' or pass --tenant.".into(),
                )
            }),
        }
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant_name.to_string());
        self.save_config(&config)
    }

    /// Replace a tenant's cleanup overrides
    pub fn set_tenant_cleanup(&self, tenant_name: &str, overrides: CleanupOverrides) -> Result<()> {
        overrides.validate()?;

        let mut tenant = self.get_tenant(tenant_name)?;
        tenant.cleanup = overrides;
        self.add_tenant(tenant)
    }

    /// Remove a tenant, its cached token, and clear it if active
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| t.name != tenant_name);

        if tenants.len() == original_len {
            return Err(SweepError::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        let _ = self.delete_token(tenant_name);

        let mut config = self.load_config()?;
        if config.current_tenant.as_deref() == Some(tenant_name) {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name), contents)?;
        Ok(())
    }

    pub fn load_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name);

        if !token_path.exists() {
            return Err(SweepError::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        let token: TokenCache = serde_json::from_str(&contents)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(SweepError::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    pub fn delete_token(&self, tenant_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(tenant_name);

        if token_path.exists() {
            fs::remove_file(token_path)?;
        }

        Ok(())
    }

    /// Load a tenant from `<name>.env` in the config directory
    ///
    /// ```text
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=optional-secret
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let env_path = self.config_dir.join(format!("{}.env", name.to_lowercase()));

        if !env_path.exists() {
            return Ok(None);
        }

        let vars = parse_env_file(&fs::read_to_string(&env_path)?);

        let (Some(tenant_id), Some(client_id)) = (vars.get("TENANT_ID"), vars.get("CLIENT_ID"))
        else {
            return Ok(None);
        };
        let client_secret = vars.get("CLIENT_SECRET").cloned();

        Ok(Some(TenantConfig {
            name: name.to_string(),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            auth_type: if client_secret.is_some() {
                AuthType::ClientCredentials
            } else {
                AuthType::DeviceCode
            },
            client_secret,
            description: vars.get("DESCRIPTION").cloned(),
            cleanup: CleanupOverrides::default(),
        }))
    }

    /// Look up tenants.toml first, then import from `<name>.env`
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        match self.load_env_file(name)? {
            Some(tenant) => {
                self.add_tenant(tenant.clone())?;
                Ok(tenant)
            }
            None => Err(SweepError::TenantNotFound(name.to_string())),
        }
    }
}

/// KEY=VALUE lines; `#` comments; keys upper-cased; surrounding quotes removed
fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                &value[1..value.len() - 1]
            } else {
                value
            };
            vars.insert(key.trim().to_uppercase(), value.to_string());
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        (dir, manager)
    }

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "tid".into(),
            client_id: "cid".into(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
            cleanup: CleanupOverrides::default(),
        }
    }

    #[test]
    fn test_defaults_when_no_config() {
        let (_dir, manager) = manager();
        let config = manager.load_config().unwrap();
        assert_eq!(config.cleanup, CleanupDefaults::default());
        assert_eq!(config.cleanup.stale_days, 90);
    }

    #[test]
    fn test_partial_cleanup_section() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_file(),
            "[cleanup]\nstale_days = 30\naction = \"retire\"\n",
        )
        .unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.cleanup.stale_days, 30);
        assert_eq!(config.cleanup.action, RequestedAction::Retire);
        assert_eq!(config.cleanup.max_count, 50);
    }

    #[test]
    fn test_tenant_lifecycle() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("contoso")).unwrap();
        manager.add_tenant(tenant("fabrikam")).unwrap();
        manager.set_active_tenant("contoso").unwrap();

        assert_eq!(manager.get_active_tenant().unwrap().unwrap().name, "contoso");
        assert_eq!(manager.resolve_tenant(Some("fabrikam")).unwrap().name, "fabrikam");

        manager.remove_tenant("contoso").unwrap();
        assert!(manager.get_active_tenant().unwrap().is_none());
        assert!(matches!(
            manager.remove_tenant("contoso"),
            Err(SweepError::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (_dir, manager) = manager();
        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            tenant_id: "tid".into(),
        };
        manager.save_token("contoso", &token).unwrap();

        assert!(matches!(
            manager.load_token("contoso"),
            Err(SweepError::AuthError(_))
        ));
        assert!(matches!(
            manager.load_token("missing"),
            Err(SweepError::TokenNotFound)
        ));
    }

    #[test]
    fn test_env_file_import() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_dir().join("contoso.env"),
            "# Contoso\nTENANT_ID=\"tid-1\"\nCLIENT_ID=cid-1\nCLIENT_SECRET='s3cret'\n",
        )
        .unwrap();

        let tenant = manager.get_tenant_or_env("contoso").unwrap();
        assert_eq!(tenant.tenant_id, "tid-1");
        assert_eq!(tenant.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);

        // Imported into tenants.toml
        assert_eq!(manager.get_tenant("contoso").unwrap().client_id, "cid-1");
    }

    #[test]
    fn test_tenant_cleanup_overrides_persist_and_merge() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("contoso")).unwrap();
        manager
            .set_tenant_cleanup(
                "contoso",
                CleanupOverrides {
                    stale_days: Some(30),
                    action: Some(RequestedAction::Retire),
                    ..Default::default()
                },
            )
            .unwrap();

        let stored = manager.get_tenant("contoso").unwrap();
        let effective = CleanupDefaults::default().with_overrides(&stored.cleanup);
        assert_eq!(effective.stale_days, 30);
        assert_eq!(effective.action, RequestedAction::Retire);
        assert_eq!(effective.max_count, 50);

        let contents = fs::read_to_string(manager.config_dir().join("tenants.toml")).unwrap();
        assert!(contents.contains("stale_days = 30"));
    }

    #[test]
    fn test_invalid_tenant_cleanup_overrides_are_rejected() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("contoso")).unwrap();

        let result = manager.set_tenant_cleanup(
            "contoso",
            CleanupOverrides {
                duplicate_threshold: Some(0),
                ..Default::default()
            },
        );

        assert!(matches!(result, Err(SweepError::InvalidArgument(_))));
        assert!(manager.get_tenant("contoso").unwrap().cleanup.is_empty());
    }
}
