use crate::config::{ConfigManager, TenantConfig, TokenCache};
use crate::error::{Result, SweepError};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret,
    DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields, Scope, TokenResponse, TokenUrl,
};
use std::time::Duration;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Graph application permissions a cleanup run needs
pub const REQUIRED_SCOPES: &[&str] = &[
    "DeviceManagementManagedDevices.Read.All",
    "DeviceManagementManagedDevices.PrivilegedOperations.All",
    "DeviceManagementManagedDevices.ReadWrite.All",
    "Device.ReadWrite.All",
];

pub struct GraphAuth {
    config_manager: ConfigManager,
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    fn endpoints(tenant_id: &str) -> Result<(AuthUrl, TokenUrl)> {
        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| SweepError::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| SweepError::AuthError(format!("Invalid token URL: {}", e)))?;

        Ok((auth_url, token_url))
    }

    fn expiry(expires_in: Option<Duration>) -> chrono::DateTime<chrono::Utc> {
        let lifetime = chrono::Duration::from_std(expires_in.unwrap_or(Duration::from_secs(3600)))
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        chrono::Utc::now() + lifetime
    }

    /// Authenticate using device code flow (interactive)
    pub async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        println!(
            "🔐 Starting device code authentication for tenant '{}'...",
            tenant_config.name
        );

        let tenant_id = &tenant_config.tenant_id;
        let client_id = ClientId::new(tenant_config.client_id.clone());
        let (auth_url, token_url) = Self::endpoints(tenant_id)?;

        let device_auth_url = DeviceAuthorizationUrl::new(format!(
            "{}/{}/oauth2/v2.0/devicecode",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| SweepError::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = BasicClient::new(client_id, None, auth_url, Some(token_url))
            .set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| SweepError::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    SweepError::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        println!("\n📱 Please visit: {}", details.verification_uri().as_str());
        println!("🔑 Enter code: {}\n", details.user_code().secret());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| SweepError::AuthError(format!("Token exchange failed: {}", e)))?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: Self::expiry(token.expires_in()),
            tenant_id: tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        tracing::info!(tenant = %tenant_config.name, "device code login succeeded");

        println!("✅ Authentication successful!");
        println!(
            "💾 Token saved to: {}",
            self.config_manager
                .token_cache_file(&tenant_config.name)
                .display()
        );

        Ok(token_cache)
    }

    /// Authenticate using client credentials flow (non-interactive)
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
    ) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            SweepError::AuthError("Client secret required for client credentials flow".into())
        })?;

        println!(
            "🔐 Authenticating with client credentials for tenant '{}'...",
            tenant_config.name
        );

        let tenant_id = &tenant_config.tenant_id;
        let client_id = ClientId::new(tenant_config.client_id.clone());
        let client_secret = ClientSecret::new(client_secret.clone());
        let (auth_url, token_url) = Self::endpoints(tenant_id)?;

        let client = BasicClient::new(client_id, Some(client_secret), auth_url, Some(token_url));

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                SweepError::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: None,
            expires_at: Self::expiry(token.expires_in()),
            tenant_id: tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        tracing::info!(tenant = %tenant_config.name, "client credentials login succeeded");

        println!("✅ Authentication successful!");

        Ok(token_cache)
    }

    /// Cached access token; an expired token is reported as missing
    pub async fn get_access_token(&self, tenant_name: &str) -> Result<String> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => Ok(token.access_token),
            Err(SweepError::AuthError(_)) => Err(SweepError::TokenNotFound),
            Err(e) => Err(e),
        }
    }

    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)?;
        println!("✅ Logged out from tenant '{}'", tenant_name);
        Ok(())
    }
}
