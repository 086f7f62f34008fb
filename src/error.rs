use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Token not found. Please run 'devicesweep login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),
}

pub type Result<T> = std::result::Result<T, SweepError>;

pub use SweepError as Error;

/// Parse a Graph API error body and attach a hint for the common failures
/// seen when reading or retiring managed devices.
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: Your authentication token may have expired. Run 'devicesweep login' again."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: The app registration needs DeviceManagementManagedDevices.ReadWrite.All \
                     and Device.ReadWrite.All with admin consent."
                }
                "NotFound" | "Request_ResourceNotFound" => {
                    "\nHint: The device no longer exists. It may already have been removed."
                }
                "TooManyRequests" => "\nHint: API rate limit exceeded. Lower --max-count or retry later.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}
