//! Intune managed device and Entra ID device operations
//!
//! Fetches device snapshots for the classifier and performs the retire and
//! delete calls for planned actions.

use crate::error::Result;
use crate::graph::GraphClient;
use crate::lifecycle::{DeviceRecord, DirectoryDeviceRecord};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;

const MANAGED_DEVICE_SELECT: &str = "id,azureADDeviceId,deviceName,userPrincipalName,\
serialNumber,lastSyncDateTime,managementAgent,operatingSystem,enrollmentState";

const DIRECTORY_DEVICE_SELECT: &str = "id,deviceId,displayName,operatingSystem,\
approximateLastSignInDateTime,registrationDateTime,createdDateTime";

/// Intune reports devices without an Entra registration with this id.
const EMPTY_GUID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GraphManagedDevice {
    pub id: String,
    #[serde(default, rename = "azureADDeviceId")]
    pub azure_ad_device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub last_sync_date_time: Option<String>,
    #[serde(default)]
    pub management_agent: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub enrollment_state: Option<String>,
}

impl From<GraphManagedDevice> for DeviceRecord {
    fn from(device: GraphManagedDevice) -> Self {
        DeviceRecord {
            id: device.id,
            directory_id: non_empty(device.azure_ad_device_id).filter(|id| id != EMPTY_GUID),
            display_name: device.device_name.unwrap_or_default(),
            user_principal_name: non_empty(device.user_principal_name),
            serial_number: non_empty(device.serial_number),
            last_sync_time: device
                .last_sync_date_time
                .as_deref()
                .and_then(parse_graph_timestamp),
            enrollment_state: device.enrollment_state.unwrap_or_default(),
            management_agent: device.management_agent.unwrap_or_default(),
            operating_system: device.operating_system.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GraphDirectoryDevice {
    pub id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub approximate_last_sign_in_date_time: Option<String>,
    #[serde(default)]
    pub registration_date_time: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<String>,
}

impl From<GraphDirectoryDevice> for DirectoryDeviceRecord {
    fn from(device: GraphDirectoryDevice) -> Self {
        DirectoryDeviceRecord {
            // Managed devices reference the directory `deviceId`, not the object id.
            id: non_empty(device.device_id).unwrap_or_else(|| device.id.clone()),
            object_id: Some(device.id),
            display_name: device.display_name.unwrap_or_default(),
            serial_number: None,
            operating_system: device.operating_system.unwrap_or_default(),
            approximate_last_sign_in: device
                .approximate_last_sign_in_date_time
                .as_deref()
                .and_then(parse_graph_timestamp),
            registration_time: device
                .registration_date_time
                .as_deref()
                .and_then(parse_graph_timestamp),
            created_time: device
                .created_date_time
                .as_deref()
                .and_then(parse_graph_timestamp),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a Graph timestamp. Unparseable values and the `0001-01-01`
/// placeholder Intune uses for "never" come back as `None`.
pub fn parse_graph_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value.trim()).ok()?;
    let parsed = parsed.with_timezone(&Utc);
    if parsed.year() <= 1 {
        return None;
    }
    Some(parsed)
}

pub async fn list_managed_devices(client: &GraphClient) -> Result<Vec<DeviceRecord>> {
    let devices: Vec<GraphManagedDevice> = client
        .get_all_pages(&format!(
            "deviceManagement/managedDevices?$select={}",
            MANAGED_DEVICE_SELECT
        ))
        .await?;

    Ok(devices.into_iter().map(DeviceRecord::from).collect())
}

pub async fn list_directory_devices(client: &GraphClient) -> Result<Vec<DirectoryDeviceRecord>> {
    let devices: Vec<GraphDirectoryDevice> = client
        .get_all_pages(&format!("devices?$select={}", DIRECTORY_DEVICE_SELECT))
        .await?;

    Ok(devices
        .into_iter()
        .map(DirectoryDeviceRecord::from)
        .collect())
}

/// Remove company data and management from a managed device
pub async fn retire_managed_device(client: &GraphClient, device_id: &str) -> Result<()> {
    client
        .post_action(&format!("deviceManagement/managedDevices/{}/retire", device_id))
        .await
}

pub async fn delete_managed_device(client: &GraphClient, device_id: &str) -> Result<()> {
    client
        .delete(&format!("deviceManagement/managedDevices/{}", device_id))
        .await
}

/// Delete an Entra ID device by its directory object id
pub async fn delete_directory_device(client: &GraphClient, object_id: &str) -> Result<()> {
    client.delete(&format!("devices/{}", object_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_graph_timestamp() {
        assert!(parse_graph_timestamp("2025-03-01T10:15:00Z").is_some());
        assert!(parse_graph_timestamp("2025-03-01T10:15:00.1234567Z").is_some());
        assert_eq!(parse_graph_timestamp("0001-01-01T00:00:00Z"), None);
        assert_eq!(parse_graph_timestamp("not a date"), None);
        assert_eq!(parse_graph_timestamp(""), None);
    }

    #[test]
    fn test_managed_device_mapping() {
        let raw: GraphManagedDevice = serde_json::from_value(json!({
            "id": "m-1",
            "azureADDeviceId": "00000000-0000-0000-0000-000000000000",
            "deviceName": "LAPTOP-07",
            "userPrincipalName": "",
            "serialNumber": "SN7",
            "lastSyncDateTime": "0001-01-01T00:00:00Z",
            "managementAgent": "mdm",
            "operatingSystem": "Windows",
            "enrollmentState": "notContacted",
            "deviceRegistrationState": "registered"
        }))
        .unwrap();

        let record = DeviceRecord::from(raw);

        assert_eq!(record.id, "m-1");
        assert_eq!(record.directory_id, None);
        assert_eq!(record.user_principal_name, None);
        assert_eq!(record.serial_number.as_deref(), Some("SN7"));
        assert_eq!(record.last_sync_time, None);
        assert_eq!(record.enrollment_state, "notContacted");
    }

    #[test]
    fn test_directory_device_mapping() {
        let raw: GraphDirectoryDevice = serde_json::from_value(json!({
            "id": "obj-1",
            "deviceId": "dev-1",
            "displayName": "OLD-PC",
            "operatingSystem": "Windows",
            "approximateLastSignInDateTime": null,
            "registrationDateTime": "2023-01-05T00:00:00Z"
        }))
        .unwrap();

        let record = DirectoryDeviceRecord::from(raw);

        assert_eq!(record.id, "dev-1");
        assert_eq!(record.object_id.as_deref(), Some("obj-1"));
        assert_eq!(
            record.last_activity_time(),
            parse_graph_timestamp("2023-01-05T00:00:00Z")
        );
    }
}
