// Domain models: typed flow records and the raw log-entry wire shapes.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fully-qualified VPC flow log name for a project.
pub fn base_log_name(project_id: &str) -> String {
    format!("projects/{project_id}/logs/compute.googleapis.com%2Fvpc_flows")
}

/// VM endpoint descriptor attached to a flow payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceDetails {
    pub project_id: String,
    pub vm_name: String,
    pub region: String,
    pub zone: String,
}

impl fmt::Display for InstanceDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project_id, self.vm_name, self.region, self.zone
        )
    }
}

/// VPC endpoint descriptor attached to a flow payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VpcDetails {
    pub project_id: String,
    pub vpc_name: String,
    pub subnetwork_name: String,
}

impl fmt::Display for VpcDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.project_id, self.vpc_name, self.subnetwork_name
        )
    }
}

/// Geographic endpoint descriptor attached to a flow payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeographicDetails {
    pub continent: String,
    pub country: String,
    pub region: String,
    pub city: String,
}

impl fmt::Display for GeographicDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.continent, self.country, self.region, self.city
        )
    }
}

/// Labels from the entry's resource metadata (not the payload body).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLabels {
    pub project_id: String,
    pub location: String,
    pub subnetwork_id: String,
    pub subnetwork_name: String,
}

impl fmt::Display for ResourceLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project_id, self.location, self.subnetwork_id, self.subnetwork_name
        )
    }
}

/// One observed direction of a network flow. Immutable after construction;
/// nested descriptors are either fully populated or absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FlowRecord {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dest_ip: IpAddr,
    pub dest_port: u16,
    pub protocol: u16,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub rtt_msec: Option<u64>,
    pub reporter: String,
    pub src_instance: Option<InstanceDetails>,
    pub dest_instance: Option<InstanceDetails>,
    pub src_vpc: Option<VpcDetails>,
    pub dest_vpc: Option<VpcDetails>,
    pub src_location: Option<GeographicDetails>,
    pub dest_location: Option<GeographicDetails>,
    pub resource_labels: Option<ResourceLabels>,
}

impl fmt::Display for FlowRecord {
    /// Compact diagnostic form: `src:port/proto->dest:port/proto`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}->{}:{}/{}",
            self.src_ip, self.src_port, self.protocol, self.dest_ip, self.dest_port, self.protocol
        )
    }
}

/// Resource metadata attached to a raw log entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntryResource {
    #[serde(rename = "type")]
    pub type_: String,
    pub labels: HashMap<String, String>,
}

/// One raw log item as returned by the log store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawEntry {
    pub log_name: String,
    #[serde(rename = "jsonPayload")]
    pub payload: Option<Map<String, Value>>,
    pub resource: Option<EntryResource>,
}

impl RawEntry {
    /// Entry carrying only a payload, no resource metadata.
    pub fn from_payload(payload: Map<String, Value>) -> Self {
        Self {
            log_name: String::new(),
            payload: Some(payload),
            resource: None,
        }
    }

    /// Rough size of the entry for byte accounting: serialized payload
    /// length, or the log-name length for payload-less entries.
    pub fn size_estimate(&self) -> u64 {
        match &self.payload {
            Some(payload) => serde_json::to_vec(payload)
                .map(|bytes| bytes.len() as u64)
                .unwrap_or(0),
            None => self.log_name.len() as u64,
        }
    }
}

/// One page of raw entries plus the opaque cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct EntryPage {
    pub entries: Vec<RawEntry>,
    pub next_page_token: Option<String>,
}
