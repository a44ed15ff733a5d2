// Shared test helpers: sample flow-log payloads and scripted capability
// fakes. The payloads mirror real VPC flow log entries, counters as
// strings and ports as floats included.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use flowlogs_reader::errors::ListError;
use flowlogs_reader::models::{EntryPage, FlowRecord, RawEntry};
use flowlogs_reader::normalize::normalize;
use flowlogs_reader::reader::ProjectLister;
use flowlogs_reader::source::EntryLister;

pub fn sample_payloads() -> Vec<Value> {
    vec![
        json!({
            "bytes_sent": "491",
            "connection": {
                "dest_ip": "192.0.2.2",
                "dest_port": 3389.0,
                "protocol": 6.0,
                "src_ip": "198.51.100.75",
                "src_port": 49444.0,
            },
            "dest_instance": {
                "project_id": "yoyodyne-102010",
                "region": "us-west1",
                "vm_name": "vm-instance-01",
                "zone": "us-west1-a",
            },
            "dest_vpc": {
                "project_id": "yoyodyne-102010",
                "subnetwork_name": "yoyo-vpc-1",
                "subnetwork_region": "sunnydale1",
                "vpc_name": "yoyo-vpc-1",
            },
            "end_time": "2018-04-03T13:47:38.401Z",
            "packets_sent": "4",
            "reporter": "DEST",
            "src_location": {
                "city": "Santa Teresa",
                "continent": "America",
                "country": "usa",
                "region": "California",
            },
            "start_time": "2018-04-03T13:47:37.301723960Z",
            "rtt_msec": "61",
        }),
        json!({
            "bytes_sent": "756",
            "connection": {
                "dest_ip": "198.51.100.75",
                "dest_port": 49444.0,
                "protocol": 6.0,
                "src_ip": "192.0.2.2",
                "src_port": 3389.0,
            },
            "dest_location": {
                "city": "Santa Teresa",
                "continent": "America",
                "country": "usa",
                "region": "California",
            },
            "end_time": "2018-04-03T13:47:33.937764566Z",
            "packets_sent": "6",
            "reporter": "SRC",
            "src_instance": {
                "project_id": "yoyodyne-102010",
                "region": "us-west1",
                "vm_name": "vm-instance-01",
                "zone": "us-west1-a",
            },
            "src_vpc": {
                "project_id": "yoyodyne-102010",
                "subnetwork_name": "yoyo-vpc-1",
                "subnetwork_region": "sunnydale2",
                "vpc_name": "yoyo-vpc-1",
            },
            "start_time": "2018-04-03T13:47:32.805417512Z",
        }),
        json!({
            "bytes_sent": "1020",
            "connection": {
                "dest_ip": "192.0.2.3",
                "dest_port": 65535.0,
                "protocol": 6.0,
                "src_ip": "192.0.2.2",
                "src_port": 3389.0,
            },
            "end_time": "2018-04-03T13:48:33.937764566Z",
            "packets_sent": "20",
            "reporter": "SRC",
            "src_instance": {
                "project_id": "yoyodyne-102010",
                "region": "us-west1",
                "vm_name": "vm-instance-01",
                "zone": "us-west1-a",
            },
            "src_vpc": {
                "project_id": "yoyodyne-102010",
                "subnetwork_name": "yoyo-vpc-1",
                "vpc_name": "yoyo-vpc-1",
            },
            "dest_instance": {
                "project_id": "yoyodyne-102010",
                "region": "us-west1",
                "vm_name": "vm-instance-02",
                "zone": "us-west1-a",
            },
            "dest_vpc": {
                "project_id": "yoyodyne-102010",
                "subnetwork_name": "yoyo-vpc-1",
                "vpc_name": "yoyo-vpc-1",
            },
            "start_time": "2018-04-03T13:47:31.805417512Z",
        }),
        json!({
            "bytes_sent": "1020",
            "connection": {
                "dest_ip": "192.0.2.3",
                "protocol": 1.0,
                "src_ip": "192.0.2.2",
            },
            "end_time": "2018-04-03T13:48:33.937764566Z",
            "packets_sent": "20",
            "reporter": "SRC",
            "src_instance": {
                "project_id": "yoyodyne-102010",
                "region": "us-west1",
                "vm_name": "vm-instance-01",
                "zone": "us-west1-a",
            },
            "src_vpc": {
                "project_id": "yoyodyne-102010",
                "subnetwork_name": "yoyo-vpc-1",
                "vpc_name": "yoyo-vpc-1",
            },
            "dest_instance": {
                "project_id": "yoyodyne-102010",
                "region": "us-west1",
                "vm_name": "vm-instance-02",
                "zone": "us-west1-a",
            },
            "dest_vpc": {
                "project_id": "yoyodyne-102010",
                "subnetwork_name": "yoyo-vpc-1",
                "vpc_name": "yoyo-vpc-1",
            },
        }),
    ]
}

pub fn sample_entry(index: usize) -> RawEntry {
    RawEntry::from_payload(
        sample_payloads()[index]
            .as_object()
            .cloned()
            .expect("object payload"),
    )
}

pub fn sample_entries() -> Vec<RawEntry> {
    (0..sample_payloads().len()).map(sample_entry).collect()
}

pub fn sample_record(index: usize) -> FlowRecord {
    normalize(&sample_entry(index)).expect("sample entry normalizes")
}

pub fn page(entries: Vec<RawEntry>, token: Option<&str>) -> EntryPage {
    EntryPage {
        entries,
        next_page_token: token.map(str::to_owned),
    }
}

/// Replays scripted responses in call order, recording each call's
/// project scope and page token. Out-of-script calls get an empty page.
pub struct ScriptedLister {
    responses: Mutex<VecDeque<Result<EntryPage, ListError>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedLister {
    pub fn new(responses: Vec<Result<EntryPage, ListError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntryLister for ScriptedLister {
    async fn list_entries(
        &self,
        _filter: &str,
        _page_size: i32,
        project_id: &str,
        page_token: Option<&str>,
    ) -> Result<EntryPage, ListError> {
        self.calls
            .lock()
            .unwrap()
            .push((project_id.to_string(), page_token.map(str::to_owned)));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(EntryPage::default()))
    }
}

/// Discovery capability returning a fixed project list.
pub struct StaticProjects(pub Vec<String>);

#[async_trait]
impl ProjectLister for StaticProjects {
    async fn list_projects(&self) -> Result<Vec<String>, ListError> {
        Ok(self.0.clone())
    }
}

/// Discovery capability that always fails.
pub struct FailingProjects;

#[async_trait]
impl ProjectLister for FailingProjects {
    async fn list_projects(&self) -> Result<Vec<String>, ListError> {
        Err(ListError::Other(anyhow::anyhow!("discovery unavailable")))
    }
}
