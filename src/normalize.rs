// Turn one raw log entry into a typed FlowRecord. Pure, no I/O.
// Required fields fail with MalformedRecord; the optional nested
// descriptors collapse to absent when incomplete, since log producers
// vary in which sub-objects they emit.

use std::net::IpAddr;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::errors::MalformedRecord;
use crate::models::{
    EntryResource, FlowRecord, GeographicDetails, InstanceDetails, RawEntry, ResourceLabels,
    VpcDetails,
};

/// Normalizes a raw entry into a FlowRecord.
pub fn normalize(entry: &RawEntry) -> Result<FlowRecord, MalformedRecord> {
    let payload = entry
        .payload
        .as_ref()
        .ok_or_else(|| MalformedRecord::missing("jsonPayload"))?;

    let connection = payload
        .get("connection")
        .and_then(Value::as_object)
        .ok_or_else(|| MalformedRecord::missing("connection"))?;

    let src_ip = require_ip(connection, "src_ip")?;
    let dest_ip = require_ip(connection, "dest_ip")?;
    let src_port = optional_port(connection, "src_port")?;
    let dest_port = optional_port(connection, "dest_port")?;
    let protocol = require_u16(connection, "protocol")?;

    let end_time = match payload.get("end_time") {
        Some(value) => parse_timestamp("end_time", value)?,
        None => return Err(MalformedRecord::missing("end_time")),
    };
    let start_time = match payload.get("start_time") {
        Some(value) => parse_timestamp("start_time", value)?,
        None => end_time,
    };

    let bytes_sent = require_u64(payload, "bytes_sent")?;
    let packets_sent = require_u64(payload, "packets_sent")?;
    let rtt_msec = match payload.get("rtt_msec") {
        Some(value) => Some(numeric("rtt_msec", value)?),
        None => None,
    };

    let reporter = payload
        .get("reporter")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedRecord::missing("reporter"))?
        .to_string();

    Ok(FlowRecord {
        src_ip,
        src_port,
        dest_ip,
        dest_port,
        protocol,
        start_time,
        end_time,
        bytes_sent,
        packets_sent,
        rtt_msec,
        reporter,
        src_instance: instance_details(payload.get("src_instance")),
        dest_instance: instance_details(payload.get("dest_instance")),
        src_vpc: vpc_details(payload.get("src_vpc")),
        dest_vpc: vpc_details(payload.get("dest_vpc")),
        src_location: geographic_details(payload.get("src_location")),
        dest_location: geographic_details(payload.get("dest_location")),
        resource_labels: resource_labels(entry.resource.as_ref()),
    })
}

/// Counters arrive as JSON numbers (sometimes floats) or decimal strings.
fn numeric(field: &'static str, value: &Value) -> Result<u64, MalformedRecord> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| MalformedRecord::invalid(field, format!("not a whole number: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| MalformedRecord::invalid(field, format!("not a number: {s:?}"))),
        other => Err(MalformedRecord::invalid(
            field,
            format!("expected number or string, got {other}"),
        )),
    }
}

fn require_u64(map: &Map<String, Value>, field: &'static str) -> Result<u64, MalformedRecord> {
    let value = map
        .get(field)
        .ok_or_else(|| MalformedRecord::missing(field))?;
    numeric(field, value)
}

fn require_u16(map: &Map<String, Value>, field: &'static str) -> Result<u16, MalformedRecord> {
    let n = require_u64(map, field)?;
    u16::try_from(n).map_err(|_| MalformedRecord::invalid(field, format!("out of range: {n}")))
}

/// Ports default to 0 when the connection sub-object omits them.
fn optional_port(map: &Map<String, Value>, field: &'static str) -> Result<u16, MalformedRecord> {
    match map.get(field) {
        None => Ok(0),
        Some(value) => {
            let n = numeric(field, value)?;
            u16::try_from(n)
                .map_err(|_| MalformedRecord::invalid(field, format!("port out of range: {n}")))
        }
    }
}

fn require_ip(map: &Map<String, Value>, field: &'static str) -> Result<IpAddr, MalformedRecord> {
    let value = map
        .get(field)
        .ok_or_else(|| MalformedRecord::missing(field))?;
    let s = value
        .as_str()
        .ok_or_else(|| MalformedRecord::invalid(field, format!("expected string, got {value}")))?;
    s.parse()
        .map_err(|_| MalformedRecord::invalid(field, format!("not an IP address: {s:?}")))
}

/// Truncates to second precision: the first 19 characters
/// (YYYY-MM-DDTHH:MM:SS), discarding sub-second digits and any zone
/// suffix, interpreted as UTC.
fn parse_timestamp(
    field: &'static str,
    value: &Value,
) -> Result<NaiveDateTime, MalformedRecord> {
    let s = value
        .as_str()
        .ok_or_else(|| MalformedRecord::invalid(field, format!("expected string, got {value}")))?;
    let head = s
        .get(..19)
        .ok_or_else(|| MalformedRecord::invalid(field, format!("timestamp too short: {s:?}")))?;
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| MalformedRecord::invalid(field, format!("{s:?}: {e}")))
}

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_owned)
}

// Descriptor builders: a missing required sub-field or a non-object value
// yields None, never a partially-filled struct. Unknown sub-fields are
// ignored.

fn instance_details(value: Option<&Value>) -> Option<InstanceDetails> {
    let map = value?.as_object()?;
    Some(InstanceDetails {
        project_id: str_field(map, "project_id")?,
        vm_name: str_field(map, "vm_name")?,
        region: str_field(map, "region")?,
        zone: str_field(map, "zone")?,
    })
}

fn vpc_details(value: Option<&Value>) -> Option<VpcDetails> {
    let map = value?.as_object()?;
    Some(VpcDetails {
        project_id: str_field(map, "project_id")?,
        vpc_name: str_field(map, "vpc_name")?,
        subnetwork_name: str_field(map, "subnetwork_name")?,
    })
}

fn geographic_details(value: Option<&Value>) -> Option<GeographicDetails> {
    let map = value?.as_object()?;
    Some(GeographicDetails {
        continent: str_field(map, "continent")?,
        country: str_field(map, "country")?,
        region: str_field(map, "region")?,
        city: str_field(map, "city")?,
    })
}

fn resource_labels(resource: Option<&EntryResource>) -> Option<ResourceLabels> {
    let labels = &resource?.labels;
    Some(ResourceLabels {
        project_id: labels.get("project_id")?.clone(),
        location: labels.get("location")?.clone(),
        subnetwork_id: labels.get("subnetwork_id")?.clone(),
        subnetwork_name: labels.get("subnetwork_name")?.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::hash::{DefaultHasher, Hash, Hasher};

    fn entry(payload: Value) -> RawEntry {
        RawEntry::from_payload(payload.as_object().cloned().expect("object payload"))
    }

    fn sample_payload() -> Value {
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
        })
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn normalize_sample_entry() {
        let record = normalize(&entry(sample_payload())).unwrap();
        assert_eq!(record.src_ip, "198.51.100.75".parse::<IpAddr>().unwrap());
        assert_eq!(record.src_port, 49444);
        assert_eq!(record.dest_ip, "192.0.2.2".parse::<IpAddr>().unwrap());
        assert_eq!(record.dest_port, 3389);
        assert_eq!(record.protocol, 6);
        assert_eq!(record.start_time, ts("2018-04-03T13:47:37"));
        assert_eq!(record.end_time, ts("2018-04-03T13:47:38"));
        assert_eq!(record.bytes_sent, 491);
        assert_eq!(record.packets_sent, 4);
        assert_eq!(record.rtt_msec, Some(61));
        assert_eq!(record.reporter, "DEST");
    }

    #[test]
    fn normalize_is_deterministic_and_hash_consistent() {
        let a = normalize(&entry(sample_payload())).unwrap();
        let b = normalize(&entry(sample_payload())).unwrap();
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn missing_ports_default_to_zero() {
        let record = normalize(&entry(json!({
            "connection": {"src_ip": "192.0.2.2", "dest_ip": "192.0.2.3", "protocol": 1.0},
            "end_time": "2018-04-03T13:48:33.937764566Z",
            "bytes_sent": "1020",
            "packets_sent": "20",
            "reporter": "SRC",
        })))
        .unwrap();
        assert_eq!(record.src_port, 0);
        assert_eq!(record.dest_port, 0);
    }

    #[test]
    fn missing_start_time_defaults_to_end_time() {
        let record = normalize(&entry(json!({
            "connection": {"src_ip": "192.0.2.2", "dest_ip": "192.0.2.3", "protocol": 1},
            "end_time": "2018-04-03T13:48:33.937764566Z",
            "bytes_sent": 1020,
            "packets_sent": 20,
            "reporter": "SRC",
        })))
        .unwrap();
        assert_eq!(record.start_time, record.end_time);
        assert_eq!(record.rtt_msec, None);
    }

    #[test]
    fn missing_src_ip_is_malformed() {
        let err = normalize(&entry(json!({
            "connection": {"dest_ip": "192.0.2.3", "protocol": 1},
            "end_time": "2018-04-03T13:48:33Z",
            "bytes_sent": 1,
            "packets_sent": 1,
            "reporter": "SRC",
        })))
        .unwrap_err();
        assert_eq!(err.field, "src_ip");
    }

    #[test]
    fn unparsable_ip_is_malformed() {
        let err = normalize(&entry(json!({
            "connection": {"src_ip": "not-an-ip", "dest_ip": "192.0.2.3", "protocol": 1},
            "end_time": "2018-04-03T13:48:33Z",
            "bytes_sent": 1,
            "packets_sent": 1,
            "reporter": "SRC",
        })))
        .unwrap_err();
        assert_eq!(err.field, "src_ip");
    }

    #[test]
    fn missing_payload_is_malformed() {
        let raw = RawEntry {
            log_name: "projects/p/logs/compute.googleapis.com%2Fvpc_flows".to_string(),
            payload: None,
            resource: None,
        };
        let err = normalize(&raw).unwrap_err();
        assert_eq!(err.field, "jsonPayload");
    }

    #[test]
    fn full_descriptors_are_parsed_and_extra_subfields_ignored() {
        let record = normalize(&entry(sample_payload())).unwrap();
        assert_eq!(
            record.dest_instance,
            Some(InstanceDetails {
                project_id: "yoyodyne-102010".to_string(),
                vm_name: "vm-instance-01".to_string(),
                region: "us-west1".to_string(),
                zone: "us-west1-a".to_string(),
            })
        );
        // dest_vpc carries an extra subnetwork_region key; it is dropped.
        assert_eq!(
            record.dest_vpc,
            Some(VpcDetails {
                project_id: "yoyodyne-102010".to_string(),
                vpc_name: "yoyo-vpc-1".to_string(),
                subnetwork_name: "yoyo-vpc-1".to_string(),
            })
        );
        assert_eq!(record.src_instance, None);
        assert_eq!(record.src_vpc, None);
        assert_eq!(record.dest_location, None);
        assert_eq!(
            record.src_location,
            Some(GeographicDetails {
                continent: "America".to_string(),
                country: "usa".to_string(),
                region: "California".to_string(),
                city: "Santa Teresa".to_string(),
            })
        );
    }

    #[test]
    fn partial_descriptor_collapses_to_absent() {
        let mut payload = sample_payload();
        payload["dest_instance"]
            .as_object_mut()
            .unwrap()
            .remove("zone");
        let record = normalize(&entry(payload)).unwrap();
        assert_eq!(record.dest_instance, None);
    }

    #[test]
    fn non_object_descriptor_collapses_to_absent() {
        let mut payload = sample_payload();
        payload["dest_instance"] = json!(42);
        let record = normalize(&entry(payload)).unwrap();
        assert_eq!(record.dest_instance, None);
    }

    #[test]
    fn resource_labels_come_from_entry_metadata() {
        let labels: HashMap<String, String> = [
            ("location", "us-central1-a"),
            ("project_id", "proj1"),
            ("subnetwork_id", "3301803660181826306"),
            ("subnetwork_name", "default"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut raw = entry(sample_payload());
        raw.resource = Some(EntryResource {
            type_: "gce_subnetwork".to_string(),
            labels,
        });
        let record = normalize(&raw).unwrap();
        assert_eq!(
            record.resource_labels,
            Some(ResourceLabels {
                project_id: "proj1".to_string(),
                location: "us-central1-a".to_string(),
                subnetwork_id: "3301803660181826306".to_string(),
                subnetwork_name: "default".to_string(),
            })
        );
    }

    #[test]
    fn incompatible_resource_metadata_is_absent() {
        let mut raw = entry(sample_payload());
        raw.resource = Some(EntryResource {
            type_: "gce_instance".to_string(),
            labels: HashMap::from([("instance_id".to_string(), "12345".to_string())]),
        });
        let record = normalize(&raw).unwrap();
        assert_eq!(record.resource_labels, None);
        assert_eq!(normalize(&entry(sample_payload())).unwrap().resource_labels, None);
    }

    #[test]
    fn display_is_compact_flow_tuple() {
        let record = normalize(&entry(sample_payload())).unwrap();
        assert_eq!(
            record.to_string(),
            "198.51.100.75:49444/6->192.0.2.2:3389/6"
        );
    }
}
