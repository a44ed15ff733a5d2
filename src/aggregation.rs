// Streaming group-by over flow records: per-key running min/max/sum,
// emitted once the input is exhausted. Memory grows with the number of
// distinct keys, not the number of records.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::models::FlowRecord;

/// Record attributes usable as aggregation keys. Any `FlowRecord` field
/// can serve as a key, not just the default 5-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    SrcIp,
    DestIp,
    SrcPort,
    DestPort,
    Protocol,
    StartTime,
    EndTime,
    BytesSent,
    PacketsSent,
    RttMsec,
    Reporter,
    SrcInstance,
    DestInstance,
    SrcVpc,
    DestVpc,
    SrcLocation,
    DestLocation,
    ResourceLabels,
}

/// Default grouping: the 5-tuple.
pub const DEFAULT_KEY_FIELDS: [KeyField; 5] = [
    KeyField::SrcIp,
    KeyField::DestIp,
    KeyField::SrcPort,
    KeyField::DestPort,
    KeyField::Protocol,
];

impl KeyField {
    pub fn name(&self) -> &'static str {
        match self {
            KeyField::SrcIp => "src_ip",
            KeyField::DestIp => "dest_ip",
            KeyField::SrcPort => "src_port",
            KeyField::DestPort => "dest_port",
            KeyField::Protocol => "protocol",
            KeyField::StartTime => "start_time",
            KeyField::EndTime => "end_time",
            KeyField::BytesSent => "bytes_sent",
            KeyField::PacketsSent => "packets_sent",
            KeyField::RttMsec => "rtt_msec",
            KeyField::Reporter => "reporter",
            KeyField::SrcInstance => "src_instance",
            KeyField::DestInstance => "dest_instance",
            KeyField::SrcVpc => "src_vpc",
            KeyField::DestVpc => "dest_vpc",
            KeyField::SrcLocation => "src_location",
            KeyField::DestLocation => "dest_location",
            KeyField::ResourceLabels => "resource_labels",
        }
    }

    fn read(&self, record: &FlowRecord) -> KeyValue {
        fn opt<T: ToString>(value: Option<&T>) -> KeyValue {
            KeyValue::Opt(value.map(T::to_string))
        }
        match self {
            KeyField::SrcIp => KeyValue::Ip(record.src_ip),
            KeyField::DestIp => KeyValue::Ip(record.dest_ip),
            KeyField::SrcPort => KeyValue::Num(record.src_port as u64),
            KeyField::DestPort => KeyValue::Num(record.dest_port as u64),
            KeyField::Protocol => KeyValue::Num(record.protocol as u64),
            KeyField::StartTime => KeyValue::Time(record.start_time),
            KeyField::EndTime => KeyValue::Time(record.end_time),
            KeyField::BytesSent => KeyValue::Num(record.bytes_sent),
            KeyField::PacketsSent => KeyValue::Num(record.packets_sent),
            KeyField::RttMsec => KeyValue::OptNum(record.rtt_msec),
            KeyField::Reporter => KeyValue::Text(record.reporter.clone()),
            KeyField::SrcInstance => opt(record.src_instance.as_ref()),
            KeyField::DestInstance => opt(record.dest_instance.as_ref()),
            KeyField::SrcVpc => opt(record.src_vpc.as_ref()),
            KeyField::DestVpc => opt(record.dest_vpc.as_ref()),
            KeyField::SrcLocation => opt(record.src_location.as_ref()),
            KeyField::DestLocation => opt(record.dest_location.as_ref()),
            KeyField::ResourceLabels => opt(record.resource_labels.as_ref()),
        }
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "src_ip" => Ok(KeyField::SrcIp),
            "dest_ip" => Ok(KeyField::DestIp),
            "src_port" => Ok(KeyField::SrcPort),
            "dest_port" => Ok(KeyField::DestPort),
            "protocol" => Ok(KeyField::Protocol),
            "start_time" => Ok(KeyField::StartTime),
            "end_time" => Ok(KeyField::EndTime),
            "bytes_sent" => Ok(KeyField::BytesSent),
            "packets_sent" => Ok(KeyField::PacketsSent),
            "rtt_msec" => Ok(KeyField::RttMsec),
            "reporter" => Ok(KeyField::Reporter),
            "src_instance" => Ok(KeyField::SrcInstance),
            "dest_instance" => Ok(KeyField::DestInstance),
            "src_vpc" => Ok(KeyField::SrcVpc),
            "dest_vpc" => Ok(KeyField::DestVpc),
            "src_location" => Ok(KeyField::SrcLocation),
            "dest_location" => Ok(KeyField::DestLocation),
            "resource_labels" => Ok(KeyField::ResourceLabels),
            other => Err(anyhow::anyhow!("unknown key field: {other}")),
        }
    }
}

/// One group key value; hash and equality are stable across runs of the
/// same input. Absent optional fields group together and render as `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Ip(IpAddr),
    Num(u64),
    Text(String),
    Time(NaiveDateTime),
    OptNum(Option<u64>),
    Opt(Option<String>),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Ip(ip) => write!(f, "{ip}"),
            KeyValue::Num(n) => write!(f, "{n}"),
            KeyValue::Text(s) => f.write_str(s),
            KeyValue::Time(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S")),
            KeyValue::OptNum(Some(n)) => write!(f, "{n}"),
            KeyValue::Opt(Some(s)) => f.write_str(s),
            KeyValue::OptNum(None) | KeyValue::Opt(None) => f.write_str("-"),
        }
    }
}

/// Running statistics for one key. Times are seeded at the representable
/// extremes so the min/max of a single record is that record.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FlowStats {
    packets_sent: u64,
    bytes_sent: u64,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
}

impl FlowStats {
    fn new() -> Self {
        Self {
            packets_sent: 0,
            bytes_sent: 0,
            start_time: NaiveDateTime::MAX,
            end_time: NaiveDateTime::MIN,
        }
    }

    fn update(&mut self, record: &FlowRecord) {
        if record.start_time < self.start_time {
            self.start_time = record.start_time;
        }
        if record.end_time > self.end_time {
            self.end_time = record.end_time;
        }
        self.packets_sent += record.packets_sent;
        self.bytes_sent += record.bytes_sent;
    }
}

/// Aggregated summary row: key values in key-field order plus totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    pub key: Vec<KeyValue>,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Streaming group-by table. Groups are created lazily on the first record
/// with a given key and kept until the input ends; there is no windowing
/// or early emission.
pub struct FlowAggregator {
    key_fields: Vec<KeyField>,
    table: HashMap<Vec<KeyValue>, FlowStats>,
}

impl FlowAggregator {
    pub fn new(key_fields: impl Into<Vec<KeyField>>) -> Self {
        Self {
            key_fields: key_fields.into(),
            table: HashMap::new(),
        }
    }

    pub fn with_default_key() -> Self {
        Self::new(DEFAULT_KEY_FIELDS)
    }

    pub fn key_fields(&self) -> &[KeyField] {
        &self.key_fields
    }

    /// Folds one record into its group.
    pub fn fold(&mut self, record: &FlowRecord) {
        let key: Vec<KeyValue> = self.key_fields.iter().map(|f| f.read(record)).collect();
        self.table
            .entry(key)
            .or_insert_with(FlowStats::new)
            .update(record);
    }

    /// Number of distinct keys observed so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Emission order follows the hash table, not arrival order; sort
    /// explicitly if a deterministic order is needed.
    pub fn into_records(self) -> impl Iterator<Item = StatRecord> {
        self.table.into_iter().map(|(key, stats)| StatRecord {
            key,
            packets_sent: stats.packets_sent,
            bytes_sent: stats.bytes_sent,
            start_time: stats.start_time,
            end_time: stats.end_time,
        })
    }
}

/// Folds an in-memory record sequence in one pass. The CLI drives the
/// streaming variant via `FlowAggregator` directly.
pub fn aggregated_records<'a>(
    records: impl IntoIterator<Item = &'a FlowRecord>,
    key_fields: &[KeyField],
) -> Vec<StatRecord> {
    let mut aggregator = FlowAggregator::new(key_fields.to_vec());
    for record in records {
        aggregator.fold(record);
    }
    aggregator.into_records().collect()
}
