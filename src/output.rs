// TSV output actions over a record stream.
// Actions write to an injected writer so tests can capture output.

use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::net::IpAddr;

use crate::aggregation::{FlowAggregator, KeyField, StatRecord};
use crate::models::FlowRecord;
use crate::reader::RecordStream;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn print_header(w: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        w,
        "src_ip\tdest_ip\tsrc_port\tdest_port\tprotocol\tstart_time\tend_time\tbytes_sent\tpackets_sent"
    )
}

pub fn print_record(w: &mut impl Write, record: &FlowRecord) -> std::io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.src_ip,
        record.dest_ip,
        record.src_port,
        record.dest_port,
        record.protocol,
        record.start_time.format(TIME_FORMAT),
        record.end_time.format(TIME_FORMAT),
        record.bytes_sent,
        record.packets_sent,
    )
}

/// Print records as TSV, stopping after `stop_after` records when given.
pub async fn action_print(
    records: &mut RecordStream,
    w: &mut impl Write,
    stop_after: Option<u64>,
) -> anyhow::Result<()> {
    print_header(w)?;
    let mut printed: u64 = 0;
    while let Some(result) = records.next_record().await {
        print_record(w, &result?)?;
        printed += 1;
        if stop_after.is_some_and(|n| printed >= n) {
            break;
        }
    }
    Ok(())
}

/// Print the sorted set of source and destination IPs, one per line.
pub async fn action_ipset(records: &mut RecordStream, w: &mut impl Write) -> anyhow::Result<()> {
    let mut ips: BTreeSet<IpAddr> = BTreeSet::new();
    while let Some(result) = records.next_record().await {
        let record = result?;
        ips.insert(record.src_ip);
        ips.insert(record.dest_ip);
    }
    for ip in ips {
        writeln!(w, "{ip}")?;
    }
    Ok(())
}

/// Print records whose source or destination IP is in `targets`.
pub async fn action_findip(
    records: &mut RecordStream,
    w: &mut impl Write,
    targets: &HashSet<IpAddr>,
) -> anyhow::Result<()> {
    print_header(w)?;
    while let Some(result) = records.next_record().await {
        let record = result?;
        if targets.contains(&record.src_ip) || targets.contains(&record.dest_ip) {
            print_record(w, &record)?;
        }
    }
    Ok(())
}

/// Drain the stream through the aggregation engine, then print one TSV row
/// per group. Row order is the engine's emission order (unspecified).
pub async fn action_aggregate(
    records: &mut RecordStream,
    w: &mut impl Write,
    key_fields: &[KeyField],
) -> anyhow::Result<()> {
    let mut aggregator = FlowAggregator::new(key_fields.to_vec());
    while let Some(result) = records.next_record().await {
        aggregator.fold(&result?);
    }
    print_stat_header(w, key_fields)?;
    for row in aggregator.into_records() {
        print_stat_record(w, &row)?;
    }
    Ok(())
}

pub fn print_stat_header(w: &mut impl Write, key_fields: &[KeyField]) -> std::io::Result<()> {
    let mut columns: Vec<&str> = key_fields.iter().map(KeyField::name).collect();
    columns.extend(["packets_sent", "bytes_sent", "start_time", "end_time"]);
    writeln!(w, "{}", columns.join("\t"))
}

pub fn print_stat_record(w: &mut impl Write, row: &StatRecord) -> std::io::Result<()> {
    for value in &row.key {
        write!(w, "{value}\t")?;
    }
    writeln!(
        w,
        "{}\t{}\t{}\t{}",
        row.packets_sent,
        row.bytes_sent,
        row.start_time.format(TIME_FORMAT),
        row.end_time.format(TIME_FORMAT),
    )
}
