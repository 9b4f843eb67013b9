//! Table formatters for the server's `groups`, `sessions` and `peers` replies.
//!
//! Each takes the raw reply and yields display lines. A header line is only
//! produced when there is at least one row.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A session group: `[name, sessions, cost, retained cost, reqs, txs, subs,
/// recv count, recv size, send count, send size]`.
#[derive(Debug, Deserialize)]
struct GroupRow {
    name: String,
    session_count: u64,
    cost: f64,
    retained_cost: f64,
    reqs: u64,
    txs_sent: u64,
    subs: u64,
    recv_count: u64,
    recv_size: u64,
    send_count: u64,
    send_size: u64,
}

/// A client session, serialized positionally like [`GroupRow`].
#[derive(Debug, Deserialize)]
struct SessionRow {
    id: u64,
    flags: String,
    peer: String,
    client: String,
    proto: String,
    cost: f64,
    extra_cost: f64,
    reqs: u64,
    txs_sent: u64,
    subs: u64,
    recv_count: u64,
    recv_size: u64,
    send_count: u64,
    send_size: u64,
    conn_time: f64,
}

#[derive(Debug, Deserialize)]
struct PeerRow {
    host: String,
    status: String,
    features: PeerFeatures,
    last_good: Option<f64>,
    last_try: Option<f64>,
    try_count: u64,
    source: String,
    ip_addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PeerFeatures {
    #[serde(default)]
    hosts: BTreeMap<String, HostPorts>,
    server_version: Option<String>,
    protocol_min: Option<String>,
    protocol_max: Option<String>,
    pruning: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HostPorts {
    tcp_port: Option<u16>,
    ssl_port: Option<u16>,
}

/// Lines for the reply of the `groups` command.
pub fn groups_lines(data: &Value) -> Result<Vec<String>, serde_json::Error> {
    let rows = Vec::<GroupRow>::deserialize(data)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!(
        "{:<14} {:>9} {:>8} {:>8} {:>6} {:>6} {:>8}{:>7} {:>9} {:>7} {:>9}",
        "Name", "Sessions", "Cost", "Retained", "Reqs", "Txs", "Subs",
        "Recv", "Recv KB", "Sent", "Sent KB"
    ));
    for row in rows {
        lines.push(format!(
            "{:<14} {:>9} {:>8} {:>8} {:>6} {:>6} {:>8}{:>7} {:>9} {:>7} {:>9}",
            row.name,
            thousands(row.session_count),
            thousands_signed(row.cost),
            thousands_signed(row.retained_cost),
            thousands(row.reqs),
            thousands(row.txs_sent),
            thousands(row.subs),
            thousands(row.recv_count),
            thousands(row.recv_size / 1024),
            thousands(row.send_count),
            thousands(row.send_size / 1024),
        ));
    }
    Ok(lines)
}

/// Lines for the reply of the `sessions` command.
pub fn sessions_lines(data: &Value) -> Result<Vec<String>, serde_json::Error> {
    let rows = Vec::<SessionRow>::deserialize(data)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!(
        "{:<6} {:<5} {:>17} {:>5} {:>7} {:>7} {:>5} {:>5} {:>7} {:>7} {:>7} {:>7} {:>7} {:>9} {:>21}",
        "ID", "Flags", "Client", "Proto", "Cost", "XCost", "Reqs", "Txs", "Subs",
        "Recv", "Recv KB", "Sent", "Sent KB", "Time", "Peer"
    ));
    for row in rows {
        lines.push(format!(
            "{:<6} {:<5} {:>17} {:>5} {:>7} {:>7} {:>5} {:>5} {:>7} {:>7} {:>7} {:>7} {:>7} {:>9} {:>21}",
            row.id,
            row.flags,
            row.client,
            row.proto,
            thousands_signed(row.cost),
            thousands_signed(row.extra_cost),
            thousands(row.reqs),
            thousands(row.txs_sent),
            thousands(row.subs),
            thousands(row.recv_count),
            thousands(row.recv_size / 1024),
            thousands(row.send_count),
            thousands(row.send_size / 1024),
            formatted_time(row.conn_time, ""),
            row.peer,
        ));
    }
    Ok(lines)
}

/// Lines for the reply of the `peers` command.
///
/// `now` is the current UNIX time; last-seen columns show the time elapsed
/// since then.
pub fn peers_lines(data: &Value, now: f64) -> Result<Vec<String>, serde_json::Error> {
    let rows = Vec::<PeerRow>::deserialize(data)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let since = |t: Option<f64>| match t {
        Some(t) if t != 0.0 => formatted_time(now - t, " "),
        _ => "Never".to_string(),
    };
    let port = |p: Option<u16>| p.map(|p| p.to_string()).unwrap_or_default();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!(
        "{:<62} {:<6} {:>5} {:>5} {:<17} {:>4} {:>4} {:>8} {:>11} {:>11} {:>5} {:>20} {:<15}",
        "Host", "Status", "TCP", "SSL", "Server", "Min", "Max", "Pruning",
        "Last Good", "Last Try", "Tries", "Source", "IP Address"
    ));
    for row in rows {
        let features = &row.features;
        let ports = features.hosts.get(&row.host);
        lines.push(format!(
            "{:<62} {:<6} {:>5} {:>5} {:<17} {:>4} {:>4} {:>8} {:>11} {:>11} {:>5} {:>20} {:<15}",
            row.host.chars().take(62).collect::<String>(),
            row.status,
            port(ports.and_then(|p| p.tcp_port)),
            port(ports.and_then(|p| p.ssl_port)),
            features.server_version.as_deref().unwrap_or("unknown"),
            features.protocol_min.as_deref().unwrap_or_default(),
            features.protocol_max.as_deref().unwrap_or_default(),
            features.pruning.map(|p| p.to_string()).unwrap_or_default(),
            since(row.last_good),
            since(row.last_try),
            row.try_count,
            row.source.chars().take(20).collect::<String>(),
            row.ip_addr.as_deref().unwrap_or_default(),
        ));
    }
    Ok(lines)
}

/// Format a number of seconds as days, hours, minutes and maybe seconds,
/// e.g. `1d 02h 03m` or `04m 05s`.
pub fn formatted_time(secs: f64, sep: &str) -> String {
    // Truncation toward zero; negative spans (clock skew) show as zero.
    let mut t = if secs > 0.0 { secs as u64 } else { 0 };
    let mut parts = Vec::with_capacity(3);
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        let val = t / size;
        if !parts.is_empty() || val != 0 {
            if unit == "d" {
                parts.push(format!("{}{}", val, unit));
            } else {
                parts.push(format!("{:02}{}", val, unit));
            }
        }
        t %= size;
    }
    if parts.len() < 3 {
        parts.push(format!("{:02}s", t));
    }
    parts.join(sep)
}

/// Group digits in threes, e.g. `1234567` -> `1,234,567`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// [`thousands`] for a float truncated to an integer, keeping the sign.
fn thousands_signed(n: f64) -> String {
    let whole = n.trunc();
    let grouped = thousands(whole.abs() as u64);
    if whole < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
