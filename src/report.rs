//! Settings, shot and miss reports.
//!
//! Every report is a single message in the command framing, so anything the
//! target prints can be pasted back into it.

use crate::aggregator::{Aggregator, BroadcastReport};
use crate::codec::Value;
use crate::history::ShotRecord;
use crate::message::MessageWriter;
use crate::settings::Settings;
use crate::table::{Binding, DispatchEntry, DispatchTable};

/// Format current cell values.
///
/// With `tokens == None` every cell is reported in table order. Listed tokens
/// are reported in the order given; callbacks and unknown tokens are skipped.
pub fn format_report(table: &DispatchTable, settings: &Settings, tokens: Option<&[&str]>) -> String {
    let mut w = MessageWriter::new();
    let mut put = |entry: &DispatchEntry| {
        if let Binding::Cell(field) = entry.binding {
            w.pair(entry.token, settings.get(field));
        }
    };
    match tokens {
        Some(tokens) => tokens.iter().filter_map(|t| table.lookup(t)).for_each(&mut put),
        None => table.entries().iter().for_each(&mut put),
    }
    w.finish()
}

/// Format and broadcast on every transport.
pub fn report(
    aggregator: &mut Aggregator,
    table: &DispatchTable,
    settings: &Settings,
    tokens: Option<&[&str]>,
) -> BroadcastReport {
    let text = format_report(table, settings, tokens);
    aggregator.broadcast_all(text.as_bytes())
}

/// `{"SHOT":n,"X":x,"Y":y}`
pub fn format_shot(record: &ShotRecord) -> String {
    MessageWriter::new()
        .count("SHOT", record.shot)
        .pair("X", Value::Double(record.x))
        .pair("Y", Value::Double(record.y))
        .finish()
}

/// `{"SHOT":n,"MISS":1}`
pub fn format_miss(shot: u32) -> String {
    MessageWriter::new()
        .count("SHOT", shot)
        .pair("MISS", Value::Int16(1))
        .finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
