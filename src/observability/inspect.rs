//! Inspection of inbound messages
//!
//! Received messages are observed only. The default inspector hexdumps topic
//! and payload to the log.

use tracing::info;

const BYTES_PER_LINE: usize = 16;

/// Read-only observer for messages arriving on subscribed topics
pub trait MessageInspector: Send {
    fn inspect(&mut self, topic: &str, payload: &[u8]);
}

/// Logs topic and payload as hexdumps at INFO
#[derive(Debug, Default, Clone, Copy)]
pub struct HexdumpInspector;

impl MessageInspector for HexdumpInspector {
    fn inspect(&mut self, topic: &str, payload: &[u8]) {
        for line in hexdump_lines(topic.as_bytes()) {
            info!(target: "mqtt_rx", "{}", line);
        }
        for line in hexdump_lines(payload) {
            info!(target: "mqtt_rx", "{}", line);
        }
    }
}

/// Format bytes as `offset: hex  ascii` lines, 16 bytes per line
pub fn hexdump_lines(data: &[u8]) -> Vec<String> {
    data.chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(index, row)| {
            let hex: Vec<String> = row.iter().map(|b| format!("{b:02X}")).collect();
            let ascii: String = row
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:04X}: {:<width$}   {}",
                index * BYTES_PER_LINE,
                hex.join(" "),
                ascii,
                width = BYTES_PER_LINE * 3 - 1
            )
        })
        .collect()
}
