use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use seqrip::seq::ConversionLog;
use seqrip::{BytePattern, ByteSource, RegionTree, SequenceDocument};
use unicode_width::UnicodeWidthStr;

/// Pad a &str to a target display width (columns) using unicode-width so
/// fullwidth characters in marker text keep the columns aligned.
fn pad_to_width(s: &str, width: usize) -> String {
    let w = UnicodeWidthStr::width(s);
    if w >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - w))
    }
}

fn plain_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

/// Region tree as an indented table, one row per node in pre-order.
pub fn print_regions(tree: &RegionTree, max_depth: Option<usize>) {
    let rows: Vec<_> = tree
        .iter()
        .filter(|(depth, _)| max_depth.is_none_or(|max| *depth <= max))
        .map(|(depth, node)| (node, format!("{}{}", "  ".repeat(depth), node.label)))
        .collect();
    let label_width = rows
        .iter()
        .map(|(_, label)| UnicodeWidthStr::width(label.as_str()))
        .max()
        .unwrap_or(0);

    let mut table = plain_table(&["Offset", "Length", "Kind", "Label"]);
    for (node, label) in &rows {
        table.add_row(vec![
            Cell::new(format!("0x{:08X}", node.offset)),
            Cell::new(node.length).set_alignment(CellAlignment::Right),
            Cell::new(node.kind.name()),
            Cell::new(pad_to_width(label, label_width)),
        ]);
    }
    println!("{table}");
}

/// Document summary followed by one row per track.
pub fn print_info(doc: &SequenceDocument, stop: u32) {
    println!("{:<10} {}", "Name", doc.name());
    println!("{:<10} {}", "PPQN", doc.ppqn());
    println!("{:<10} {}", "Tracks", doc.track_count());
    println!("{:<10} {} ticks", "Length", stop);
    println!("{:<10} {:?}", "Status", doc.status());
    println!();

    let mut table = plain_table(&["#", "Name", "Start", "Channel", "Ticks"]);
    for (i, track) in doc.tracks().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(track.name()),
            Cell::new(format!("0x{:08X}", track.start())),
            Cell::new(track.channel()).set_alignment(CellAlignment::Right),
            Cell::new(track.measured_length()).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
}

/// Messages recorded while decoding, if any.
pub fn print_log(log: &ConversionLog) {
    if log.entries().is_empty() {
        return;
    }
    println!();
    let mut table = plain_table(&["Level", "Track", "Offset", "Message"]);
    for entry in log.entries() {
        let offset = entry
            .offset
            .map(|o| format!("0x{:08X}", o))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(entry.level),
            Cell::new(&entry.source),
            Cell::new(offset),
            Cell::new(&entry.message),
        ]);
    }
    println!("{table}");
}

/// Every match of `pattern`, up to `limit`, with the bytes that matched.
pub fn print_find(bytes: Vec<u8>, pattern: &BytePattern, limit: usize) {
    let mut source = ByteSource::new(bytes);
    let len = source.len();
    // a search only covers one window; step so consecutive windows overlap
    // by the pattern length
    let step = (source.config().max_window + 1)
        .saturating_sub(pattern.len())
        .max(1);
    let mut from = 0;
    let mut found = 0;
    while from < len && found < limit {
        let size = (len - from).min(step);
        match source.search(pattern, from, size + pattern.len() - 1) {
            Some(at) => {
                let matched = source.read_clipped(at, pattern.len()).unwrap_or_default();
                let hex: Vec<String> = matched.iter().map(|b| format!("{:02X}", b)).collect();
                println!("0x{:08X}  {}", at, hex.join(" "));
                found += 1;
                from = at + 1;
            }
            None => from += size,
        }
    }
    if found == 0 {
        println!("no match");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_width_counts_columns() {
        assert_eq!(pad_to_width("ab", 4), "ab  ");
        // fullwidth characters take two columns each
        assert_eq!(pad_to_width("曲", 4), "曲  ");
        assert_eq!(pad_to_width("abcdef", 4), "abcdef");
    }
}
