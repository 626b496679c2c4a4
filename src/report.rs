use crate::freshness::FreshnessStatus;
use crate::sink::MetricRecord;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

fn freshness_color(status: FreshnessStatus) -> Color {
    match status {
        FreshnessStatus::Fresh => Color::Rgb { r: 0, g: 200, b: 0 },
        FreshnessStatus::Stale => Color::Rgb { r: 220, g: 60, b: 60 },
    }
}

/// Renders metric records as a console table, optionally limited to one symbol.
pub fn render(records: &[MetricRecord], symbol: Option<&str>) -> Option<String> {
    let rows: Vec<&MetricRecord> = records
        .iter()
        .filter(|r| symbol.is_none_or(|s| r.symbol.eq_ignore_ascii_case(s)))
        .collect();

    if rows.is_empty() {
        return None;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Symbol").add_attribute(Attribute::Bold),
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Freshness").add_attribute(Attribute::Bold),
        ]);

    for record in rows {
        table.add_row(vec![
            Cell::new(&record.symbol).fg(Color::Rgb { r: 0, g: 255, b: 255 }),
            Cell::new(record.metric_type.storage_key()).fg(Color::DarkGrey),
            Cell::new(&record.value).set_alignment(CellAlignment::Right),
            Cell::new(record.freshness).fg(freshness_color(record.freshness)),
        ]);
    }

    Some(table.to_string())
}
