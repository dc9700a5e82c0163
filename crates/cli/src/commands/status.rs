use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use scorelabel_core::planner::{median_prediction, Strategy};
use scorelabel_core::{CurationStats, Curator};

/// Share of `part` in `total` as a percentage string.
pub(crate) fn format_percent(part: usize, total: usize) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / total as f64)
}

pub(crate) fn format_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.3}"),
        None => "\u{2014}".to_string(),
    }
}

fn format_last_update(curator: &Curator) -> String {
    let latest = curator.store().records().iter().map(|r| r.updated_at).max();
    match latest {
        Some(ts) if ts > 0 => chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        _ => "never".to_string(),
    }
}

pub(crate) fn stats_table(stats: &CurationStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Metric"), Cell::new("Count"), Cell::new("Share")]);

    let rows: [(&str, usize, Option<Color>); 4] = [
        ("Labeled", stats.labeled, Some(Color::Green)),
        ("Unreviewed", stats.unreviewed, Some(Color::Yellow)),
        ("Predicted", stats.predicted, None),
        ("Orphaned records", stats.orphaned, Some(Color::DarkGrey)),
    ];
    for (name, count, color) in rows {
        let mut count_cell = Cell::new(count);
        if let Some(color) = color {
            count_cell = count_cell.fg(color);
        }
        table.add_row(vec![
            Cell::new(name),
            count_cell,
            Cell::new(format_percent(count, stats.corpus_images.max(stats.records))),
        ]);
    }
    table
}

pub fn run(curator: &Curator) -> Result<()> {
    let stats = curator.status()?;
    let backup = match &stats.backup {
        Some(p) => p.display().to_string(),
        None => "none".to_string(),
    };

    println!();
    println!("  Scorelabel Status");
    println!("  =================");
    println!();
    println!("   Corpus:   {}", curator.corpus().dir().display());
    println!("   Store:    {}", curator.store_path().display());
    println!("   Backup:   {backup}");
    println!(
        "   Images:   {:>8}        Records:  {:>8}",
        stats.corpus_images, stats.records
    );
    println!(
        "   Median prediction: {}",
        format_score(median_prediction(curator.store()))
    );
    println!("   Last update:       {}", format_last_update(curator));
    println!();
    println!("{}", stats_table(&stats));

    println!();
    let names: Vec<&str> = Strategy::ALL.iter().map(Strategy::as_str).collect();
    println!("  Run 'scorelabel review --strategy <{}>' to continue.", names.join("|"));
    println!();

    Ok(())
}
