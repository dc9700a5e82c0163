use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use scorelabel_core::planner::{ReviewOrder, Strategy};
use scorelabel_core::store::RecordStore;
use scorelabel_core::Curator;

use super::status::format_score;

pub(crate) fn order_table(order: &ReviewOrder, store: &RecordStore, limit: Option<usize>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Id"),
        Cell::new("Label"),
        Cell::new("Predicted"),
    ]);

    for (i, id) in order.iter().take(limit.unwrap_or(usize::MAX)).enumerate() {
        let record = store.get(id);
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(id),
            Cell::new(format_score(record.and_then(|r| r.label))),
            Cell::new(format_score(record.and_then(|r| r.predicted_label))),
        ]);
    }
    table
}

pub fn run(curator: &Curator, strategy: Strategy, limit: Option<usize>) -> Result<()> {
    let order = curator.plan(strategy);
    println!();
    println!("  Review order: {strategy} ({} images)", order.len());
    println!("{}", order_table(&order, curator.store(), limit));
    println!();
    Ok(())
}
