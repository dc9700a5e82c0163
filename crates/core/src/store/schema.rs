use csv::StringRecord;

/// Canonical column order written by `RecordStore::save`.
pub const HEADER: [&str; 4] = ["id", "label", "predicted_label", "updated_at"];

/// Column positions resolved from a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub id: usize,
    pub label: Option<usize>,
    pub predicted_label: Option<usize>,
    pub updated_at: Option<usize>,
}

/// Map a header row onto the record schema.
///
/// Files written by the older labeling scripts use `uuid` and `timestamp`
/// and may lack `predicted_label` entirely; those are accepted and upgraded
/// to the canonical layout on the next save. Unknown columns are ignored.
pub fn resolve(headers: &StringRecord) -> Result<Columns, String> {
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };

    let id = find(&["id", "uuid"]).ok_or_else(|| "missing `id` column".to_string())?;

    Ok(Columns {
        id,
        label: find(&["label"]),
        predicted_label: find(&["predicted_label"]),
        updated_at: find(&["updated_at", "timestamp"]),
    })
}

/// Parse a nullable score cell. Empty and `NaN` mean absent.
pub fn parse_score(cell: &str) -> Result<Option<f64>, String> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value: f64 = cell
        .parse()
        .map_err(|_| format!("invalid score {cell:?}"))?;
    if value.is_nan() {
        return Ok(None);
    }
    if !value.is_finite() {
        return Err(format!("non-finite score {cell:?}"));
    }
    Ok(Some(value))
}

/// Parse an epoch-seconds cell. Float renderings such as `1680000000.0`
/// (written when the column held gaps) are truncated; empty reads as 0.
pub fn parse_timestamp(cell: &str) -> Result<i64, String> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(0);
    }
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(value);
    }
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.trunc() as i64),
        _ => Err(format!("invalid timestamp {cell:?}")),
    }
}

pub fn format_score(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
