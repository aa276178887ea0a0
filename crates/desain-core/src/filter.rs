use crate::record::DesignRecord;

/// Case-insensitive substring match on the client name.
///
/// A blank query keeps every record. Order is preserved.
pub fn apply_local_filter<'a>(records: &'a [DesignRecord], query: &str) -> Vec<&'a DesignRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records.iter().collect();
    }
    records
        .iter()
        .filter(|r| r.client_name.to_lowercase().contains(&needle))
        .collect()
}
