use chrono::NaiveDate;

/// This is the standard way of naming a backup of the store.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("sitetally-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Formats tracked seconds the way totals are shown to the user, e.g. `2h 05m`.
pub fn format_tracked(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}h {minutes:02}m")
}
