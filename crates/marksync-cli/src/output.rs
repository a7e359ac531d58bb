//! Output formatting helpers.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use marksync_core::Bookmark;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// Print a dimmed note on stderr.
pub fn note(msg: &str) {
    eprintln!("{}", msg.dimmed());
}

/// Print a value as compact JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print one bookmark as a display line.
pub fn bookmark(record: &Bookmark) {
    println!("{}", bookmark_line(record));
}

fn bookmark_line(record: &Bookmark) -> String {
    format!(
        "{}  {}  {}  {}",
        record.id.as_str().cyan(),
        record.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        record.title.bold(),
        record.url.underline()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_line_shows_every_field() {
        colored::control::set_override(false);

        let record: Bookmark = serde_json::from_value(serde_json::json!({
            "id": 7,
            "user_id": "u1",
            "title": "Rust",
            "url": "https://rust-lang.org",
            "created_at": "2024-05-01T10:05:00Z"
        }))
        .unwrap();

        assert_eq!(
            bookmark_line(&record),
            "7  2024-05-01 10:05  Rust  https://rust-lang.org"
        );
    }
}
