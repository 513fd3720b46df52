//! Row extraction from the HTML-table export (served as `.xls`) and from CSV.
use regex::Regex;

use super::ExportError;

/// Every `<tr>` as a list of cell texts, tags stripped and entities decoded.
pub fn html_rows(html: &str) -> Result<Vec<Vec<String>>, ExportError> {
    let row_re = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>")?;
    let cell_re = Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>")?;
    let tag_re = Regex::new(r"(?s)<[^>]*>")?;

    let rows = row_re
        .captures_iter(html)
        .filter_map(|row| row.get(1))
        .map(|row| {
            cell_re
                .captures_iter(row.as_str())
                .filter_map(|cell| cell.get(1))
                .map(|cell| clean_cell(&tag_re.replace_all(cell.as_str(), " ")))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();
    Ok(rows)
}

/// CSV rows, header included, ragged lines allowed.
pub fn csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(clean_cell).collect());
    }
    Ok(rows)
}

fn clean_cell(raw: &str) -> String {
    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    decoded
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
