use std::fmt::{self, Write as _};

use evp_core::error::AppError;

use super::manifest::ManifestRow;
use crate::evidence::EvidenceItem;

pub const INDEX_HTML: &str = "index.html";

pub struct IndexPage<'a> {
    pub pack_id: &'a str,
    pub created_by: &'a str,
    pub created_at: &'a str,
    pub query_or_case_id: &'a str,
    pub redaction_mode: &'a str,
    pub items: &'a [EvidenceItem],
    pub rows: &'a [ManifestRow],
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn write_page(s: &mut String, page: &IndexPage<'_>) -> fmt::Result {
    s.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    writeln!(s, "<title>Audit Pack {}</title>", escape_html(page.pack_id))?;
    s.push_str(
        "<style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse}\
         td,th{border:1px solid #999;padding:4px;vertical-align:top}th{background:#eee}</style>\n",
    );
    s.push_str("</head>\n<body>\n");
    writeln!(s, "<h1>Audit Pack {}</h1>", escape_html(page.pack_id))?;
    writeln!(
        s,
        "<p>Created by {} on {} | items: {} | mode: {}</p>",
        escape_html(page.created_by),
        escape_html(page.created_at),
        page.items.len(),
        escape_html(page.redaction_mode)
    )?;
    writeln!(s, "<p>Query or case: {}</p>", escape_html(page.query_or_case_id))?;

    s.push_str("<table>\n<tr><th>#</th><th>Filename</th><th>Page</th><th>Excerpt</th><th>Citation</th><th>Redacted</th><th>File</th><th>SHA-256</th></tr>\n");
    for (i, (ev, row)) in page.items.iter().zip(page.rows.iter()).enumerate() {
        writeln!(
            s,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><code>{}</code></td></tr>",
            i + 1,
            escape_html(&ev.filename),
            ev.page,
            escape_html(&ev.excerpt),
            escape_html(&ev.citation),
            if ev.redaction_applied { "Yes" } else { "No" },
            escape_html(&row.path),
            escape_html(&row.sha256)
        )?;
    }
    s.push_str("</table>\n</body>\n</html>\n");
    Ok(())
}

/// Human-readable pack summary. Rows follow pack order; items and rows are index-aligned.
pub fn render_index_html(page: &IndexPage<'_>) -> Result<String, AppError> {
    let mut s = String::new();
    write_page(&mut s, page).map_err(|e| {
        AppError::new("PACK_INDEX_ENCODE_FAILED", "Failed to render pack index")
            .with_details(format!("pack_id={}; err={}", page.pack_id, e))
    })?;
    Ok(s)
}
