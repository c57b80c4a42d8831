/// A line-preserving fragment of one page. Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDraft {
    pub text: String,
    pub line_start: u32,
    pub line_end: u32,
}

pub fn normalize_text(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Splits plain text into pages on form feed, then each page into lines.
pub fn split_pages(text: &str) -> Vec<Vec<String>> {
    let normalized = normalize_text(text);
    normalized
        .split('\u{c}')
        .map(|page| page.lines().map(|l| l.to_string()).collect())
        .collect()
}

/// Packs consecutive lines into fragments of at most `max_tokens` whitespace tokens.
/// A single line longer than the budget becomes its own fragment.
pub fn chunk_lines(lines: &[String], max_tokens: usize) -> Vec<FragmentDraft> {
    let mut out = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut tokens = 0usize;
    let mut start_line = 1u32;

    fn flush(buf: &mut Vec<&str>, start: u32, end: u32, out: &mut Vec<FragmentDraft>) {
        let text = buf.join("\n");
        if !text.trim().is_empty() {
            out.push(FragmentDraft {
                text,
                line_start: start,
                line_end: end,
            });
        }
        buf.clear();
    }

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx as u32 + 1;
        let n = line.split_whitespace().count();
        if tokens + n > max_tokens && !buf.is_empty() {
            flush(&mut buf, start_line, line_no - 1, &mut out);
            tokens = 0;
            start_line = line_no;
        }
        buf.push(line.as_str());
        tokens += n;
    }
    if !buf.is_empty() {
        flush(&mut buf, start_line, lines.len() as u32, &mut out);
    }
    out
}
