/// Cleans raw CSV text before it reaches the parser.
///
/// Upstream capture steps occasionally append a local `file://` handle
/// or a stray download URL to the content. Three passes remove them:
///
/// 1. every `file://...` token is cut out up to the next whitespace,
///    comma, or line break, leaving the rest of the line intact;
/// 2. any line that is *entirely* a bare `http://`/`https://` URL is
///    dropped (full-line match only, so a cell that merely contains a
///    URL among other data survives);
/// 3. blank-line runs left behind collapse to a single blank line and
///    the whole text is trimmed.
///
/// This runs unconditionally before every parse, preview included.
pub fn sanitize(raw: &str) -> String {
    let without_file_uris = strip_file_uris(raw);

    let mut out = String::with_capacity(without_file_uris.len());
    let mut previous_blank = false;

    for line in without_file_uris.lines() {
        if is_bare_url_line(line) {
            continue;
        }

        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }

    out.trim().to_string()
}

/// Removes every `file://` token, terminating each at the next
/// whitespace, comma, or newline.
fn strip_file_uris(text: &str) -> String {
    let mut result = text.to_string();

    while let Some(start) = result.find("file://") {
        let end = result[start..]
            .find(|c: char| c.is_whitespace() || c == ',')
            .map(|offset| start + offset)
            .unwrap_or(result.len());
        result.replace_range(start..end, "");
    }

    result
}

/// True when the trimmed line is nothing but a single http(s) URL.
fn is_bare_url_line(line: &str) -> bool {
    let trimmed = line.trim();

    let rest = if let Some(rest) = trimmed.strip_prefix("https://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        rest
    } else {
        return false;
    };

    !rest.is_empty() && !rest.contains(char::is_whitespace) && !rest.contains(',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_file_uri_removed_rest_of_line_kept() {
        let input = "alice,42,file:///tmp/x.csv\nbob,7";
        assert_eq!(sanitize(input), "alice,42,\nbob,7");
    }

    #[test]
    fn test_file_uri_in_middle_terminates_at_comma() {
        let input = "a,file:///home/u/capture.csv,b";
        assert_eq!(sanitize(input), "a,,b");
    }

    #[test]
    fn test_bare_url_line_dropped() {
        let input = "h1,h2\nhttps://example.com/download?id=9\n1,2";
        assert_eq!(sanitize(input), "h1,h2\n1,2");
    }

    #[test]
    fn test_url_inside_cell_data_survives() {
        let input = "name,site\nacme,https://acme.example";
        assert_eq!(sanitize(input), "name,site\nacme,https://acme.example");
    }

    #[test]
    fn test_blank_runs_collapse_and_text_is_trimmed() {
        let input = "\n\na,b\n\n\n\nc,d\n\n";
        assert_eq!(sanitize(input), "a,b\n\nc,d");
    }

    #[test]
    fn test_scheme_only_line_is_not_a_url() {
        assert_eq!(sanitize("https://\na,b"), "https://\na,b");
    }
}
