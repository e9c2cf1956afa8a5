use crate::core::csv::detector::detect_delimiter;
use crate::core::csv::models::{HeaderMode, ParseConfig, ParseError, ParsedTable};
use crate::core::csv::tokenizer::tokenize_line;

/// Parses raw CSV text into a [`ParsedTable`] according to the config.
///
/// In preview mode only the first `preview_row_limit + 1` lines are
/// tokenized (header plus preview rows), but the reported row counts
/// always reflect the full input so the caller can show "N rows total"
/// next to the sample.
///
/// Cell values stay strings throughout; number and date coercion is a
/// remote-service concern, not ours.
pub fn parse_csv(raw: &str, config: &ParseConfig) -> Result<ParsedTable, ParseError> {
    if config.preview_only && config.preview_row_limit == 0 {
        return Err(ParseError::InvalidConfig(
            "preview_row_limit must be at least 1 in preview mode".to_string(),
        ));
    }

    let delimiter = match config.delimiter.as_char() {
        Some(c) => c,
        None => detect_delimiter(raw),
    };

    let mut lines: Vec<&str> = Vec::new();
    for line in raw.split('\n') {
        let line = if config.trim_whitespace {
            line.trim()
        } else {
            line
        };
        if config.skip_empty_rows && line.is_empty() {
            continue;
        }
        lines.push(line);
    }

    // True totals come from the unrestricted line count; preview only
    // bounds how many lines we pay to tokenize.
    let row_count_original = lines.len();
    if config.preview_only {
        lines.truncate(config.preview_row_limit + 1);
    }

    let mut rows: Vec<Vec<String>> = lines
        .iter()
        .map(|line| tokenize_line(line, delimiter))
        .filter(|fields| !fields.is_empty())
        .collect();

    if rows.is_empty() {
        return Err(ParseError::NoData);
    }

    let headers = match config.header_mode {
        HeaderMode::Use => Some(rows.remove(0)),
        HeaderMode::Skip => {
            rows.remove(0);
            None
        }
        HeaderMode::None => None,
    };

    let header_adjustment = match config.header_mode {
        HeaderMode::Use | HeaderMode::Skip => 1,
        HeaderMode::None => 0,
    };
    let row_count_data = row_count_original.saturating_sub(header_adjustment);

    let column_count = headers
        .as_ref()
        .map(|h| h.len())
        .or_else(|| rows.first().map(|r| r.len()))
        .unwrap_or(0);

    // Never inject a synthetic header row: sheet_data is the header
    // (when one exists) followed by the data rows, nothing more.
    let sheet_data = match &headers {
        Some(h) if !h.is_empty() => {
            let mut data = Vec::with_capacity(rows.len() + 1);
            data.push(h.clone());
            data.extend(rows.iter().cloned());
            data
        }
        _ => rows.clone(),
    };

    Ok(ParsedTable {
        headers,
        data_rows: rows,
        sheet_data,
        delimiter_used: delimiter,
        row_count_original,
        row_count_data,
        column_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::csv::models::Delimiter;

    fn config() -> ParseConfig {
        ParseConfig::default()
    }

    #[test]
    fn test_header_mode_use() {
        let table = parse_csv("h1,h2\n1,2\n3,4", &config()).unwrap();
        assert_eq!(table.headers, Some(vec!["h1".to_string(), "h2".to_string()]));
        assert_eq!(
            table.data_rows,
            vec![
                vec!["1".to_string(), "2".to_string()],
                vec!["3".to_string(), "4".to_string()]
            ]
        );
        assert_eq!(table.sheet_data.len(), 3);
        assert_eq!(table.column_count, 2);
        assert_eq!(table.row_count_data, 2);
    }

    #[test]
    fn test_header_mode_skip_discards_first_row() {
        let table = parse_csv(
            "h1,h2\n1,2\n3,4",
            &ParseConfig {
                header_mode: HeaderMode::Skip,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(table.headers, None);
        assert_eq!(
            table.data_rows,
            vec![
                vec!["1".to_string(), "2".to_string()],
                vec!["3".to_string(), "4".to_string()]
            ]
        );
        // No header row is ever resurrected into the write payload.
        assert_eq!(table.sheet_data.len(), 2);
    }

    #[test]
    fn test_header_mode_none_keeps_every_row() {
        let table = parse_csv(
            "1,2\n3,4",
            &ParseConfig {
                header_mode: HeaderMode::None,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(table.headers, None);
        assert_eq!(table.data_rows.len(), 2);
        assert_eq!(table.row_count_data, 2);
        assert_eq!(table.column_count, 2);
    }

    #[test]
    fn test_empty_input_is_a_parse_failure() {
        assert_eq!(parse_csv("", &config()), Err(ParseError::NoData));
        assert_eq!(parse_csv("\n\n  \n", &config()), Err(ParseError::NoData));
    }

    #[test]
    fn test_auto_delimiter_resolution() {
        let table = parse_csv("a;b;c\n1;2;3", &config()).unwrap();
        assert_eq!(table.delimiter_used, ';');
        assert_eq!(table.column_count, 3);
    }

    #[test]
    fn test_explicit_delimiter_skips_detection() {
        let table = parse_csv(
            "a|b,c\n1|2,3",
            &ParseConfig {
                delimiter: Delimiter::Pipe,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(table.delimiter_used, '|');
        assert_eq!(table.headers, Some(vec!["a".to_string(), "b,c".to_string()]));
    }

    #[test]
    fn test_ragged_rows_keep_their_own_length() {
        let table = parse_csv("h1,h2,h3\n1,2\n3,4,5,6", &config()).unwrap();
        assert_eq!(table.data_rows[0].len(), 2);
        assert_eq!(table.data_rows[1].len(), 4);
        // Column count follows the header, not the widest row.
        assert_eq!(table.column_count, 3);
    }

    #[test]
    fn test_preview_bounds_tokenizing_but_reports_true_totals() {
        let raw = "h1,h2\n1,2\n3,4\n5,6\n7,8\n9,10";
        let table = parse_csv(
            raw,
            &ParseConfig {
                preview_only: true,
                preview_row_limit: 2,
                ..config()
            },
        )
        .unwrap();
        assert_eq!(table.data_rows.len(), 2);
        assert_eq!(table.row_count_original, 6);
        assert_eq!(table.row_count_data, 5);
    }

    #[test]
    fn test_preview_with_zero_limit_is_rejected() {
        let err = parse_csv(
            "a,b\n1,2",
            &ParseConfig {
                preview_only: true,
                preview_row_limit: 0,
                ..config()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidConfig(_)));
    }

    #[test]
    fn test_blank_rows_kept_when_skip_disabled() {
        let table = parse_csv(
            "h1,h2\n\n1,2",
            &ParseConfig {
                skip_empty_rows: false,
                ..config()
            },
        )
        .unwrap();
        // The blank line tokenizes to a single empty field.
        assert_eq!(table.data_rows[0], vec!["".to_string()]);
        assert_eq!(table.row_count_original, 3);
    }
}
