/// Candidate separators, in tie-break priority order.
const CANDIDATES: [char; 4] = [',', ';', '\t', '|'];

/// Picks the most likely field separator by counting literal
/// occurrences of each candidate in the first line of the content.
///
/// Quoting is deliberately ignored at this stage, so a quoted field
/// containing many of the majority character can mis-detect. That is
/// an accepted limitation of the heuristic; callers who know their
/// separator should pass it explicitly instead of using auto.
pub fn detect_delimiter(text: &str) -> char {
    let first_line = text.lines().next().unwrap_or("");

    let mut best = ',';
    let mut best_count = 0usize;

    for candidate in CANDIDATES {
        let count = first_line.chars().filter(|c| *c == candidate).count();
        // Strictly greater keeps the earlier candidate on ties.
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }

    best
}
