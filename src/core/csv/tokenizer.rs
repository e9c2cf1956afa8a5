/// Splits one raw line into fields, honoring double-quote quoting.
///
/// Rules:
/// - a `"` outside quotes opens a quoted section (the quote itself is
///   not part of the field);
/// - `""` inside quotes emits one literal `"`;
/// - a `"` inside quotes followed by anything else closes the section;
/// - the separator only splits while outside quotes;
/// - an unterminated quote is tolerated and treated as closed at the
///   end of the line.
///
/// Each finalized field is trimmed. The trailing field is always
/// emitted, so a well-quoted line yields exactly one more field than
/// it has unquoted separators.
pub fn tokenize_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes {
                if chars.peek() == Some(&'"') {
                    // Doubled quote: keep one literal quote.
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                in_quotes = true;
            }
        } else if c == delimiter && !in_quotes {
            fields.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    fields.push(current.trim().to_string());

    fields
}
