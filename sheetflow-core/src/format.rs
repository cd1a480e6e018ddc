//! Number format classification

/// Formats that contain date letters but never denote a date.
///
/// Compared case-insensitively against the whole format code. Anything not
/// listed here that still has a `y`, `m`, `d`, `h` or `s` token after literal
/// stripping is treated as a date, false positives included.
const NON_DATE_FORMATS: &[&str] = &[
    "general",
    "general number",
    "standard",
    "fixed",
    "scientific",
    "percent",
    "currency",
    "yes/no",
    "true/false",
    "on/off",
    "@",
];

/// Check if a format code represents a date/time format.
pub fn is_date_format(format: &str) -> bool {
    if is_denied(format) {
        return false;
    }

    let section = strip_literals(format);
    if is_denied(&section) {
        return false;
    }

    section
        .chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'y' | 'm' | 'd' | 'h' | 's'))
}

fn is_denied(format: &str) -> bool {
    let trimmed = format.trim();
    NON_DATE_FORMATS
        .iter()
        .any(|denied| trimmed.eq_ignore_ascii_case(denied))
}

/// First section of the format with quoted text, escapes, fill/spacing
/// characters and bracketed modifiers removed. Elapsed-time brackets such as
/// `[h]` or `[mm]` are kept as tokens.
fn strip_literals(format: &str) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for b in chars.by_ref() {
                    if b == ']' {
                        break;
                    }
                    inner.push(b);
                }
                let elapsed = !inner.is_empty()
                    && inner
                        .chars()
                        .all(|e| matches!(e.to_ascii_lowercase(), 'h' | 'm' | 's'));
                if elapsed {
                    out.push_str(&inner);
                }
            }
            ';' => break,
            _ => out.push(c),
        }
    }
    out
}

/// Get the format code for a built-in number format ID.
pub fn builtin_format_code(id: u32) -> Option<&'static str> {
    match id {
        0 => Some("General"),
        1 => Some("0"),
        2 => Some("0.00"),
        3 => Some("#,##0"),
        4 => Some("#,##0.00"),
        5 => Some("\"$\"#,##0_);(\"$\"#,##0)"),
        6 => Some("\"$\"#,##0_);[Red](\"$\"#,##0)"),
        7 => Some("\"$\"#,##0.00_);(\"$\"#,##0.00)"),
        8 => Some("\"$\"#,##0.00_);[Red](\"$\"#,##0.00)"),
        9 => Some("0%"),
        10 => Some("0.00%"),
        11 => Some("0.00E+00"),
        12 => Some("# ?/?"),
        13 => Some("# ??/??"),
        14 => Some("m/d/yy"),
        15 => Some("d-mmm-yy"),
        16 => Some("d-mmm"),
        17 => Some("mmm-yy"),
        18 => Some("h:mm AM/PM"),
        19 => Some("h:mm:ss AM/PM"),
        20 => Some("h:mm"),
        21 => Some("h:mm:ss"),
        22 => Some("m/d/yy h:mm"),
        37 => Some("#,##0_);(#,##0)"),
        38 => Some("#,##0_);[Red](#,##0)"),
        39 => Some("#,##0.00_);(#,##0.00)"),
        40 => Some("#,##0.00_);[Red](#,##0.00)"),
        41 => Some("_(* #,##0_);_(* \\(#,##0\\);_(* \"-\"_);_(@_)"),
        42 => Some("_(\"$\"* #,##0_);_(\"$\"* \\(#,##0\\);_(\"$\"* \"-\"_);_(@_)"),
        43 => Some("_(* #,##0.00_);_(* \\(#,##0.00\\);_(* \"-\"??_);_(@_)"),
        44 => Some("_(\"$\"* #,##0.00_);_(\"$\"* \\(#,##0.00\\);_(\"$\"* \"-\"??_);_(@_)"),
        45 => Some("mm:ss"),
        46 => Some("[h]:mm:ss"),
        47 => Some("mmss.0"),
        48 => Some("##0.0E+0"),
        49 => Some("@"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_date_format() {
        assert!(is_date_format("DD/MM/YY"));
        assert!(is_date_format("H:MM:SS;@"));
        assert!(is_date_format("m\"M\"d\"D\";@"));
        assert!(is_date_format("[$-404]e\"\\xfc\"m\"\\xfc\"d\"\\xfc\""));
        assert!(is_date_format("yyyy-mm-dd"));
        assert!(is_date_format("[h]:mm:ss"));
        assert!(is_date_format("[$-409]mmmm d, yyyy;@"));

        assert!(!is_date_format("#,##0\\ [$\\u20bd-46D]"));
        assert!(!is_date_format(
            "\"Y: \"0.00\"m\";\"Y: \"-0.00\"m\";\"Y: <num>m\";@"
        ));
        assert!(!is_date_format("\"$\"#,##0_);[Red](\"$\"#,##0)"));
        assert!(!is_date_format("0_ ;[Red]\\-0\\ "));
        assert!(!is_date_format("\\Y000000"));
        assert!(!is_date_format("#,##0.0####\" YMD\""));
        assert!(!is_date_format("[Red]0.00"));
    }

    #[test]
    fn test_denylist() {
        for format in ["General", "GENERAL", "Standard", "Fixed", "Scientific", "Yes/No", "@"] {
            assert!(!is_date_format(format), "{} is not a date format", format);
        }
        assert!(is_date_format("Short Date"));
    }

    #[test]
    fn test_builtin_formats() {
        assert_eq!(builtin_format_code(0), Some("General"));
        assert_eq!(builtin_format_code(14), Some("m/d/yy"));
        assert_eq!(builtin_format_code(999), None);

        let dates: Vec<u32> = (0..50)
            .filter(|id| builtin_format_code(*id).is_some_and(is_date_format))
            .collect();
        assert_eq!(dates, vec![14, 15, 16, 17, 18, 19, 20, 21, 22, 45, 46, 47]);
    }
}
