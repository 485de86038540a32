//! Character encoding for the display board.
//!
//! Each cell of the board shows one of 70 codes: a blank, letters, digits,
//! a fixed set of punctuation, and seven colour blocks. Text is upper-cased
//! before lookup because the board has no lower-case glyphs.

use super::{Grid, BOARD_COLUMNS, BOARD_ROWS, MAX_MESSAGE_LENGTH};

/// Blank cell
pub const BLANK: u8 = 0;

/// First colour block code (red)
pub const COLOR_RED: u8 = 63;

/// Last colour block code (white)
pub const COLOR_WHITE: u8 = 69;

const PUNCTUATION: &[(char, u8)] = &[
    ('!', 37),
    ('@', 38),
    ('#', 39),
    ('$', 40),
    ('(', 41),
    (')', 42),
    ('-', 44),
    ('+', 46),
    ('&', 47),
    ('=', 48),
    (';', 49),
    (':', 50),
    ('\'', 52),
    ('"', 53),
    ('%', 54),
    (',', 55),
    ('.', 56),
    ('/', 59),
    ('?', 60),
    ('°', 62),
];

const REPLACEMENTS: &[(char, char)] = &[
    ('_', '-'),
    ('*', '.'),
    ('|', '!'),
    ('~', '-'),
    ('`', '\''),
    ('^', '.'),
    ('[', '('),
    (']', ')'),
    ('{', '('),
    ('}', ')'),
    ('<', '('),
    ('>', ')'),
    ('\\', '/'),
];

/// Reasons a piece of text cannot be shown on the board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("message is empty")]
    Empty,

    #[error("unsupported characters: {}", format_chars(.0))]
    UnsupportedCharacters(Vec<char>),

    #[error("message is {length} characters, the board fits {max}")]
    TooLong { length: usize, max: usize },

    #[error("message has {lines} lines, the board has {max} rows")]
    TooManyLines { lines: usize, max: usize },

    #[error("line {line} is {length} characters, a row fits {max}")]
    LineTooLong { line: usize, length: usize, max: usize },
}

fn format_chars(chars: &[char]) -> String {
    chars
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Look up the board code for a character.
///
/// ASCII letters match either case. Anything outside ASCII must appear in the
/// table as-is, so letters like `ß` or `ı` that only uppercase into A-Z are
/// unsupported.
pub fn code_for(c: char) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    match upper {
        ' ' => Some(BLANK),
        'A'..='Z' => Some(upper as u8 - b'A' + 1),
        '0'..='9' => Some(upper as u8 - b'0' + 27),
        _ => PUNCTUATION
            .iter()
            .find(|(p, _)| *p == upper)
            .map(|(_, code)| *code),
    }
}

/// Render a board code as a character. Colour blocks render as a filled square.
pub fn char_for(code: u8) -> char {
    match code {
        BLANK => ' ',
        1..=26 => (b'A' + code - 1) as char,
        27..=36 => (b'0' + code - 27) as char,
        COLOR_RED..=COLOR_WHITE => '■',
        _ => PUNCTUATION
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(p, _)| *p)
            .unwrap_or('?'),
    }
}

/// Whether the code is one of the colour blocks.
pub fn is_color_code(code: u8) -> bool {
    (COLOR_RED..=COLOR_WHITE).contains(&code)
}

/// Whether the board can display this character. Line breaks are accepted as row separators.
pub fn is_supported(c: char) -> bool {
    c == '\n' || code_for(c).is_some()
}

/// Characters in `text` the board cannot display, in order of first appearance.
pub fn unsupported_characters(text: &str) -> Vec<char> {
    let mut found = Vec::new();
    for c in text.chars() {
        if !is_supported(c) && !found.contains(&c) {
            found.push(c);
        }
    }
    found
}

/// Check that `text` can be posted as-is.
pub fn validate(text: &str) -> Result<(), ValidationIssue> {
    if text.trim().is_empty() {
        return Err(ValidationIssue::Empty);
    }

    let unsupported = unsupported_characters(text);
    if !unsupported.is_empty() {
        return Err(ValidationIssue::UnsupportedCharacters(unsupported));
    }

    if text.contains('\n') {
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() > BOARD_ROWS {
            return Err(ValidationIssue::TooManyLines {
                lines: lines.len(),
                max: BOARD_ROWS,
            });
        }
        for (index, line) in lines.iter().enumerate() {
            let length = line.chars().count();
            if length > BOARD_COLUMNS {
                return Err(ValidationIssue::LineTooLong {
                    line: index + 1,
                    length,
                    max: BOARD_COLUMNS,
                });
            }
        }
        return Ok(());
    }

    let length = text.chars().count();
    if length > MAX_MESSAGE_LENGTH {
        return Err(ValidationIssue::TooLong {
            length,
            max: MAX_MESSAGE_LENGTH,
        });
    }

    Ok(())
}

/// Lay text out on a full board grid.
///
/// Text with explicit line breaks is placed one line per row; otherwise it flows
/// across rows. Unsupported characters become blanks and overflow is dropped.
pub fn board_layout(text: &str) -> Grid {
    let mut grid = vec![vec![BLANK; BOARD_COLUMNS]; BOARD_ROWS];

    if text.contains('\n') {
        for (row, line) in text.split('\n').take(BOARD_ROWS).enumerate() {
            for (col, c) in line.chars().take(BOARD_COLUMNS).enumerate() {
                grid[row][col] = code_for(c).unwrap_or(BLANK);
            }
        }
    } else {
        for (index, c) in text.chars().take(MAX_MESSAGE_LENGTH).enumerate() {
            grid[index / BOARD_COLUMNS][index % BOARD_COLUMNS] = code_for(c).unwrap_or(BLANK);
        }
    }

    grid
}

/// Render a grid back into text, one line per row.
pub fn text_from_layout(grid: &[Vec<u8>]) -> String {
    grid.iter()
        .map(|row| row.iter().map(|code| char_for(*code)).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Suggested stand-in for a character the board cannot show.
pub fn suggested_replacement(c: char) -> Option<char> {
    REPLACEMENTS
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
}

/// Replace unsupported characters with stand-ins, dropping those with none.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter_map(|c| {
            if is_supported(c) {
                Some(c)
            } else {
                suggested_replacement(c)
            }
        })
        .collect()
}
