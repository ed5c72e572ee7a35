use std::fmt;

/// Parse a human-friendly memory size such as `"512"`, `"1.5G"` or
/// `"64 KiB"` into a number of bytes.
///
/// # Grammar
///
/// ```text
/// size       = separators? number separators? [ unit ] separators? ;
/// number     = digits [ "." digits ] ;
/// digits     = digit , { digit } ;
/// unit       = "b" | "k" | "kb" | "kib" | "m" | "mb" | "mib" | "g" | "gb" | "gib" ;
/// separators = { whitespace | "_" } ;
/// ```
///
/// Units are case-insensitive and always binary: `K`, `KB` and `KiB` all mean
/// 1024 bytes. A bare number is read as mebibytes. Fractional results are
/// rounded down to whole bytes; sizes that round to zero are rejected.
pub fn parse_byte_size(value: &str) -> Result<u64, ByteSizeParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ByteSizeParseError::Empty);
    }

    if let Some((offset, ch)) = trimmed.char_indices().find(|(_, c)| !c.is_ascii()) {
        return Err(ByteSizeParseError::UnexpectedChar {
            index: offset,
            found: ch,
        });
    }

    let bytes = trimmed.as_bytes();
    let mut index = 0usize;
    skip_separators(bytes, &mut index);

    let (mantissa, scale, number_len) = parse_number(bytes, index)?;
    index += number_len;
    skip_separators(bytes, &mut index);

    let unit = if index < bytes.len() {
        let (unit, unit_len) = parse_unit(trimmed, bytes, index)?;
        index += unit_len;
        unit
    } else {
        Unit::Mebibyte
    };

    skip_separators(bytes, &mut index);
    if index < bytes.len() {
        return Err(ByteSizeParseError::UnexpectedChar {
            index,
            found: bytes[index] as char,
        });
    }

    let divisor = 10u128
        .checked_pow(scale)
        .ok_or(ByteSizeParseError::Overflow)?;
    let total = mantissa
        .checked_mul(unit.bytes())
        .ok_or(ByteSizeParseError::Overflow)?
        / divisor;

    if total == 0 {
        return Err(ByteSizeParseError::Zero);
    }

    u64::try_from(total).map_err(|_| ByteSizeParseError::TooLarge)
}

fn parse_number(bytes: &[u8], mut index: usize) -> Result<(u128, u32, usize), ByteSizeParseError> {
    if index >= bytes.len() {
        return Err(ByteSizeParseError::ExpectedNumber { index, found: None });
    }

    if !bytes[index].is_ascii_digit() {
        return Err(ByteSizeParseError::ExpectedNumber {
            index,
            found: Some(bytes[index] as char),
        });
    }

    let mut mantissa: u128 = 0;
    let mut scale: u32 = 0;
    let mut decimal_index = None;
    let mut consumed = 0usize;

    while index < bytes.len() {
        let byte = bytes[index];
        match byte {
            b'0'..=b'9' => {
                mantissa = mantissa
                    .checked_mul(10)
                    .and_then(|m| m.checked_add(u128::from(byte - b'0')))
                    .ok_or(ByteSizeParseError::Overflow)?;
                if decimal_index.is_some() {
                    scale += 1;
                }
            }
            b'.' if decimal_index.is_none() => decimal_index = Some(index),
            b'.' => return Err(ByteSizeParseError::UnexpectedChar { index, found: '.' }),
            _ => break,
        }
        index += 1;
        consumed += 1;
    }

    if let Some(dot_index) = decimal_index {
        if scale == 0 {
            return Err(ByteSizeParseError::MissingFractionDigits { index: dot_index });
        }
    }

    Ok((mantissa, scale, consumed))
}

fn parse_unit(
    text: &str,
    bytes: &[u8],
    index: usize,
) -> Result<(Unit, usize), ByteSizeParseError> {
    let mut end = index;
    while end < bytes.len() && bytes[end].is_ascii_alphabetic() {
        end += 1;
    }

    if end == index {
        return Err(ByteSizeParseError::UnexpectedChar {
            index,
            found: bytes[index] as char,
        });
    }

    let word = &text[index..end];
    let unit = match word.to_ascii_lowercase().as_str() {
        "b" => Unit::Byte,
        "k" | "kb" | "kib" => Unit::Kibibyte,
        "m" | "mb" | "mib" => Unit::Mebibyte,
        "g" | "gb" | "gib" => Unit::Gibibyte,
        _ => {
            return Err(ByteSizeParseError::UnknownUnit {
                index,
                found: word.to_string(),
            })
        }
    };

    Ok((unit, end - index))
}

fn skip_separators(bytes: &[u8], index: &mut usize) {
    while *index < bytes.len() {
        match bytes[*index] {
            b'_' => *index += 1,
            b if b.is_ascii_whitespace() => *index += 1,
            _ => break,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSizeParseError {
    Empty,
    ExpectedNumber { index: usize, found: Option<char> },
    UnknownUnit { index: usize, found: String },
    MissingFractionDigits { index: usize },
    UnexpectedChar { index: usize, found: char },
    Zero,
    Overflow,
    TooLarge,
}

impl std::error::Error for ByteSizeParseError {}

impl fmt::Display for ByteSizeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSizeParseError::Empty => write!(f, "size cannot be empty"),
            ByteSizeParseError::ExpectedNumber { index, found } => match found {
                Some(ch) => write!(
                    f,
                    "expected a number at position {} but found '{}'",
                    index + 1,
                    ch
                ),
                None => write!(f, "expected a number at position {}", index + 1),
            },
            ByteSizeParseError::UnknownUnit { index, found } => write!(
                f,
                "unknown unit '{}' at position {} (expected B, K, M or G)",
                found,
                index + 1
            ),
            ByteSizeParseError::MissingFractionDigits { index } => write!(
                f,
                "expected digits after decimal point at position {}",
                index + 1
            ),
            ByteSizeParseError::UnexpectedChar { index, found } => write!(
                f,
                "unexpected character '{}' at position {}",
                found,
                index + 1
            ),
            ByteSizeParseError::Zero => write!(f, "size must be at least one byte"),
            ByteSizeParseError::Overflow => write!(f, "size is too large"),
            ByteSizeParseError::TooLarge => {
                write!(f, "size exceeds the maximum of {} bytes", u64::MAX)
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Unit {
    Byte,
    Kibibyte,
    Mebibyte,
    Gibibyte,
}

impl Unit {
    fn bytes(self) -> u128 {
        match self {
            Unit::Byte => 1,
            Unit::Kibibyte => 1 << 10,
            Unit::Mebibyte => 1 << 20,
            Unit::Gibibyte => 1 << 30,
        }
    }
}
