use chrono::DateTime;
use widestring::utfstring::Utf16String;

/// Decode a fixed UTF-16LE field, stopping at the first NUL code unit.
pub fn decode_utf16le_lossy_from(bytes: &[u8]) -> String {
    let data: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    return Utf16String::from_slice_lossy(&data).to_string();
}

/// Decode a fixed, NUL padded on-disk string. Everything after the first NUL
/// is ignored and trailing blanks are trimmed.
pub fn decode_utf8_lossy_from(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

    return String::from_utf8_lossy(&bytes[..end])
        .trim_end_matches([' ', '\0'])
        .to_string();
}

pub fn is_power_2(num: u64) -> bool {
    return num != 0 && ((num & (num - 1)) == 0);
}

/// Render seconds since the Unix epoch as `YYYY-MM-DD HH:MM:SS` (UTC).
/// Zero means "never" on every format we read and yields `None`.
pub fn format_unix_time(secs: i64) -> Option<String> {
    if secs == 0 {
        return None;
    }

    let time = DateTime::from_timestamp(secs, 0)?;

    return Some(time.format("%Y-%m-%d %H:%M:%S").to_string());
}

/// LVM prints its 32 character identifiers in 6-4-4-4-4-4-6 groups.
pub fn format_lvm_uuid(raw: &[u8]) -> String {
    const GROUPS: [usize; 7] = [6, 4, 4, 4, 4, 4, 6];

    let text = decode_utf8_lossy_from(raw);
    let chars: Vec<char> = text.chars().collect();

    if chars.len() != 32 {
        return text;
    }

    let mut out = String::with_capacity(38);
    let mut pos = 0;
    for (i, len) in GROUPS.iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.extend(&chars[pos..pos + len]);
        pos += len;
    }

    return out;
}
