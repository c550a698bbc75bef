//! Names of the files making up an index.
//!
//! Segment names are `_` followed by a base-36 counter, commit files are
//! `segments_<base-36 generation>` and deletion files carry their own
//! generation: `_<segment>_<base-36 generation>.del`.

/// Prefix of commit files.
pub const SEGMENTS: &str = "segments";

/// Name of the single-writer lock.
pub const WRITE_LOCK: &str = "write.lock";

/// Field infos.
pub const FIELD_INFOS_EXTENSION: &str = "fnm";
/// Stored field pointers.
pub const FIELDS_INDEX_EXTENSION: &str = "fdx";
/// Stored field values.
pub const FIELDS_EXTENSION: &str = "fdt";
/// Term dictionary.
pub const TERMS_EXTENSION: &str = "tis";
/// Postings.
pub const FREQ_EXTENSION: &str = "frq";
/// Norms.
pub const NORMS_EXTENSION: &str = "nrm";
/// Compound file.
pub const COMPOUND_EXTENSION: &str = "cfs";
/// Deleted documents.
pub const DELETES_EXTENSION: &str = "del";

/// Per-segment files that are packed into a compound file, in packing order.
pub const COMPOUND_EXTENSIONS: [&str; 6] = [
    FIELD_INFOS_EXTENSION,
    FIELDS_INDEX_EXTENSION,
    FIELDS_EXTENSION,
    TERMS_EXTENSION,
    FREQ_EXTENSION,
    NORMS_EXTENSION,
];

const RADIX: u64 = 36;

/// Format `value` in base 36 with lowercase digits.
pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % RADIX) as u32;
        digits.push(char::from_digit(digit, RADIX as u32).unwrap_or('0'));
        value /= RADIX;
    }
    digits.iter().rev().collect()
}

/// Parse a base-36 number.
pub fn parse_base36(text: &str) -> Option<u64> {
    if text.is_empty() {
        return None;
    }
    u64::from_str_radix(text, RADIX as u32).ok()
}

/// Name of segment number `counter`.
pub fn segment_name(counter: u64) -> String {
    format!("_{}", to_base36(counter))
}

/// `segment.extension`.
pub fn segment_file_name(segment: &str, extension: &str) -> String {
    format!("{segment}.{extension}")
}

/// Commit file of `generation`.
pub fn segments_file_name(generation: u64) -> String {
    format!("{SEGMENTS}_{}", to_base36(generation))
}

/// Deletion file of `segment` at `generation`.
pub fn deletes_file_name(segment: &str, generation: u64) -> String {
    format!("{segment}_{}.{DELETES_EXTENSION}", to_base36(generation))
}

/// Generation of a commit file name, if it is one.
pub fn generation_from_segments_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENTS)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(parse_base36)
}

/// Highest commit generation among `files`.
pub fn latest_generation<'a, I>(files: I) -> Option<u64>
where
    I: IntoIterator<Item = &'a String>,
{
    files
        .into_iter()
        .filter_map(|name| generation_from_segments_file_name(name))
        .max()
}

/// Whether `name` looks like a file this library writes into an index.
pub fn is_index_file(name: &str) -> bool {
    if generation_from_segments_file_name(name).is_some() {
        return true;
    }
    if !name.starts_with('_') {
        return false;
    }
    match name.rsplit_once('.') {
        Some((_, extension)) => {
            COMPOUND_EXTENSIONS.contains(&extension)
                || extension == COMPOUND_EXTENSION
                || extension == DELETES_EXTENSION
        }
        None => false,
    }
}
