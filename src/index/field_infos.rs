//! Per-segment field metadata (`.fnm`).
//!
//! Field numbers are assigned in order of first appearance within a segment,
//! so the same field can have different numbers in different segments.
//!
//! ```text
//! VInt  field count
//! repeat: String name, Byte flags (0x1 indexed, 0x2 stored)
//! ```

use ahash::AHashMap;

use crate::error::{PilumError, Result};
use crate::storage::Storage;
use crate::storage::data::{DataInput, DataOutput};

const IS_INDEXED: u8 = 0x1;
const IS_STORED: u8 = 0x2;

/// Metadata of one field within a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name.
    pub name: String,
    /// Segment-local field number.
    pub number: u32,
    /// Whether any document indexed this field.
    pub indexed: bool,
    /// Whether any document stored this field.
    pub stored: bool,
}

/// The fields of one segment, addressable by name or number.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    infos: Vec<FieldInfo>,
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a field, or widen the flags of a known one. Returns its number.
    pub fn add(&mut self, name: &str, indexed: bool, stored: bool) -> u32 {
        if let Some(&number) = self.by_name.get(name) {
            let info = &mut self.infos[number as usize];
            info.indexed |= indexed;
            info.stored |= stored;
            return number;
        }
        let number = self.infos.len() as u32;
        self.infos.push(FieldInfo {
            name: name.to_string(),
            number,
            indexed,
            stored,
        });
        self.by_name.insert(name.to_string(), number);
        number
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&n| &self.infos[n as usize])
    }

    /// Look up a field by number.
    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.infos.get(number as usize)
    }

    /// Field number for `name`.
    pub fn number(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// All fields in number order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.infos.iter()
    }

    /// Indexed fields in number order.
    pub fn indexed(&self) -> impl Iterator<Item = &FieldInfo> {
        self.infos.iter().filter(|info| info.indexed)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether no field is registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Write the field infos to `name`.
    pub fn write(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut output = storage.create_output(name)?;
        output.write_vint(self.infos.len() as u32)?;
        for info in &self.infos {
            output.write_string(&info.name)?;
            let mut flags = 0u8;
            if info.indexed {
                flags |= IS_INDEXED;
            }
            if info.stored {
                flags |= IS_STORED;
            }
            output.write_byte(flags)?;
        }
        output.close()
    }

    /// Read field infos from `name`.
    pub fn read(storage: &dyn Storage, name: &str) -> Result<Self> {
        let mut input = storage.open_input(name)?;
        let count = input.read_vint()?;
        let mut infos = FieldInfos::new();
        for _ in 0..count {
            let field = input.read_string()?;
            let flags = input.read_byte()?;
            if infos.get(&field).is_some() {
                return Err(PilumError::corrupt(format!("{name}: duplicate field {field}")));
            }
            infos.add(&field, flags & IS_INDEXED != 0, flags & IS_STORED != 0);
        }
        input.close()?;
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_numbers_follow_first_appearance() {
        let mut infos = FieldInfos::new();
        assert_eq!(infos.add("title", true, true), 0);
        assert_eq!(infos.add("body", true, false), 1);
        assert_eq!(infos.add("title", false, false), 0);
        assert_eq!(infos.add("raw", false, true), 2);

        assert_eq!(infos.len(), 3);
        assert_eq!(infos.number("body"), Some(1));
        assert_eq!(
            infos.indexed().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            vec!["title", "body"]
        );
    }

    #[test]
    fn test_write_and_read() {
        let storage = MemoryStorage::new_default();
        let mut infos = FieldInfos::new();
        infos.add("id", true, true);
        infos.add("body", true, false);
        infos.add("raw", false, true);
        infos.write(&storage, "_0.fnm").unwrap();

        let read = FieldInfos::read(&storage, "_0.fnm").unwrap();
        assert_eq!(read.len(), 3);
        let body = read.get("body").unwrap();
        assert!(body.indexed && !body.stored);
        assert_eq!(read.by_number(2).unwrap().name, "raw");
    }
}
