//! Compound files read back through the storage trait.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::thread;

use pilum::error::PilumError;
use pilum::storage::{Storage, StorageInput, StorageOutput};
use pilum::storage::compound::{CompoundFileReader, CompoundFileWriter};
use pilum::storage::data::DataInput;
use pilum::storage::file::{FileStorage, FileStorageConfig};
use pilum::storage::memory::MemoryStorage;

fn write_file(storage: &dyn Storage, name: &str, data: &[u8]) {
    let mut out = storage.create_output(name).unwrap();
    out.write_all(data).unwrap();
    out.close().unwrap();
}

fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add((i % 251) as u8)).collect()
}

fn pack(storage: &Arc<dyn Storage>, files: &[(&str, Vec<u8>)]) {
    for (name, data) in files {
        write_file(storage.as_ref(), name, data);
    }
    let mut writer = CompoundFileWriter::new(Arc::clone(storage), "_1.cfs");
    for (name, _) in files {
        writer.add_file(name).unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn test_directory_layout_on_disk() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    let files = vec![("_1.fdt", b"abc".to_vec()), ("_1.tis", b"wxyz".to_vec())];
    pack(&storage, &files);

    let mut raw = Vec::new();
    storage.open_input("_1.cfs").unwrap().read_to_end(&mut raw).unwrap();
    let header = 1 + 2 * (8 + 1 + 6);
    assert_eq!(raw.len(), header + 7);

    let mut cursor = Cursor::new(&raw);
    assert_eq!(cursor.read_vint().unwrap(), 2);
    assert_eq!(cursor.read_long().unwrap(), header as i64);
    assert_eq!(cursor.read_string().unwrap(), "_1.fdt");
    assert_eq!(cursor.read_long().unwrap(), header as i64 + 3);
    assert_eq!(cursor.read_string().unwrap(), "_1.tis");
    assert_eq!(&raw[header..], b"abcwxyz");
}

#[test]
fn test_file_storage_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::new(dir.path(), FileStorageConfig::new(dir.path())).unwrap());
    let files = vec![
        ("_1.fnm", pattern(1, 17)),
        ("_1.frq", pattern(2, 5000)),
        ("_1.prx", pattern(3, 1)),
    ];
    pack(&storage, &files);

    let cfs = CompoundFileReader::open(Arc::clone(&storage), "_1.cfs").unwrap();
    assert!(cfs.file_exists("_1.frq"));
    assert!(!cfs.file_exists("_1.tii"));
    for (name, data) in &files {
        let mut input = cfs.open_input(name).unwrap();
        assert_eq!(input.size().unwrap(), data.len() as u64);
        let mut read = Vec::new();
        input.read_to_end(&mut read).unwrap();
        assert_eq!(&read, data);
    }
    assert!(matches!(cfs.open_input("_1.tii"), Err(PilumError::NotFound(_))));
}

#[test]
fn test_concurrent_sub_file_readers() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    let files: Vec<(String, Vec<u8>)> = (0..4u8)
        .map(|i| (format!("_1.f{i}"), pattern(i * 40, 2000 + i as usize * 300)))
        .collect();
    let borrowed: Vec<(&str, Vec<u8>)> = files.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
    pack(&storage, &borrowed);

    let cfs = Arc::new(CompoundFileReader::open_with_buffer(Arc::clone(&storage), "_1.cfs", 13).unwrap());
    let handles: Vec<_> = files
        .into_iter()
        .map(|(name, data)| {
            let cfs = Arc::clone(&cfs);
            thread::spawn(move || {
                for round in 0..20 {
                    let mut input = cfs.open_input(&name).unwrap();
                    let start = (round * 97) % data.len();
                    input.seek(SeekFrom::Start(start as u64)).unwrap();
                    let mut tail = Vec::new();
                    input.read_to_end(&mut tail).unwrap();
                    assert_eq!(tail, data[start..]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_reads_stop_at_sub_file_end() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    pack(&storage, &[("_1.a", b"12345".to_vec()), ("_1.b", b"67890".to_vec())]);
    let cfs = CompoundFileReader::open(storage, "_1.cfs").unwrap();

    let mut input = cfs.open_input("_1.a").unwrap();
    let mut buf = [0u8; 6];
    let err: PilumError = input.read_exact(&mut buf).unwrap_err().into();
    assert!(matches!(err, PilumError::OutOfBoundsRead { position: 0, len: 6, length: 5 }));

    // A vint crossing the sub-file end is rejected the same way.
    let mut input = cfs.open_input("_1.a").unwrap();
    input.seek(SeekFrom::Start(5)).unwrap();
    assert!(input.read_vint().unwrap_err().is_out_of_bounds());

    // A plain file has no sub-file bound to cross.
    let plain: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
    write_file(plain.as_ref(), "_1.a", b"12345");
    let err: PilumError = plain.open_input("_1.a").unwrap().read_exact(&mut buf).unwrap_err().into();
    assert!(matches!(err, PilumError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    assert!(!err.is_out_of_bounds());

    let mut input = cfs.open_input("_1.a").unwrap();
    input.seek(SeekFrom::Start(3)).unwrap();
    let mut rest = Vec::new();
    input.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"45");
}
