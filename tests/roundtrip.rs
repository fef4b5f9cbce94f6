use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use runpack::{
    ArchiveOptions, CompressionMethod, ExtractOptions, LocalFileReader, PackError, ZipExtractor,
    ZipWriter, create_archive, delete_path, extract_archive,
};

/// Relative path (with `/`) to content, for every file beneath `root`.
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap();
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                out.insert(key, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn build_tree(root: &Path) {
    fs::create_dir_all(root.join("docs/2024/q1")).unwrap();
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::write(root.join("readme.md"), b"# readme\n").unwrap();
    fs::write(root.join("docs/notes.txt"), b"notes ".repeat(2000)).unwrap();
    fs::write(root.join("docs/2024/q1/report.csv"), b"a,b,c\n1,2,3\n").unwrap();
    fs::write(root.join("bin/empty.dat"), b"").unwrap();
    let noise: Vec<u8> = (0..30_000u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
    fs::write(root.join("bin/noise.bin"), noise).unwrap();
}

#[test]
fn tree_survives_round_trip_in_both_methods() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    build_tree(&source);

    for (i, method) in [CompressionMethod::Deflate, CompressionMethod::Stored]
        .into_iter()
        .enumerate()
    {
        let archive = dir.path().join(format!("tree{i}.zip"));
        let dest = dir.path().join(format!("dest{i}"));

        let options = ArchiveOptions::default().compression(method).buffer_size(97);
        let created = create_archive(&source, &archive, &options).unwrap();
        let extracted = extract_archive(&archive, &dest, &ExtractOptions { buffer_size: 13 }).unwrap();

        assert_eq!(created.files, 5);
        assert_eq!(extracted.files, 5);
        assert_eq!(created.bytes, extracted.bytes);
        assert_eq!(snapshot(&dest), snapshot(&source));
    }
}

#[test]
fn keep_folder_adds_exactly_one_level() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("project");
    build_tree(&source);

    let flat = dir.path().join("flat.zip");
    let nested = dir.path().join("nested.zip");
    create_archive(&source, &flat, &ArchiveOptions::default()).unwrap();
    create_archive(&source, &nested, &ArchiveOptions::default().keep_folder(true)).unwrap();

    let flat_dest = dir.path().join("flat");
    let nested_dest = dir.path().join("nested");
    extract_archive(&flat, &flat_dest, &ExtractOptions::default()).unwrap();
    extract_archive(&nested, &nested_dest, &ExtractOptions::default()).unwrap();

    let top: Vec<_> = fs::read_dir(&nested_dest)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(top, ["project"]);
    assert_eq!(snapshot(&nested_dest.join("project")), snapshot(&flat_dest));
}

#[test]
fn concrete_two_file_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), b"abc").unwrap();
    fs::write(root.join("sub/b.txt"), b"hello").unwrap();

    let archive = dir.path().join("out.zip");
    create_archive(&root, &archive, &ArchiveOptions::default()).unwrap();

    let extractor = ZipExtractor::new(LocalFileReader::new(&archive).unwrap());
    let mut entries: Vec<_> = extractor
        .list_files()
        .unwrap()
        .into_iter()
        .map(|e| (e.file_name, e.uncompressed_size))
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        [("a.txt".to_string(), 3), ("sub/b.txt".to_string(), 5)]
    );

    let dest = dir.path().join("dest");
    extract_archive(&archive, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"abc");
    assert_eq!(fs::read(dest.join("sub/b.txt")).unwrap(), b"hello");
}

#[test]
fn single_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("photo.raw");
    let content: Vec<u8> = (0..12_345u32).map(|i| (i % 256) as u8).collect();
    fs::write(&file, &content).unwrap();

    let archive = dir.path().join("photo.zip");
    create_archive(&file, &archive, &ArchiveOptions::default()).unwrap();

    let dest = dir.path().join("dest");
    let stats = extract_archive(&archive, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(snapshot(&dest).into_iter().collect::<Vec<_>>(), [("photo.raw".to_string(), content)]);
}

#[test]
fn existing_target_is_replaced_not_merged() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    fs::write(first.join("old.txt"), b"old").unwrap();
    fs::write(second.join("new.txt"), b"new").unwrap();

    let archive = dir.path().join("out.zip");
    fs::write(&archive, b"not even a zip").unwrap();
    create_archive(&first, &archive, &ArchiveOptions::default()).unwrap();
    create_archive(&second, &archive, &ArchiveOptions::default()).unwrap();

    let dest = dir.path().join("dest");
    extract_archive(&archive, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(snapshot(&dest).into_keys().collect::<Vec<_>>(), ["new.txt"]);
}

#[test]
fn re_extraction_overwrites_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("src");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("f.txt"), b"v1").unwrap();

    let archive = dir.path().join("a.zip");
    let dest = dir.path().join("dest");
    create_archive(&source, &archive, &ArchiveOptions::default()).unwrap();
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("f.txt"), b"locally edited and longer").unwrap();

    extract_archive(&archive, &dest, &ExtractOptions::default()).unwrap();
    assert_eq!(fs::read(dest.join("f.txt")).unwrap(), b"v1");
}

#[test]
fn path_escape_entries_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("evil.zip");

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("fine.txt", 2, CompressionMethod::Stored, None)
        .unwrap();
    writer.write_all(b"ok").unwrap();
    writer
        .start_file("../escaped.txt", 4, CompressionMethod::Stored, None)
        .unwrap();
    writer.write_all(b"evil").unwrap();
    fs::write(&archive, writer.finish().unwrap().into_inner()).unwrap();

    let dest = dir.path().join("inner").join("dest");
    let err = extract_archive(&archive, &dest, &ExtractOptions::default()).unwrap_err();
    assert!(matches!(err, PackError::UnsafeEntryPath(ref name) if name == "../escaped.txt"));
    assert!(!dir.path().join("inner").join("escaped.txt").exists());
    assert_eq!(fs::read(dest.join("fine.txt")).unwrap(), b"ok");
}

#[test]
fn truncated_archive_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("src");
    build_tree(&source);

    let archive = dir.path().join("a.zip");
    create_archive(&source, &archive, &ArchiveOptions::default()).unwrap();
    let bytes = fs::read(&archive).unwrap();
    fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();

    let err = extract_archive(&archive, &dir.path().join("dest"), &ExtractOptions::default())
        .unwrap_err();
    assert!(matches!(err, PackError::InvalidArchive(_)));
}

#[test]
fn deleting_twice_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("src");
    build_tree(&source);

    assert!(delete_path(&source).unwrap());
    assert!(!delete_path(&source).unwrap());
    assert!(!delete_path(&source).unwrap());
}
