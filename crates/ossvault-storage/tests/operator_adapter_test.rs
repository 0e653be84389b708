//! Integration test: the OpenDAL adapter's contract over in-memory storage

use std::time::Duration;

use bytes::Bytes;
use opendal::Operator;
use ossvault_core::{ByteSource, StreamStat, Visibility};
use ossvault_storage::{OperatorAdapter, StorageAdapter, StorageAttributes, StorageError, WriteOptions};

fn memory_adapter() -> OperatorAdapter {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    OperatorAdapter::new(op)
}

#[tokio::test]
async fn metadata_reports_size_and_default_visibility() {
    let adapter = memory_adapter().with_default_visibility(Visibility::Public);
    let opts = WriteOptions::default().content_type("text/plain");
    adapter
        .write("notes/today.txt", Bytes::from_static(b"buy milk"), &opts)
        .await
        .unwrap();

    let meta = adapter.metadata("notes/today.txt").await.unwrap();
    assert_eq!(meta.path, "notes/today.txt");
    assert_eq!(meta.file_size, Some(8));
    assert_eq!(meta.visibility, Some(Visibility::Public));

    let vis = adapter.visibility("notes/today.txt").await.unwrap();
    assert_eq!(vis.visibility, Some(Visibility::Public));
    assert_eq!(vis.file_size, None);
}

#[tokio::test]
async fn missing_object_errors_name_the_operation() {
    let adapter = memory_adapter();

    let err = adapter.read("nope.bin").await.unwrap_err();
    assert!(matches!(err, StorageError::UnableToReadFile { ref location, .. } if location == "nope.bin"));

    let err = adapter.file_size("nope.bin").await.unwrap_err();
    assert!(matches!(err, StorageError::UnableToRetrieveMetadata { kind: "file size", .. }));

    assert!(adapter.read_stream("nope.bin").await.is_err());
}

#[tokio::test]
async fn shallow_listing_shows_files_and_directories() {
    let adapter = memory_adapter();
    let opts = WriteOptions::default();
    adapter.write("top.txt", Bytes::from_static(b"1"), &opts).await.unwrap();
    adapter.write("sub/inner.txt", Bytes::from_static(b"2"), &opts).await.unwrap();

    let listed = adapter.list_contents("", false).await.unwrap();
    assert!(listed
        .iter()
        .any(|e| matches!(e, StorageAttributes::File(f) if f.path == "top.txt")));
    assert!(listed
        .iter()
        .any(|e| matches!(e, StorageAttributes::Directory(d) if d.path == "sub")));
    assert!(!listed.iter().any(|e| e.path() == "sub/inner.txt"));
}

#[tokio::test]
async fn delete_directory_removes_everything_below() {
    let adapter = memory_adapter();
    let opts = WriteOptions::default();
    adapter.write("tmp/a", Bytes::from_static(b"a"), &opts).await.unwrap();
    adapter.write("tmp/deep/b", Bytes::from_static(b"b"), &opts).await.unwrap();
    adapter.write("keep", Bytes::from_static(b"k"), &opts).await.unwrap();

    adapter.delete_directory("tmp").await.unwrap();

    assert!(!adapter.file_exists("tmp/a").await.unwrap());
    assert!(!adapter.file_exists("tmp/deep/b").await.unwrap());
    assert!(adapter.file_exists("keep").await.unwrap());
}

#[tokio::test]
async fn write_stream_uploads_in_parts() {
    let adapter = memory_adapter();
    let data = Bytes::from(vec![5u8; 100_000]);
    let stat = StreamStat::with_size(data.len() as u64).content_type("application/octet-stream");
    let source = ByteSource::new(std::io::Cursor::new(data.clone()), stat);

    adapter
        .write_stream("blob", source, &WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(adapter.read("blob").await.unwrap(), data);
    assert_eq!(adapter.file_size("blob").await.unwrap().file_size, Some(100_000));
}

#[tokio::test]
async fn presigning_needs_a_signing_backend() {
    let adapter = memory_adapter();
    adapter
        .write("x", Bytes::from_static(b"x"), &WriteOptions::default())
        .await
        .unwrap();

    let err = adapter
        .temporary_url("x", Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnableToGenerateUrl { .. }));
}
