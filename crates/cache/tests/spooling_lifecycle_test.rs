//! Integration tests for spool file lifecycle across writers, caches and units of work

use rewind_cache::{
    CacheError, SpoolConfig, SpoolingWriter, StreamCache, StreamCachingConfigBuilder,
    StreamCachingStrategy, TempFileManager, UnitOfWorkHandle,
};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn spool_files(dir: &std::path::Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    name.starts_with("cos") && name.ends_with(".tmp")
                })
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn test_spool_file_naming_and_location() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = SpoolingWriter::new(SpoolConfig::new(temp_dir.path()).with_threshold(4));
    writer.write_all(b"0123456789").unwrap();

    let path = writer.spool_path().unwrap().to_path_buf();
    assert_eq!(path.parent().unwrap(), temp_dir.path());
    assert_eq!(spool_files(temp_dir.path()), 1);

    drop(writer);
    assert_eq!(spool_files(temp_dir.path()), 0);
}

#[test]
fn test_caches_read_concurrently_then_file_is_removed() {
    let temp_dir = TempDir::new().unwrap();
    let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 199) as u8).collect();

    let mut writer = SpoolingWriter::new(SpoolConfig::new(temp_dir.path()).with_threshold(1024));
    writer.write_all(&payload).unwrap();
    let cache = writer.into_cache().unwrap();
    assert!(!cache.in_memory());

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let mut view = cache.duplicate().unwrap();
            let barrier = barrier.clone();
            let expected = payload.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..3 {
                    let mut out = Vec::with_capacity(expected.len());
                    view.write_to(&mut out).unwrap();
                    assert_eq!(out, expected);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(spool_files(temp_dir.path()), 1);
    drop(cache);
    assert_eq!(spool_files(temp_dir.path()), 0);
}

#[test]
fn test_concurrent_release_deletes_exactly_once() {
    let temp_dir = TempDir::new().unwrap();
    let manager = TempFileManager::new();
    let path = manager
        .create_backing_file(&SpoolConfig::new(temp_dir.path()))
        .unwrap();

    let leases: Vec<_> = (0..16).map(|_| manager.register_reader().unwrap()).collect();
    let barrier = Arc::new(Barrier::new(leases.len()));

    let handles: Vec<_> = leases
        .into_iter()
        .map(|lease| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.release_reader(&lease);
                manager.release_reader(&lease);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(manager.open_readers(), 0);
    assert!(manager.is_deleted());
    assert!(!path.exists());
    assert!(matches!(
        manager.register_reader(),
        Err(CacheError::CacheExpired { .. })
    ));
}

#[test]
fn test_unit_of_work_spans_multiple_payloads() {
    let temp_dir = TempDir::new().unwrap();
    let config = StreamCachingConfigBuilder::new()
        .with_spool_directory(temp_dir.path().to_string_lossy())
        .with_spool_threshold(8)
        .build()
        .unwrap();
    let mut strategy = StreamCachingStrategy::new("uow", config).unwrap();
    strategy.start().unwrap();

    let uow = UnitOfWorkHandle::new();
    let mut caches = Vec::new();
    for i in 0..3 {
        let body = format!("payload number {i} is long enough to spool");
        caches.push(
            strategy
                .cache_for(&mut Cursor::new(body.into_bytes()), &uow)
                .unwrap(),
        );
    }

    for mut cache in caches {
        let mut text = String::new();
        cache.read_to_string(&mut text).unwrap();
        assert!(text.starts_with("payload number"));
        cache.close().unwrap();
    }

    assert_eq!(spool_files(temp_dir.path()), 3);
    assert!(uow.complete());
    assert!(!uow.complete());
    assert_eq!(spool_files(temp_dir.path()), 0);

    strategy.stop();
}

#[test]
fn test_late_duplicate_after_delete_is_expired() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = SpoolingWriter::new(SpoolConfig::new(temp_dir.path()).with_threshold(1));
    writer.write_all(b"brief").unwrap();

    let mut cache = writer.into_cache().unwrap();
    let mut sink = Vec::new();
    cache.write_to(&mut sink).unwrap();
    cache.close().unwrap();

    let err = cache.duplicate().unwrap_err();
    assert!(err.is_lifecycle_violation());
    assert!(!err.is_transient());
}
