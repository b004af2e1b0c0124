//! Behavioural tests across writer and cache implementations

use super::*;
use crate::config::SpoolConfig;
use crate::errors::CacheError;
use crate::traits::StreamCache;
use crate::unit_of_work::UnitOfWorkHandle;
use proptest::prelude::*;
use std::io::{Read, Write};
use tempfile::TempDir;

fn write_all_chunks(writer: &mut SpoolingWriter, chunks: &[Vec<u8>]) {
    for chunk in chunks {
        writer.write_all(chunk).unwrap();
    }
}

fn drain(cache: &mut dyn StreamCache) -> Vec<u8> {
    let mut out = Vec::new();
    cache.write_to(&mut out).unwrap();
    out
}

#[test]
fn test_round_trip_memory_and_spooled() {
    let dir = TempDir::new().unwrap();
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    for threshold in [1_000_000i64, 4096] {
        let mut writer = SpoolingWriter::new(
            SpoolConfig::new(dir.path())
                .with_threshold(threshold)
                .with_buffer_size(512),
        );
        writer.drain_from(&mut payload.as_slice()).unwrap();
        let mut cache = writer.into_cache().unwrap();

        assert_eq!(cache.in_memory(), threshold > 10_000);
        assert_eq!(cache.length(), payload.len() as u64);
        assert_eq!(drain(cache.as_mut()), payload);
    }
}

#[test]
fn test_reset_is_idempotent_on_every_kind() {
    let dir = TempDir::new().unwrap();
    let mut spooled = SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(2));
    spooled.write_all(b"on disk").unwrap();

    let mut caches: Vec<Box<dyn StreamCache>> = vec![
        Box::new(ByteArrayCache::new(&b"in memory"[..])),
        Box::new(ReaderCache::new("characters")),
        spooled.into_cache().unwrap(),
    ];

    for cache in &mut caches {
        let first = drain(cache.as_mut());
        cache.reset().unwrap();
        cache.reset().unwrap();
        assert_eq!(cache.position(), 0);
        assert_eq!(drain(cache.as_mut()), first);
    }
}

#[test]
fn test_duplicates_have_independent_cursors() {
    let dir = TempDir::new().unwrap();
    let mut writer = SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(4));
    writer.write_all(b"0123456789").unwrap();
    let original = writer.into_cache().unwrap();

    let mut first = original.duplicate().unwrap();
    let mut second = original.duplicate().unwrap();

    let mut three = [0u8; 3];
    first.read_exact(&mut three).unwrap();
    assert_eq!(&three, b"012");

    let mut seven = [0u8; 7];
    second.read_exact(&mut seven).unwrap();
    assert_eq!(&seven, b"0123456");

    first.read_exact(&mut three).unwrap();
    assert_eq!(&three, b"345");
    assert_eq!(original.position(), 0);
}

#[test]
fn test_spool_file_deleted_after_last_release_in_any_order() {
    let dir = TempDir::new().unwrap();

    for release_first in [0usize, 1, 2] {
        let uow = UnitOfWorkHandle::new();
        let mut writer =
            SpoolingWriter::for_unit_of_work(SpoolConfig::new(dir.path()).with_threshold(1), &uow);
        writer.write_all(b"shared").unwrap();
        let path = writer.spool_path().unwrap().to_path_buf();

        let cache = writer.into_cache().unwrap();
        let dup = cache.duplicate().unwrap();

        let mut events: Vec<Box<dyn FnOnce()>> = vec![
            Box::new(move || drop(cache)),
            Box::new(move || drop(dup)),
            Box::new({
                let uow = uow.clone();
                move || {
                    uow.complete();
                }
            }),
        ];
        let first = events.remove(release_first);
        first();
        assert!(path.exists());

        let second = events.remove(0);
        second();
        assert!(path.exists());

        let last = events.remove(0);
        last();
        assert!(!path.exists());
    }
}

#[test]
fn test_double_close_releases_once() {
    let dir = TempDir::new().unwrap();
    let mut writer = SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(1));
    writer.write_all(b"twice").unwrap();

    let mut a = writer.as_cache().unwrap();
    let mut b = writer.as_cache().unwrap();
    let manager = writer.temp_file_manager().clone();
    writer.close().unwrap();
    writer.close().unwrap();
    assert_eq!(manager.open_readers(), 2);

    a.close().unwrap();
    a.close().unwrap();
    assert_eq!(manager.open_readers(), 1);
    assert!(!manager.is_deleted());

    assert_eq!(drain(b.as_mut()), b"twice");
    b.close().unwrap();
    assert!(manager.is_deleted());
}

#[test]
fn test_expired_cache_is_not_an_io_error() {
    let dir = TempDir::new().unwrap();
    let mut writer = SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(1));
    writer.write_all(b"short lived").unwrap();
    let mut cache = writer.into_cache().unwrap();
    let mut other = cache.duplicate().unwrap();
    other.close().unwrap();
    cache.close().unwrap();

    let err = cache.reset().unwrap_err();
    assert!(matches!(err, CacheError::CacheExpired { .. }));

    let io_err: std::io::Error = err.into();
    assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_threshold_ten_scenario() {
    let dir = TempDir::new().unwrap();
    let mut writer = SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(10));

    writer.write_all(b"abcde").unwrap();
    writer.write_all(b"fghij").unwrap();
    assert!(writer.in_memory());

    writer.write_all(b"k").unwrap();
    assert!(!writer.in_memory());

    let mut cache = writer.into_cache().unwrap();
    assert_eq!(cache.length(), 11);
    assert_eq!(drain(cache.as_mut()), b"abcdefghijk");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_round_trip_and_threshold(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16),
        threshold in 1i64..512,
    ) {
        let dir = TempDir::new().unwrap();
        let mut writer = SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(threshold));
        write_all_chunks(&mut writer, &chunks);

        let expected: Vec<u8> = chunks.concat();
        prop_assert_eq!(writer.in_memory(), expected.len() as i64 <= threshold);

        let mut cache = writer.into_cache().unwrap();
        prop_assert_eq!(cache.length(), expected.len() as u64);
        prop_assert_eq!(drain(cache.as_mut()), expected.clone());
        prop_assert_eq!(drain(cache.as_mut()), expected);
    }
}
