//! Integration tests for the pool allocator
//!
//! Startup from a config file, allocation through the capability trait,
//! and the engine-facing size-free API.

use std::sync::Arc;

use void_memory::config::{self, ConfigError, MAX_BUCKETS};
use void_memory::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine_buckets() -> Vec<BucketDescription> {
    vec![
        BucketDescription::new(16, 256),
        BucketDescription::new(64, 128),
        BucketDescription::new(256, 64),
        BucketDescription::from_memory_size(4096, 64 * 1024),
    ]
}

/// Subsystems only ever see the capability, never the concrete pool
fn load_frame_data(allocator: &dyn Allocator, frame: &[u8]) -> Option<FrameData> {
    let ptr = allocator.allocate(frame.len())?;
    unsafe {
        std::ptr::copy_nonoverlapping(frame.as_ptr(), ptr.as_ptr(), frame.len());
    }
    Some(FrameData {
        ptr,
        len: frame.len(),
    })
}

struct FrameData {
    ptr: std::ptr::NonNull<u8>,
    len: usize,
}

#[test]
fn pool_from_config_file_on_stack_storage() {
    init_logging();

    let path = std::env::temp_dir().join(format!("void_memory_pool_{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[[bucket]]
block_size = 32
block_count = 64

[[bucket]]
block_size = 1024
memory_size = 16384
"#,
    )
    .unwrap();

    let config = config::load_config(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let stack: SharedAllocator = Arc::new(StackAllocator::with_capacity_kb(64));
    let pool = PoolAllocator::from_config(&config, &stack).unwrap();

    assert_eq!(pool.buckets().len(), 2);
    assert_eq!(pool.bucket(1).unwrap().block_count(), 16);
    assert_eq!(pool.memory_size_bytes(), config.total_memory_size());

    let small = pool.allocate(20).unwrap();
    let large = pool.allocate(900).unwrap();
    assert_eq!(pool.owner_of(small.as_ptr()), Some(0));
    assert_eq!(pool.owner_of(large.as_ptr()), Some(1));
    assert!(is_aligned(large.as_ptr(), config::BLOCK_ALIGNMENT));

    pool.deallocate(small.as_ptr(), 20).unwrap();
    pool.deallocate(large.as_ptr(), 900).unwrap();

    drop(pool);
    assert_eq!(stack.used(), 0);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let result = config::load_config("/nonexistent/void_memory/pool.toml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn pool_serves_subsystems_through_the_capability() {
    init_logging();

    let backing: SharedAllocator = Arc::new(SystemAllocator::new());
    let pool = PoolAllocator::with_buckets(&engine_buckets(), &backing).unwrap();

    let frame = [7u8; 200];
    let data = load_frame_data(&pool, &frame).unwrap();
    assert_eq!(pool.owner_of(data.ptr.as_ptr()), Some(2));
    assert_eq!(
        unsafe { std::slice::from_raw_parts(data.ptr.as_ptr(), data.len) },
        &frame[..]
    );

    let allocator: &dyn Allocator = &pool;
    unsafe { allocator.deallocate(data.ptr, data.len) };
    assert_eq!(pool.used_bytes(), 0);
}

#[test]
fn capability_can_be_swapped_for_a_stack() {
    let stack = StackAllocator::new(1024);
    let data = load_frame_data(&stack, b"vertex data").unwrap();
    assert_eq!(data.len, 11);
    unsafe { stack.deallocate(data.ptr, data.len) };
    assert_eq!(stack.used(), 0);
}

#[test]
fn size_free_api_models_a_native_decoder() {
    init_logging();

    let backing: SharedAllocator = Arc::new(SystemAllocator::new());
    let pool = PoolAllocator::with_buckets(&engine_buckets(), &backing).unwrap();

    // a decoder that grows its output with realloc and frees without a size
    let mut out = std::ptr::null_mut();
    let mut len = 0usize;
    for chunk in 0..10u8 {
        let grown = pool
            .reallocate_using_allocation_info(out, len + 100)
            .expect("decoder output fits the 4 KiB bucket");
        unsafe { std::ptr::write_bytes(grown.as_ptr().add(len), chunk, 100) };
        out = grown.as_ptr();
        len += 100;
    }

    let decoded = unsafe { std::slice::from_raw_parts(out, len) };
    for (chunk, bytes) in decoded.chunks(100).enumerate() {
        assert!(bytes.iter().all(|&b| b == chunk as u8));
    }
    assert_eq!(pool.allocation_size(out), Some(1000));
    assert_eq!(pool.tracked_allocations(), 1);

    assert!(pool.deallocate_using_allocation_info(out));
    assert!(!pool.deallocate_using_allocation_info(out));
    assert_eq!(pool.used_bytes(), 0);
}

#[test]
fn exhausted_pool_reports_none_until_freed() {
    let backing: SharedAllocator = Arc::new(SystemAllocator::new());
    let pool = PoolAllocator::with_buckets(&[BucketDescription::new(16, 4)], &backing).unwrap();

    let live: Vec<_> = (0..4).map(|_| pool.allocate(16).unwrap()).collect();
    assert!(pool.allocate(16).is_none());
    assert!(pool.allocate_using_allocation_info(1).is_none());

    pool.deallocate(live[3].as_ptr(), 16).unwrap();
    assert!(pool.allocate(16).is_some());
}

#[test]
fn too_many_buckets_is_rejected_up_front() {
    let backing: SharedAllocator = Arc::new(SystemAllocator::new());
    let descriptions = vec![BucketDescription::new(8, 1); MAX_BUCKETS + 1];

    let mut pool = PoolAllocator::new();
    assert!(matches!(
        pool.initialize(&descriptions, &backing),
        Err(PoolError::TooManyBuckets { .. })
    ));
    assert!(pool.buckets().is_empty());
    assert_eq!(backing.used(), 0);

    pool.initialize(&descriptions[..MAX_BUCKETS], &backing).unwrap();
    assert_eq!(pool.buckets().len(), MAX_BUCKETS);
}

#[test]
fn pool_buffer_collects_log_lines() {
    use std::io::Write;

    let backing: SharedAllocator = Arc::new(SystemAllocator::new());
    let pool = PoolAllocator::with_buckets(&engine_buckets(), &backing).unwrap();

    let mut buffer = PoolBuffer::new(&pool);
    for frame in 0..50 {
        writeln!(buffer, "frame {frame}").unwrap();
    }

    let text = std::str::from_utf8(buffer.as_slice()).unwrap();
    assert_eq!(text.lines().count(), 50);
    assert_eq!(text.lines().last(), Some("frame 49"));
    assert_eq!(pool.tracked_allocations(), 1);
}
