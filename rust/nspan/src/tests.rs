use nspan_vmem::vmem;

use crate::{AllocOptions, ErrorKind, NativeAllocator, Protection};

fn assert_disposed(err: crate::Error) {
    assert!(
        matches!(err.kind(), ErrorKind::Disposed { .. }),
        "expected disposed error, got {:?}",
        err.kind()
    );
}

#[test]
fn test_default_capacity_is_one_page_of_elements() {
    let page_size = vmem::get_page_size();

    let bytes = NativeAllocator::<u8>::new().expect("allocate");
    assert_eq!(bytes.capacity(), page_size);
    assert_eq!(bytes.element_size(), 1);
    assert_eq!(bytes.protection().expect("protection"), Protection::READ_WRITE);

    let words = NativeAllocator::<u32>::new().expect("allocate");
    assert_eq!(words.capacity(), page_size / 4);
    assert_eq!(words.element_size(), 4);
}

#[test]
fn test_zero_capacity_still_commits_one_page() {
    let a = NativeAllocator::<u8>::with_capacity(0).expect("allocate");
    assert_eq!(a.capacity(), 0);
    assert_eq!(a.byte_len(), 0);

    let view = a.view().expect("view");
    assert!(view.is_empty());
    let err = view.get(0).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::OutOfBounds { index: 0, len: 0 }
    ));
}

#[test]
fn test_new_region_is_zero_filled() {
    let a = NativeAllocator::<u8>::with_capacity(4096).expect("allocate");
    let view = a.view().expect("view");
    for i in 0..view.len() {
        assert_eq!(view.get(i).expect("get"), 0);
    }
}

#[test]
fn test_view_bounds_enforcement() {
    let capacity = 100;
    let a = NativeAllocator::<u8>::with_capacity(capacity).expect("allocate");
    let view = a.view().expect("view");
    assert_eq!(view.len(), capacity);

    for i in 0..capacity {
        view.set(i, i as u8).expect("in-bounds write");
    }
    let err = view.set(capacity, 0).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::OutOfBounds { index, len } if *index == capacity && *len == capacity
    ));
    let err = view.get(capacity).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::OutOfBounds { .. }));
}

#[test]
fn test_modulo_pattern_scenario() {
    // Capacity 1024, default flags; write i mod 256 into every index.
    let a = NativeAllocator::<u8>::with_capacity(1024).expect("allocate");
    let view = a.view().expect("view");
    for i in 0..1024 {
        view.set(i, (i % 256) as u8).expect("write");
    }

    let view = a.view().expect("fresh view");
    assert_eq!(view.get(0).expect("get"), 0);
    assert_eq!(view.get(500).expect("get"), 244);
    assert_eq!(view.get(1023).expect("get"), 255);
}

#[test]
fn test_round_trip_across_discarded_views() {
    let capacity = 2048;
    let a = NativeAllocator::<u8>::with_capacity(capacity).expect("allocate");

    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let pattern: Vec<u8> = (0..capacity).map(|_| rng.u8(..)).collect();
    {
        let view = a.view().expect("view");
        view.copy_from_slice(0, &pattern).expect("bulk write");
    }

    // The view is gone; an arbitrary interval passes; a fresh view over the
    // same allocator observes identical bytes.
    std::thread::sleep(std::time::Duration::from_millis(20));
    let view = a.view().expect("fresh view");
    for (i, &expected) in pattern.iter().enumerate() {
        assert_eq!(view.get(i).expect("get"), expected);
    }
}

#[test]
fn test_typed_element_access() {
    let a = NativeAllocator::<u32>::with_capacity(256).expect("allocate");
    let view = a.view().expect("view");
    view.set(0, 0x1234_5678).expect("write");
    view.set(255, 0xABCD_EF00).expect("write");
    assert!(view.set(256, 0).is_err());

    assert_eq!(view.get(0).expect("get"), 0x1234_5678);
    assert_eq!(view.get(255).expect("get"), 0xABCD_EF00);
    assert_eq!(view.get(1).expect("get"), 0);
}

#[test]
fn test_copy_from_slice_bounds() {
    let a = NativeAllocator::<u8>::with_capacity(16).expect("allocate");
    let view = a.view().expect("view");

    view.copy_from_slice(8, &[1, 2, 3, 4, 5, 6, 7, 8]).expect("fits exactly");
    assert_eq!(view.get(8).expect("get"), 1);
    assert_eq!(view.get(15).expect("get"), 8);

    let err = view.copy_from_slice(9, &[0; 8]).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::OutOfBounds { .. }));
    // Nothing was written by the failed copy.
    assert_eq!(view.get(9).expect("get"), 2);
}

#[test]
fn test_dispose_is_idempotent() {
    let mut a = NativeAllocator::<u8>::with_capacity(64).expect("allocate");
    assert!(!a.is_disposed());
    for _ in 0..5 {
        a.dispose();
        assert!(a.is_disposed());
    }
}

#[test]
fn test_operations_fail_after_dispose() {
    let mut a = NativeAllocator::<u8>::with_capacity(64).expect("allocate");
    a.dispose();

    assert_disposed(a.view().unwrap_err());
    assert_disposed(a.pin().unwrap_err());
    assert_disposed(a.protection().unwrap_err());
    assert_disposed(a.reprotect(Protection::READ).unwrap_err());
    assert_disposed(a.transfer(Protection::READ).unwrap_err());

    // Metadata stays readable.
    assert_eq!(a.capacity(), 64);
    assert_eq!(a.element_size(), 1);
}

#[test]
fn test_reprotect_in_place_preserves_bytes() {
    let mut a = NativeAllocator::<u8>::with_capacity(128).expect("allocate");
    let view = a.view().expect("view");
    for i in 0..128 {
        view.set(i, (i * 3) as u8).expect("write");
    }
    drop(view);

    assert!(a.reprotect(Protection::READ).expect("reprotect"));
    assert_eq!(a.protection().expect("protection"), Protection::READ);

    let view = a.view().expect("view under read-only");
    assert_eq!(view.get(64).expect("get"), 192);

    assert!(a.reprotect(Protection::READ_WRITE).expect("reprotect"));
    a.view().expect("view").set(64, 7).expect("write again");
    assert_eq!(a.view().expect("view").get(64).expect("get"), 7);
}

#[test]
fn test_read_only_construction_permits_reads() {
    let a = NativeAllocator::<u8>::with_capacity_and_protection(64, Protection::READ)
        .expect("allocate read-only");
    assert_eq!(a.protection().expect("protection"), Protection::READ);
    // Zero-filled before the narrowing was applied.
    assert_eq!(a.view().expect("view").get(63).expect("get"), 0);
}

#[test]
fn test_transfer_moves_ownership_and_disposes_donor() {
    let mut a = NativeAllocator::<u8>::with_capacity(256).expect("allocate");
    let view = a.view().expect("view");
    for i in 0..256 {
        view.set(i, (255 - i) as u8).expect("write");
    }
    drop(view);
    let donor_base = a.view().expect("view").as_ptr();

    let b = a.transfer(Protection::READ).expect("transfer");

    // The donor is disposed without the region having been released.
    assert!(a.is_disposed());
    assert_disposed(a.view().unwrap_err());
    assert_disposed(a.transfer(Protection::READ_WRITE).unwrap_err());

    // The new owner sees the same region: same base, same capacity, same
    // bytes, new protection.
    assert_eq!(b.capacity(), 256);
    assert_eq!(b.protection().expect("protection"), Protection::READ);
    let view = b.view().expect("view");
    assert_eq!(view.as_ptr(), donor_base);
    for i in 0..256 {
        assert_eq!(view.get(i).expect("get"), (255 - i) as u8);
    }
    drop(view);

    // Disposing the donor again must not corrupt or release B's memory.
    a.dispose();
    a.dispose();
    assert_eq!(b.view().expect("view").get(0).expect("get"), 255);
}

#[test]
fn test_transfer_chain() {
    // Write under read-write, seal read-only, reopen read-write.
    let mut a = NativeAllocator::<u32>::with_capacity(8).expect("allocate");
    a.view().expect("view").set(3, 99).expect("write");

    let mut sealed = a.transfer(Protection::READ).expect("seal");
    assert!(a.is_disposed());
    assert_eq!(sealed.view().expect("view").get(3).expect("get"), 99);

    let reopened = sealed.transfer(Protection::READ_WRITE).expect("reopen");
    assert!(sealed.is_disposed());
    reopened.view().expect("view").set(3, 100).expect("write");
    assert_eq!(reopened.view().expect("view").get(3).expect("get"), 100);
}

#[test]
fn test_pin_scope_bookkeeping() {
    let a = NativeAllocator::<u8>::with_capacity(16).expect("allocate");
    assert_eq!(a.pin_count(), 0);

    let base = a.view().expect("view").as_ptr();
    {
        let _outer = a.pin().expect("pin");
        assert_eq!(a.pin_count(), 1);
        {
            let _inner = a.pin().expect("nested pin");
            assert_eq!(a.pin_count(), 2);
            // The address is stable for the duration of the scope.
            assert_eq!(a.view().expect("view").as_ptr(), base);
        }
        assert_eq!(a.pin_count(), 1);
    }
    assert_eq!(a.pin_count(), 0);
}

#[test]
fn test_pin_fails_after_dispose() {
    let mut a = NativeAllocator::<u8>::with_capacity(16).expect("allocate");
    a.dispose();
    assert_disposed(a.pin().unwrap_err());
    assert_eq!(a.pin_count(), 0);
}

#[test]
fn test_large_page_option_falls_back() {
    // Large pages may or may not be configured; the fallback keeps the
    // construction working either way.
    let a = NativeAllocator::<u64>::with_options(
        AllocOptions::new().capacity(512).large_pages(true),
    )
    .expect("allocate");
    assert_eq!(a.capacity(), 512);
    let view = a.view().expect("view");
    view.set(511, u64::MAX).expect("write");
    assert_eq!(view.get(511).expect("get"), u64::MAX);
}

#[test]
fn test_region_acquire_rounds_and_zeroes() {
    let page_size = vmem::get_page_size();
    let region = crate::Region::acquire(100, Protection::READ_WRITE).expect("acquire");

    assert!(!region.ptr().is_null());
    assert_eq!(region.len(), 100);
    assert!(!region.is_empty());
    assert_eq!(region.capacity(), page_size);
    assert_eq!(region.alignment(), page_size);
    assert!(!region.uses_large_pages());
    assert_eq!(region.protection(), Protection::READ_WRITE);

    let bytes = unsafe { std::slice::from_raw_parts(region.ptr(), region.capacity()) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn test_region_release_is_idempotent() {
    let mut region = crate::Region::acquire(64, Protection::READ_WRITE).expect("acquire");
    region.release();
    assert!(region.ptr().is_null());
    region.release();
    region.release();
}

#[test]
fn test_region_reprotect_updates_recorded_protection() {
    let mut region = crate::Region::acquire(64, Protection::READ_WRITE).expect("acquire");
    assert!(region.reprotect(Protection::READ));
    assert_eq!(region.protection(), Protection::READ);
    assert!(region.reprotect(Protection::READ_WRITE));
    assert_eq!(region.protection(), Protection::READ_WRITE);
}

#[test]
fn test_allocator_debug_output() {
    let a = NativeAllocator::<u16>::with_capacity(10).expect("allocate");
    let debug = format!("{a:?}");
    assert!(debug.contains("NativeAllocator"));
    assert!(debug.contains("capacity"));
}

// Executing region bytes requires real hardware protection (not the
// emulated fallback) and a coherent instruction cache, so this scenario is
// limited to x86_64 on the platforms with a native backend.
#[cfg(all(target_arch = "x86_64", any(target_os = "linux", windows)))]
#[test]
fn test_execute_only_region_runs_patched_code() {
    // mov eax, 2; ret
    const RETURN_TWO: [u8; 6] = [0xB8, 0x02, 0x00, 0x00, 0x00, 0xC3];

    let mut a = NativeAllocator::<u8>::with_capacity_and_protection(
        RETURN_TWO.len(),
        Protection::EXECUTE,
    )
    .expect("allocate execute-only");

    // Open a temporary read-write window, patch the code in, close it.
    assert!(a.reprotect(Protection::READ_WRITE).expect("open window"));
    a.view()
        .expect("view")
        .copy_from_slice(0, &RETURN_TWO)
        .expect("patch code");
    assert!(a.reprotect(Protection::READ_EXECUTE).expect("close window"));

    let entry = a.view().expect("view").as_ptr();
    let f: extern "C" fn() -> i32 = unsafe { std::mem::transmute(entry) };
    assert_eq!(f(), 2);
}
