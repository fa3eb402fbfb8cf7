use crate::{Protection, vmem};

struct Pages {
    ptr: *mut std::ffi::c_void,
    size: usize,
    is_large: bool,
}

impl Pages {
    fn allocate_normal(size: usize) -> std::io::Result<Pages> {
        let (ptr, size) = vmem::allocate(size)?;
        Ok(Pages {
            ptr,
            size,
            is_large: false,
        })
    }

    fn allocate_large(size: usize) -> std::io::Result<Pages> {
        let (ptr, size) = vmem::allocate_large_pages(size)?;
        Ok(Pages {
            ptr,
            size,
            is_large: true,
        })
    }

    fn is_aligned(&self, alignment: usize) -> bool {
        (self.ptr as usize).is_multiple_of(alignment)
    }

    fn protect(&self, protection: Protection) -> std::io::Result<()> {
        unsafe { vmem::protect(self.ptr, self.size, protection) }
    }
}

impl Drop for Pages {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            if !self.is_large {
                unsafe {
                    vmem::free(self.ptr, self.size).expect("free");
                }
            } else {
                unsafe {
                    vmem::free_large_pages(self.ptr, self.size).expect("free_large_pages");
                }
            }
        }
    }
}

#[test]
fn test_allocate_rounds_to_page_size() {
    let page_size = vmem::get_page_size();

    let p = Pages::allocate_normal(1).unwrap();
    assert!(!p.ptr.is_null());
    assert_eq!(p.size, page_size);
    assert!(p.is_aligned(page_size));

    let p = Pages::allocate_normal(page_size * 3 + 100).unwrap();
    assert_eq!(p.size, page_size * 4);
    assert!(p.is_aligned(page_size));
}

#[test]
fn test_allocate_zero_size() {
    let p = Pages::allocate_normal(0).expect("allocate");
    assert!(!p.ptr.is_null());
    assert_eq!(
        p.size,
        vmem::get_page_size(),
        "Zero size should allocate one page"
    );
}

#[test]
fn test_allocate_exact_page_size() {
    let page_size = vmem::get_page_size();
    let p = Pages::allocate_normal(page_size).expect("allocate");
    assert_eq!(p.size, page_size);
}

#[test]
fn test_allocation_is_zero_filled() {
    let p = Pages::allocate_normal(4096).expect("allocate");
    let bytes = unsafe { std::slice::from_raw_parts(p.ptr as *const u8, p.size) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn test_protect_round_trip() {
    let p = Pages::allocate_normal(4096).expect("allocate");

    // Write while read-write, then narrow and read back.
    unsafe {
        (p.ptr as *mut u8).write(0xA5);
    }
    p.protect(Protection::READ).expect("narrow to read-only");
    let value = unsafe { (p.ptr as *const u8).read() };
    assert_eq!(value, 0xA5);

    // Widen again and write once more.
    p.protect(Protection::READ_WRITE)
        .expect("restore read-write");
    unsafe {
        (p.ptr as *mut u8).write(0x5A);
    }
    assert_eq!(unsafe { (p.ptr as *const u8).read() }, 0x5A);
}

#[test]
fn test_protect_to_no_access_and_back() {
    let p = Pages::allocate_normal(4096).expect("allocate");
    p.protect(Protection::empty()).expect("revoke all access");
    p.protect(Protection::READ_WRITE)
        .expect("restore read-write");
    assert_eq!(unsafe { (p.ptr as *const u8).read() }, 0);
}

#[test]
fn test_large_page_allocations() {
    if let Err(e) = vmem::try_enable_large_pages() {
        println!("try_enable_large_pages: {e:?}");
        return;
    }
    let Ok(pages) = Pages::allocate_large(1) else {
        println!("large pages not available, skipping");
        return;
    };
    assert!(!pages.ptr.is_null());
    assert!(pages.is_aligned(vmem::get_large_page_size()));
    assert!(pages.size >= vmem::get_large_page_size());
}

#[test]
fn test_page_sizes() {
    let page_size = vmem::get_page_size();
    let large_page_size = vmem::get_large_page_size();

    assert!(page_size > 0);
    assert!(page_size.is_power_of_two());
    assert!(large_page_size > 0);
    assert!(large_page_size.is_power_of_two());
    assert!(large_page_size >= page_size);
}

#[test]
fn test_protection_display() {
    assert_eq!(Protection::READ_WRITE.to_string(), "rw-");
    assert_eq!(Protection::READ_EXECUTE.to_string(), "r-x");
    assert_eq!(Protection::ALL.to_string(), "rwx");
    assert_eq!(Protection::empty().to_string(), "---");
}

#[test]
fn test_protection_predicates() {
    assert!(Protection::READ.is_readable());
    assert!(!Protection::READ.is_writable());
    assert!(!Protection::READ.is_executable());
    assert!(Protection::ALL.is_executable());
    assert_eq!(Protection::default(), Protection::READ_WRITE);
    assert_eq!(
        Protection::READ | Protection::WRITE,
        Protection::READ_WRITE
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_native_protection_mapping() {
    assert_eq!(vmem::native_protection(Protection::empty()), libc::PROT_NONE);
    assert_eq!(
        vmem::native_protection(Protection::READ_WRITE),
        libc::PROT_READ | libc::PROT_WRITE
    );
    assert_eq!(
        vmem::native_protection(Protection::ALL),
        libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
    );
}
