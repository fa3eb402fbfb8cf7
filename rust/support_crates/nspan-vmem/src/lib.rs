pub mod protection;

#[cfg_attr(any(target_os = "linux"), path = "vmem_linux.rs")]
#[cfg_attr(windows, path = "vmem_win.rs")]
#[cfg_attr(not(any(target_os = "linux", windows)), path = "vmem_fallback.rs")]
pub mod vmem;

pub use protection::Protection;

#[cfg(test)]
mod tests;
