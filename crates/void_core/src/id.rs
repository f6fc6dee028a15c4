//! Name ids
//!
//! APIs, buses and events are identified by a 64-bit hash of their name so
//! that independently compiled units can agree on an identity without sharing
//! anything but the name string. The hash is FNV-1a, computed by a `const fn`
//! so ids can be declared as constants:
//!
//! ```
//! use void_core::id64;
//!
//! const KERNEL_BUS: u64 = id64("kernel");
//! assert_eq!(KERNEL_BUS, id64("kernel"));
//! ```

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash a name into a 64-bit id (FNV-1a)
pub const fn id64(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}
