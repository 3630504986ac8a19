//! # Internal Macros
//!
//! Accessor generators for the little-endian zerocopy structs that make up the
//! journal's on-disk headers.
//!
//! ## zerocopy_getters!
//!
//! ```ignore
//! use zerocopy::little_endian::{U16, U64};
//!
//! #[repr(C)]
//! struct EntryHeader {
//!     txn_id: U64,
//!     size: U16,
//! }
//!
//! impl EntryHeader {
//!     zerocopy_getters! {
//!         txn_id: u64,
//!         size: u16,
//!     }
//! }
//!
//! // Generates:
//! // pub fn txn_id(&self) -> u64 { self.txn_id.get() }
//! // pub fn size(&self) -> u16 { self.size.get() }
//! ```
//!
//! Headers are built once through their constructors and only read afterwards,
//! so no setters are generated.

/// Generates getter methods for zerocopy little-endian fields.
#[macro_export]
macro_rules! zerocopy_getters {
    ($($field:ident : $native_ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $field(&self) -> $native_ty {
                self.$field.get()
            }
        )*
    };
}
