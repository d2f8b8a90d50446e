//! Component storage: the chunked column store for unmanaged types (§4.2), the managed column
//! for reference-typed ones (§3), and the per-slot entity header they're indexed alongside.

pub mod column;
pub mod header;
pub mod managed;

pub use column::{ChunkedColumn, ErasedColumn};
pub use header::EntityHeader;
pub use managed::{Handle, ManagedColumn};
