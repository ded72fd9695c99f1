pub mod writer;

pub use writer::{SyncReport, SyncWriter};
