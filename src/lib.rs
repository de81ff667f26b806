//! dexmerge: combines two Dalvik Executable (`.dex`) files into one
//! well-formed, re-indexed `.dex` file.
//!
//! # Layout
//!
//! - [`dex`] — the in-memory container (C0/C1): byte codecs, section
//!   records, and the `DexFile` read/write round-trip.
//! - [`index_map`] — per-source index/offset translation tables (C2).
//! - [`section_merge`] / [`sections`] — the generic sorted/unsorted merge
//!   algorithms (C3) and their per-section key definitions (C4).
//! - [`topo_sort`] — class-def inheritance ordering (C5).
//! - [`rewrite`] / [`bytecode`] — rewriting a source file's records, down to
//!   individual bytecode operands, into the merged index space (C6/C7).
//! - [`sizing`] — writer-size estimation and compaction (C8).
//! - [`merger`] — top-level orchestration tying the above into `merge()`.
//!
//! # Logging
//!
//! Every stage emits [`tracing`] spans/events rather than `println!`;
//! install a subscriber (`tracing_subscriber::fmt().init()` is what the
//! CLI binary does) to see them.

pub mod bytecode;
pub mod dex;
pub mod error;
pub mod index_map;
pub mod leb128;
pub mod merger;
pub mod rewrite;
pub mod section_merge;
pub mod sections;
pub mod sizing;
pub mod topo_sort;

pub use dex::file::DexFile;
pub use error::{MergeError, Result};
pub use merger::{merge, merge_and_write, CollisionPolicy, MergeOptions};
