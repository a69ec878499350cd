//! mle: a mailx-style line editor for raw terminals
//!
//! The crate reads one line at a time from a raw-mode terminal, with
//! trie-resolved key bindings, persistent deduplicated history, tab
//! completion through a pluggable expander and minimal-repaint rendering
//! on a single row.
//!
//! [`editor::Editor`] is the entry point; everything else supports it.

pub mod bindings;
pub mod cell;
pub mod complete;
pub mod config;
pub mod editor;
pub mod error;
pub mod history;
pub mod render;
pub mod resolver;
pub mod term;
pub mod trie;

pub use bindings::{BindingTable, MleContext, MleFn};
pub use cell::Line;
pub use config::MleConfig;
pub use editor::{Editor, ReadResult};
pub use error::MleError;
pub use history::History;
pub use term::{Capabilities, PosixTty, RawTty, StaticCapabilities};
