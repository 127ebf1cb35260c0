//! Bounded signal extraction over a repository tree.
//!
//! - [`TreeSource`] abstracts "list a directory" and "read a file"; [`LocalTree`]
//!   implements it over the filesystem.
//! - [`extract`] walks a source once and returns a [`SignalSet`]: the file
//!   tree plus at most [`MAX_KEY_FILES`] key files, each capped at
//!   [`MAX_FILE_BYTES`].
//! - [`detect_stack`] derives a [`StackReport`] from languages, the tree and
//!   the key files without calling any model.

pub mod extract;
pub mod source;
pub mod stack;

pub use extract::{
    extract, extract_with, KeyFile, SignalLimits, SignalSet, KEY_FILENAMES, MAX_FILE_BYTES,
    MAX_KEY_FILES, SKIP_DIRS,
};
pub use source::{LocalTree, TreeSource};
pub use stack::{detect_stack, infer_languages, StackReport};
