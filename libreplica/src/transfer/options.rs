//! Per-job transfer options.
//!
//! Options start from their defaults and are adjusted by a list of mutators:
//!
//! ```
//! use libreplica::transfer::options::{Options, with_copy_by_chunk, with_speed};
//!
//! let opts = Options::new([with_speed(2048), with_copy_by_chunk(true)]);
//! assert_eq!(opts.speed, 2048);
//! assert!(opts.copy_by_chunk);
//! assert_eq!(Options::default(), Options::new([]));
//! ```

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Bandwidth cap per blob stream in kb/s. Zero means unlimited.
    pub speed: u32,
    /// Upload blobs larger than the chunk size in chunks.
    pub copy_by_chunk: bool,
}

/// A mutator applied by [`Options::new`].
pub type OptionFn = Box<dyn FnOnce(&mut Options) + Send>;

impl Options {
    pub fn new<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = OptionFn>,
    {
        let mut opts = Self::default();
        for apply in overrides {
            apply(&mut opts);
        }
        opts
    }
}

pub fn with_speed(kbps: u32) -> OptionFn {
    Box::new(move |opts| opts.speed = kbps)
}

pub fn with_copy_by_chunk(enabled: bool) -> OptionFn {
    Box::new(move |opts| opts.copy_by_chunk = enabled)
}
