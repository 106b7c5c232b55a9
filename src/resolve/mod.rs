//! Debounced remote metadata resolution

pub mod debounce;
pub mod playlist;
pub mod resolver;

pub use debounce::{Debouncer, Ticket};
pub use playlist::{PlaylistResolver, PlaylistState};
pub use resolver::{DebouncedResolver, ResolverTiming};
