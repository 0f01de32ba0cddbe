mod arrays;
mod bootstrap;
mod bridge;
mod cells;
mod ctors;
mod entry;
mod guest;
mod heap;
mod modules;
mod object;
mod runtime;
mod tagged;

pub use arrays::*;
pub use bootstrap::*;
pub use bridge::*;
pub use cells::*;
pub use ctors::*;
pub use entry::*;
pub use guest::*;
pub use heap::{Allocator, Heap, HeapCreateInfo};
pub use modules::*;
pub use object::*;
pub use runtime::*;
pub use tagged::*;
