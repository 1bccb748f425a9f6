mod file;
mod memory;

pub use file::FileStrategy;
pub use memory::MemoryStrategy;
pub use test::TestStrategy;
