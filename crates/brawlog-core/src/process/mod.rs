mod bytes;
mod handle;
mod reader;

// Mock memory reader for testing (always available for unit and integration tests)
#[doc(hidden)]
pub mod mock;

pub use bytes::{ByteBuffer, decode_shift_jis, encode_shift_jis};
pub use handle::ProcessHandle;
pub use reader::{MemoryReader, ReadMemory};

#[doc(hidden)]
pub use mock::{MockMemoryBuilder, MockMemoryReader};
