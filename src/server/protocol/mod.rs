pub mod codec;
pub mod errors;
pub mod frame;
pub mod frame_buffer;

pub use codec::*;
pub use errors::*;
pub use frame::*;
pub use frame_buffer::*;
