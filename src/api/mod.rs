pub mod client;
pub mod codec;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ApiClient, ByteStream, InboxApi, StreamSource};
pub use codec::{decode, Signal};
pub use stream::{SseFrame, SseParser};
