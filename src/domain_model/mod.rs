mod key;
mod listing;
mod member;
mod message;
mod room;
mod stream;
mod unit;

pub use key::*;
pub use listing::*;
pub use member::*;
pub use message::*;
pub use room::*;
pub use stream::*;
pub use unit::*;
