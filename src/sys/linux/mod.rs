mod awakener;
mod poll;
mod sock;

pub use self::awakener::Awakener;
pub use self::poll::{Event, Ops, Selector};
pub use self::sock::{readv, recvmsg_errqueue, sendmsg, IoVec};
