//! 릴레이 전반에서 사용되는 공통 타입.

mod market;
mod stream;

pub use market::*;
pub use stream::*;
