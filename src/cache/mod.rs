// 缓存模块
// 键定义与会话令牌缓存操作

pub mod keys;
pub mod session;

pub use session::SessionCacheOperations;
