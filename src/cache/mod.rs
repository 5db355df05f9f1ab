//! 响应缓存模块：按 (请求类型, 查询, 用户令牌) 缓存成功的治理响应。
//!
//! # Response Caching Module
//!
//! Memoizes successful governed responses so identical
//! `(request_type, query, user_token)` tuples skip the round trip.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | TTL cache with statistics and a cancellable sweep task |
//! | [`CacheKey`] | Opaque `request_type:query:user_token` key |
//! | [`CacheStats`] | Hit / miss / set / sweep counters |
//!
//! Only `success = true` responses are stored; the client enforces that, the
//! cache itself stores whatever it is given.

mod backend;
mod key;
mod manager;

pub use key::CacheKey;
pub use manager::{CacheStats, ResponseCache};
