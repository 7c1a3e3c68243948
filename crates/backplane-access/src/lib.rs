//! Stream Access Gate (C10) and Whitelist & Embed Policy (C11): the two
//! components that stand between a referring domain and CDN playback.

pub mod token;
pub mod whitelist;

pub use token::{AccessTokenConfig, CookieAttrs, StreamAccessGate, TokenError, VerifiedToken};
pub use whitelist::{EmbedPolicyCache, PolicyLookup, WhitelistCacheConfig, WhitelistSource};
