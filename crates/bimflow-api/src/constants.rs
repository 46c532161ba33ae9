//! API constants

/// Versioned prefix every route is nested under.
pub const API_PREFIX: &str = "/api/v0";

/// Optional caller identity header.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity recorded when no `X-User-Id` header is sent.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Set on result responses: `HIT` when served from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Upper bound on the multipart envelope around the file part.
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;
