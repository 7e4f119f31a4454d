//! Axum/Tower HTTP server plumbing shared by the gateway's binary: the
//! server builder/middleware stack and the `{Success, Status, ErrorCode,
//! Message, Details}` response envelope (§6).

pub mod response;
pub mod server;
