//! Typed per-session access to the session store.
//!
//! A [`SessionHandle`] binds one store, one session identifier and the
//! configured TTL, and moves structured values across the JSON boundary so
//! callers never see encoded payloads.

pub mod handle;

pub use handle::SessionHandle;
