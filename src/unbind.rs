//! UnbindRequest (spec §4.3): no response is ever sent, and no protocol
//! body to decode (the PDU tag alone carries the operation). Handling it
//! is a state-machine transition, not a handler function — the dispatch
//! loop in `server.rs` tears the connection down directly on seeing
//! `ProtocolOp::UnbindRequest`, cancelling every pending operation via
//! `Connection::abandon` and dropping the stream. This module exists only
//! so the operation has a named home matching its siblings.
