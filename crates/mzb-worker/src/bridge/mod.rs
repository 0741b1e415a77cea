//! IPC bridge between a worker process and the MZBench node.
//!
//! # Architecture
//!
//! - **protocol**: Frame types (CallRequest, ResponseFrame, OutgoingFrame)
//! - **codec**: Line codec for AsyncRead/AsyncWrite
//! - **transport**: Channel owning the FIFO writer and the response reader

pub mod codec;
pub mod protocol;
pub mod transport;
