// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]

//! The transport core: framing, chunking, and the secure channel.
//!
//! Bytes arrive from the wire, the [`comms::tcp_codec::TcpCodec`] cuts them
//! into frames, the [`comms::chunker::Chunker`] assembles chunks into
//! messages, and the [`comms::secure_channel::SecureChannel`] applies and
//! removes security on the way through.

/// Buffer dumping helpers for debugging wire traffic.
pub mod debug {
    use log::{log_enabled, trace};

    /// Log a buffer as hex and printable characters under the `hex` trace
    /// target.
    pub fn log_buffer(message: &str, buf: &[u8]) {
        if !log_enabled!(target: "hex", log::Level::Trace) {
            return;
        }

        const LINE_LEN: usize = 32;
        trace!(target: "hex", "{}", message);

        let mut char_line = String::new();
        let mut hex_line = format!("{:08x}: ", 0);
        for (i, b) in buf.iter().enumerate() {
            if i > 0 && i % LINE_LEN == 0 {
                trace!(target: "hex", "{} {}", hex_line, char_line);
                hex_line = format!("{:08x}: ", i);
                char_line.clear();
            }
            hex_line.push_str(&format!(" {:02x}", b));
            char_line.push(if (32..=126).contains(b) {
                *b as char
            } else {
                '.'
            });
        }
        if !char_line.is_empty() {
            trace!(target: "hex", "{} {}", hex_line, char_line);
        }
    }
}

/// Common constants.
pub mod constants {
    /// Default OPC UA port, used in `opc.tcp://` urls without an explicit
    /// port.
    pub const DEFAULT_OPC_UA_SERVER_PORT: u16 = 4840;
}

pub mod comms;
pub mod config;
pub mod errors;

pub mod messages;
pub use messages::{Message, MessageType, RequestMessage, ResponseMessage};

/// Obtain a lock on a `Mutex`, a single place to hang lock tracing off
/// when hunting deadlocks.
#[macro_export]
macro_rules! trace_lock {
    ( $x:expr ) => {
        $x.lock()
    };
}

/// Obtain a read lock on a `RwLock`.
#[macro_export]
macro_rules! trace_read_lock {
    ( $x:expr ) => {
        $x.read()
    };
}

/// Obtain a write lock on a `RwLock`.
#[macro_export]
macro_rules! trace_write_lock {
    ( $x:expr ) => {
        $x.write()
    };
}

/// Synchronous locks used throughout the stack.
pub mod sync {
    /// Read-write lock, for mostly-read values.
    pub type RwLock<T> = parking_lot::RwLock<T>;
    /// Mutually exclusive lock.
    pub type Mutex<T> = parking_lot::Mutex<T>;
}

#[cfg(test)]
mod tests;
