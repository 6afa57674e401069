// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! The binary encoding traits, the codec error type and helpers for
//! reading and writing scalar values.

use std::{
    error::Error as StdError,
    fmt::{Debug, Display},
    io::{Cursor, Read, Write},
    sync::atomic::{AtomicU64, Ordering},
};

use byteorder::{ByteOrder, LittleEndian};

use crate::{constants, status_code::StatusCode, Context};

/// Result of an encoding or decoding operation.
pub type EncodingResult<T> = std::result::Result<T, Error>;

/// Error produced while encoding or decoding.
///
/// Carries a status code, a dynamic error source with details, and, when it
/// can be recovered, the id and handle of the request the error belongs to so
/// that it can be turned into a service fault instead of killing the channel.
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    request_id: Option<u32>,
    request_handle: Option<u32>,
    context: Box<dyn StdError + Send + Sync>,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.context)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.context)
    }
}

impl Error {
    /// Create a new error with the given `status` code and `context` as a
    /// dynamic error source.
    pub fn new(status: StatusCode, context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            status,
            request_id: None,
            request_handle: None,
            context: context.into(),
        }
    }

    /// Create a new error with status code `BadDecodingError`.
    pub fn decoding(context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(StatusCode::BadDecodingError, context)
    }

    /// Create a new error with status code `BadEncodingError`.
    pub fn encoding(context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(StatusCode::BadEncodingError, context)
    }

    /// Attach the id and handle of the request this error belongs to.
    pub fn with_context(mut self, request_id: Option<u32>, request_handle: Option<u32>) -> Self {
        self.request_id = request_id;
        self.request_handle = request_handle;
        self
    }

    /// Attach a request id to this error.
    pub fn with_request_id(mut self, id: u32) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Attach a request handle to this error.
    pub fn with_request_handle(mut self, handle: u32) -> Self {
        self.request_handle = Some(handle);
        self
    }

    /// The status code of this error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Request id and request handle, if both are known.
    pub fn full_context(&self) -> Option<(u32, u32)> {
        match (self.request_id, self.request_handle) {
            (Some(id), Some(handle)) => Some((id, handle)),
            _ => None,
        }
    }
}

impl From<Error> for StatusCode {
    fn from(value: Error) -> Self {
        log::error!("{}", value);
        value.status()
    }
}

impl From<StatusCode> for Error {
    fn from(value: StatusCode) -> Self {
        Self::new(value, value.name())
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        std::io::Error::other(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::decoding(value)
    }
}

/// Guard against runaway recursion while decoding nested values.
///
/// Variants and extension objects may contain themselves, a hostile stream
/// could otherwise recurse until the stack blows.
#[derive(Debug)]
pub struct DepthGauge {
    max_depth: u64,
    current_depth: AtomicU64,
}

impl Clone for DepthGauge {
    fn clone(&self) -> Self {
        Self {
            max_depth: self.max_depth,
            current_depth: AtomicU64::new(0),
        }
    }
}

impl Default for DepthGauge {
    fn default() -> Self {
        Self::new(constants::MAX_DECODING_DEPTH)
    }
}

impl DepthGauge {
    /// Create a depth gauge with the given maximum depth.
    pub fn new(max_depth: u64) -> Self {
        Self {
            max_depth,
            current_depth: AtomicU64::new(0),
        }
    }

    /// The maximum depth of this gauge.
    pub fn max_depth(&self) -> u64 {
        self.max_depth
    }
}

/// Lease on a [`DepthGauge`]. Decrements the depth on drop, so the count
/// stays correct even when unwinding through an error.
#[derive(Debug)]
pub struct DepthLock<'a> {
    gauge: &'a DepthGauge,
}

impl Drop for DepthLock<'_> {
    fn drop(&mut self) {
        self.gauge.current_depth.fetch_sub(1, Ordering::Release);
    }
}

impl<'a> DepthLock<'a> {
    /// Increment the depth, failing if the maximum is exceeded. The returned
    /// lock decrements the depth again once dropped.
    pub fn obtain(gauge: &'a DepthGauge) -> Result<DepthLock<'a>, Error> {
        let current = gauge.current_depth.fetch_add(1, Ordering::Acquire);
        let lock = Self { gauge };
        if current >= gauge.max_depth {
            Err(Error::decoding(
                "Maximum decoding depth exceeded, aborting",
            ))
        } else {
            Ok(lock)
        }
    }
}

#[derive(Clone, Debug)]
/// Restrictions applied while decoding, negotiated per connection.
pub struct DecodingOptions {
    /// Maximum size of a message in bytes. 0 means no limit.
    pub max_message_size: usize,
    /// Maximum number of chunks in a message. 0 means no limit.
    pub max_chunk_count: usize,
    /// Maximum length in bytes of a string. 0 means no string permitted.
    pub max_string_length: usize,
    /// Maximum length in bytes of a byte string.
    pub max_byte_string_length: usize,
    /// Maximum number of array elements.
    pub max_array_length: usize,
    /// Recursion guard for nested values.
    pub decoding_depth_gauge: DepthGauge,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        DecodingOptions {
            max_message_size: constants::MAX_MESSAGE_SIZE,
            max_chunk_count: constants::MAX_CHUNK_COUNT,
            max_string_length: constants::MAX_STRING_LENGTH,
            max_byte_string_length: constants::MAX_BYTE_STRING_LENGTH,
            max_array_length: constants::MAX_ARRAY_LENGTH,
            decoding_depth_gauge: DepthGauge::default(),
        }
    }
}

impl DecodingOptions {
    /// Restrictive options for decoding payloads that are not expected to
    /// contain large values.
    pub fn minimal() -> Self {
        DecodingOptions {
            max_string_length: 8192,
            max_byte_string_length: 8192,
            max_array_length: 8192,
            decoding_depth_gauge: DepthGauge::new(1),
            ..Default::default()
        }
    }

    /// For tests. A separate name makes call sites easier to audit.
    pub fn test() -> Self {
        Self::default()
    }

    /// Obtain a lease on the recursion depth. Fails if the maximum depth
    /// would be exceeded.
    pub fn depth_lock(&self) -> Result<DepthLock<'_>, Error> {
        DepthLock::obtain(&self.decoding_depth_gauge)
    }
}

/// OPC UA binary encoding. `byte_len` must return exactly the number of
/// bytes `encode` writes, or `encode` must be guaranteed to fail.
///
/// Implementations must use `write_all` on the stream so that a partial
/// write never goes unnoticed.
pub trait BinaryEncodable {
    /// The exact number of bytes `encode` will produce for this value.
    fn byte_len(&self, ctx: &Context<'_>) -> usize;

    /// Encode the value to the stream.
    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()>;

    /// Encode straight into a new byte vector. Prefer reusing buffers,
    /// this is for tests and trivial code.
    fn encode_to_vec(&self, ctx: &Context<'_>) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::with_capacity(self.byte_len(ctx)));
        let _ = self.encode(&mut buffer, ctx);
        buffer.into_inner()
    }
}

/// OPC UA binary decoding.
pub trait BinaryDecodable: Sized {
    /// Decode an instance from the stream. Implementations must respect the
    /// limits in the context's [`DecodingOptions`] and bail out with a
    /// decoding error as soon as one is exceeded.
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self>;
}

/// Binary encoding for types that cannot contain dynamic or custom types,
/// used by the framing layer which has no encoding context.
pub trait SimpleBinaryEncodable {
    /// The exact number of bytes `encode` will produce for this value.
    fn byte_len(&self) -> usize;

    /// Encode the value to the stream.
    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()>;

    /// Encode straight into a new byte vector.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::with_capacity(self.byte_len()));
        let _ = self.encode(&mut buffer);
        buffer.into_inner()
    }
}

/// Binary decoding for types that cannot contain dynamic or custom types.
pub trait SimpleBinaryDecodable: Sized {
    /// Decode an instance from the stream.
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Self>;
}

impl<T> BinaryEncodable for T
where
    T: SimpleBinaryEncodable,
{
    fn byte_len(&self, _ctx: &Context<'_>) -> usize {
        SimpleBinaryEncodable::byte_len(self)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, _ctx: &Context<'_>) -> EncodingResult<()> {
        SimpleBinaryEncodable::encode(self, stream)
    }
}

impl<T> BinaryDecodable for T
where
    T: SimpleBinaryDecodable,
{
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self> {
        SimpleBinaryDecodable::decode(stream, ctx.options())
    }
}

/// Trait implemented by OPC UA types that have a null form.
pub trait UaNullable {
    /// Return true if this value is null.
    fn is_ua_null(&self) -> bool {
        false
    }
}

impl<T: UaNullable> UaNullable for Option<T> {
    fn is_ua_null(&self) -> bool {
        match self {
            Some(v) => v.is_ua_null(),
            None => true,
        }
    }
}

impl<T: UaNullable> UaNullable for Vec<T> {}

impl<T: UaNullable> UaNullable for Box<T> {
    fn is_ua_null(&self) -> bool {
        self.as_ref().is_ua_null()
    }
}

macro_rules! ua_null_is {
    ($t:ty, $c:expr) => {
        impl UaNullable for $t {
            fn is_ua_null(&self) -> bool {
                *self == $c
            }
        }
    };
}

ua_null_is!(bool, false);
ua_null_is!(u8, 0);
ua_null_is!(u16, 0);
ua_null_is!(u32, 0);
ua_null_is!(u64, 0);
ua_null_is!(i8, 0);
ua_null_is!(i16, 0);
ua_null_is!(i32, 0);
ua_null_is!(i64, 0);
ua_null_is!(f32, 0.0);
ua_null_is!(f64, 0.0);

impl UaNullable for String {}
impl UaNullable for str {}

impl<T> BinaryEncodable for Option<Vec<T>>
where
    T: BinaryEncodable,
{
    fn byte_len(&self, ctx: &Context<'_>) -> usize {
        let mut size = 4;
        if let Some(ref values) = self {
            size += values.iter().map(|v| v.byte_len(ctx)).sum::<usize>();
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S, ctx: &Context<'_>) -> EncodingResult<()> {
        if let Some(ref values) = self {
            write_i32(stream, values.len() as i32)?;
            for value in values {
                value.encode(stream, ctx)?;
            }
        } else {
            write_i32(stream, -1)?;
        }
        Ok(())
    }
}

impl<T> BinaryDecodable for Option<Vec<T>>
where
    T: BinaryDecodable,
{
    fn decode<S: Read + ?Sized>(stream: &mut S, ctx: &Context<'_>) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(None)
        } else if len < -1 {
            Err(Error::decoding("Array length is negative and invalid"))
        } else if len as usize > ctx.options().max_array_length {
            Err(Error::decoding(format!(
                "Array length {} exceeds decoding limit {}",
                len,
                ctx.options().max_array_length
            )))
        } else {
            let mut values: Vec<T> = Vec::with_capacity(len as usize);
            for _ in 0..len {
                values.push(T::decode(stream, ctx)?);
            }
            Ok(Some(values))
        }
    }
}

/// Length in bytes of an array of encoded values, length prefix included.
pub fn byte_len_array<T: BinaryEncodable>(values: &Option<Vec<T>>, ctx: &Context<'_>) -> usize {
    let mut size = 4;
    if let Some(ref values) = values {
        size += values.iter().map(|v| v.byte_len(ctx)).sum::<usize>();
    }
    size
}

/// Write `count` copies of `value` to the stream.
pub fn write_bytes<W: Write + ?Sized>(
    stream: &mut W,
    value: u8,
    count: usize,
) -> EncodingResult<usize> {
    for _ in 0..count {
        stream.write_all(&[value]).map_err(Error::encoding)?;
    }
    Ok(count)
}

/// Write a single unsigned byte to the stream.
pub fn write_u8<T, W: Write + ?Sized>(stream: &mut W, value: T) -> EncodingResult<()>
where
    T: Into<u8>,
{
    stream.write_all(&[value.into()]).map_err(Error::encoding)
}

/// Read a single unsigned byte from the stream.
pub fn read_u8<R: Read + ?Sized>(stream: &mut R) -> EncodingResult<u8> {
    let mut buf = [0u8];
    stream.read_exact(&mut buf).map_err(Error::decoding)?;
    Ok(buf[0])
}

macro_rules! scalar_io {
    ($t:ty, $len:literal, $write_name:ident, $read_name:ident, $write:ident, $read:ident) => {
        #[doc = concat!("Write a little-endian `", stringify!($t), "` to the stream.")]
        pub fn $write_name<T, W: Write + ?Sized>(stream: &mut W, value: T) -> EncodingResult<()>
        where
            T: Into<$t>,
        {
            let mut buf = [0u8; $len];
            LittleEndian::$write(&mut buf, value.into());
            stream.write_all(&buf).map_err(Error::encoding)
        }

        #[doc = concat!("Read a little-endian `", stringify!($t), "` from the stream.")]
        pub fn $read_name<R: Read + ?Sized>(stream: &mut R) -> EncodingResult<$t> {
            let mut buf = [0u8; $len];
            stream.read_exact(&mut buf).map_err(Error::decoding)?;
            Ok(LittleEndian::$read(&buf))
        }
    };
}

scalar_io!(i16, 2, write_i16, read_i16, write_i16, read_i16);
scalar_io!(u16, 2, write_u16, read_u16, write_u16, read_u16);
scalar_io!(i32, 4, write_i32, read_i32, write_i32, read_i32);
scalar_io!(u32, 4, write_u32, read_u32, write_u32, read_u32);
scalar_io!(i64, 8, write_i64, read_i64, write_i64, read_i64);
scalar_io!(u64, 8, write_u64, read_u64, write_u64, read_u64);
scalar_io!(f32, 4, write_f32, read_f32, write_f32, read_f32);
scalar_io!(f64, 8, write_f64, read_f64, write_f64, read_f64);

/// Convert an IO write result into an [`EncodingResult`].
pub fn process_encode_io_result(result: std::io::Result<()>) -> EncodingResult<()> {
    result.map_err(Error::encoding)
}

/// Convert an IO read result into an [`EncodingResult`].
pub fn process_decode_io_result<T: Debug>(result: std::io::Result<T>) -> EncodingResult<T> {
    result.map_err(Error::decoding)
}

/// Validate a wire length prefix against a decoding limit. The caller has
/// already handled -1, anything else negative is malformed.
pub(crate) fn process_len(len: i32, limit: usize, kind: &str) -> EncodingResult<usize> {
    if len < 0 {
        Err(Error::decoding(format!(
            "{} length {} is negative and invalid",
            kind, len
        )))
    } else if len as usize > limit {
        Err(Error::decoding(format!(
            "{} length {} exceeds decoding limit {}",
            kind, len, limit
        )))
    } else {
        Ok(len as usize)
    }
}

/// Read exactly `buf.len()` bytes from the stream.
pub fn read_bytes<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> EncodingResult<usize> {
    stream.read_exact(buf).map_err(Error::decoding)?;
    Ok(buf.len())
}

/// Skip `bytes` bytes in the stream.
pub fn skip_bytes<R: Read + ?Sized>(stream: &mut R, bytes: u64) -> EncodingResult<()> {
    std::io::copy(&mut stream.take(bytes), &mut std::io::sink())?;
    Ok(())
}

macro_rules! simple_scalar_impl {
    ($t:ty, $len:literal, $write_name:ident, $read_name:ident) => {
        impl SimpleBinaryEncodable for $t {
            fn byte_len(&self) -> usize {
                $len
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
                $write_name(stream, *self)
            }
        }

        impl SimpleBinaryDecodable for $t {
            fn decode<S: Read + ?Sized>(
                stream: &mut S,
                _: &DecodingOptions,
            ) -> EncodingResult<Self> {
                $read_name(stream)
            }
        }
    };
}

simple_scalar_impl!(i16, 2, write_i16, read_i16);
simple_scalar_impl!(u16, 2, write_u16, read_u16);
simple_scalar_impl!(i32, 4, write_i32, read_i32);
simple_scalar_impl!(u32, 4, write_u32, read_u32);
simple_scalar_impl!(i64, 8, write_i64, read_i64);
simple_scalar_impl!(u64, 8, write_u64, read_u64);
simple_scalar_impl!(f32, 4, write_f32, read_f32);
simple_scalar_impl!(f64, 8, write_f64, read_f64);

impl SimpleBinaryEncodable for bool {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, u8::from(*self))
    }
}

impl SimpleBinaryDecodable for bool {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        // Non-zero decodes as true
        Ok(read_u8(stream)? != 0)
    }
}

impl SimpleBinaryEncodable for u8 {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, *self)
    }
}

impl SimpleBinaryDecodable for u8 {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        read_u8(stream)
    }
}

impl SimpleBinaryEncodable for i8 {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, *self as u8)
    }
}

impl SimpleBinaryDecodable for i8 {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(read_u8(stream)? as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::{DepthGauge, DepthLock};
    use crate::StatusCode;

    #[test]
    fn depth_gauge() {
        let dg = DepthGauge::new(4);

        {
            let mut held = Vec::new();
            for _ in 0..4 {
                held.push(DepthLock::obtain(&dg).unwrap());
            }
            // One over the maximum fails
            assert_eq!(
                DepthLock::obtain(&dg).unwrap_err().status(),
                StatusCode::BadDecodingError
            );
        }

        // All locks dropped, the full depth is available again
        let _l = DepthLock::obtain(&dg).unwrap();
    }
}
