//! Shared byte buffers, string views and the scatter-gather packet.
//!
//! The whole crate works on reference-counted [`Bytes`] buffers: the
//! connection freezes its read buffer and hands out sub-range views, so a
//! view keeps the backing store alive for as long as it exists. [`ByteStr`]
//! is such a view with a UTF-8 guarantee, used for urls and header
//! names/values. [`Packet`] accumulates response fragments and is flushed
//! with a single vectored write through its [`Buf`] implementation.

use std::borrow::Borrow;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Display, Formatter};
use std::io::IoSlice;
use std::ops::Deref;
use std::str::{self, Utf8Error};

use bytes::{Buf, Bytes};
use once_cell::sync::Lazy;

/// An immutable UTF-8 string view backed by a reference-counted [`Bytes`].
///
/// Cloning bumps the refcount; slicing shares the backing store. A view is
/// therefore always valid: it owns (a share of) the buffer it points into.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteStr(Bytes);

impl ByteStr {
    /// Creates an empty view.
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Creates a view over a process-lifetime static string.
    pub const fn from_static(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }

    /// Creates a view from shared bytes, validating UTF-8.
    pub fn from_utf8(bytes: Bytes) -> Result<Self, Utf8Error> {
        str::from_utf8(&bytes)?;
        Ok(Self(bytes))
    }

    /// Creates a view from shared bytes without checking UTF-8.
    ///
    /// # Safety
    ///
    /// The caller must guarantee `bytes` is valid UTF-8. The request parser
    /// uses this for slices that httparse has already verified to be ASCII.
    pub unsafe fn from_utf8_unchecked(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: every constructor either validated UTF-8 or required the
        // caller to guarantee it.
        unsafe { str::from_utf8_unchecked(&self.0) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a view over `sub`, which must be a sub-slice of this view.
    /// The result shares the same backing store.
    pub fn slice_of(&self, sub: &str) -> Self {
        Self(self.0.slice_ref(sub.as_bytes()))
    }
}

impl Deref for ByteStr {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for ByteStr {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<String> for ByteStr {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

impl From<&'static str> for ByteStr {
    fn from(s: &'static str) -> Self {
        Self::from_static(s)
    }
}

impl PartialEq<str> for ByteStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ByteStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Display for ByteStr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self.as_str(), f)
    }
}

impl Debug for ByteStr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self.as_str(), f)
    }
}

/// Upper bound (exclusive) of the shared decimal table.
const SMALL_INT_LIMIT: u64 = 1000;

static SMALL_INTEGERS: Lazy<Vec<Bytes>> =
    Lazy::new(|| (0..SMALL_INT_LIMIT).map(|value| Bytes::from(value.to_string())).collect());

/// Formats an unsigned integer as shared bytes.
///
/// Values below 1000 are served from a prebuilt table so hot paths
/// (Content-Length of small responses, status codes) do not allocate.
pub fn fmt_uint(value: u64) -> Bytes {
    if value < SMALL_INT_LIMIT {
        SMALL_INTEGERS[value as usize].clone()
    } else {
        Bytes::from(value.to_string())
    }
}

/// An ordered sequence of byte fragments written as one vectored I/O
/// operation.
///
/// A packet starts out as a single buffer and promotes itself to a fragment
/// list on the second append. Draining operations ([`Packet::append_packet`],
/// [`Packet::release`]) leave the source packet empty.
#[derive(Debug)]
pub enum Packet {
    /// One buffer, possibly empty.
    Single(Bytes),
    /// An ordered fragment list with a running byte total.
    Multiple(PacketFragments),
}

/// The fragment list of a [`Packet::Multiple`].
#[derive(Debug, Default)]
pub struct PacketFragments {
    fragments: VecDeque<Bytes>,
    total: usize,
}

impl PacketFragments {
    pub fn fragments(&self) -> &VecDeque<Bytes> {
        &self.fragments
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::Single(Bytes::new())
    }
}

impl Packet {
    /// Creates an empty packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty packet whose fragment list can hold `capacity`
    /// fragments without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::Multiple(PacketFragments { fragments: VecDeque::with_capacity(capacity), total: 0 })
    }

    /// Total byte count across all fragments.
    pub fn size(&self) -> usize {
        match self {
            Self::Single(bytes) => bytes.len(),
            Self::Multiple(multiple) => multiple.total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the buffer if this packet still has the single shape.
    pub fn get_if_single(&self) -> Option<&Bytes> {
        match self {
            Self::Single(bytes) => Some(bytes),
            Self::Multiple(_) => None,
        }
    }

    /// Returns the fragment list if this packet has the multiple shape.
    pub fn get_if_multiple(&self) -> Option<&PacketFragments> {
        match self {
            Self::Single(_) => None,
            Self::Multiple(multiple) => Some(multiple),
        }
    }

    /// Appends one buffer. An empty buffer is a no-op.
    pub fn append_bytes(&mut self, bytes: Bytes) -> &mut Self {
        if bytes.is_empty() {
            return self;
        }
        match self {
            Self::Single(single) if single.is_empty() => *single = bytes,
            Self::Single(single) => {
                let mut fragments = VecDeque::with_capacity(4);
                let total = single.len() + bytes.len();
                fragments.push_back(std::mem::take(single));
                fragments.push_back(bytes);
                *self = Self::Multiple(PacketFragments { fragments, total });
            }
            Self::Multiple(multiple) => {
                multiple.total += bytes.len();
                multiple.fragments.push_back(bytes);
            }
        }
        self
    }

    /// Appends a process-lifetime static string.
    pub fn append_static(&mut self, s: &'static str) -> &mut Self {
        self.append_bytes(Bytes::from_static(s.as_bytes()))
    }

    /// Appends the decimal rendering of an unsigned integer, using the
    /// shared small-integer table when possible.
    pub fn append_uint(&mut self, value: u64) -> &mut Self {
        self.append_bytes(fmt_uint(value))
    }

    /// Appends every fragment of `other`, leaving it empty.
    pub fn append_packet(&mut self, other: &mut Packet) -> &mut Self {
        match std::mem::take(other) {
            Self::Single(bytes) => self.append_bytes(bytes),
            Self::Multiple(mut multiple) => {
                for bytes in multiple.fragments.drain(..) {
                    self.append_bytes(bytes);
                }
                self
            }
        }
    }

    /// Yields the owned fragments in order, leaving the packet empty.
    pub fn release(&mut self) -> Vec<Bytes> {
        match std::mem::take(self) {
            Self::Single(bytes) if bytes.is_empty() => Vec::new(),
            Self::Single(bytes) => vec![bytes],
            Self::Multiple(multiple) => multiple.fragments.into(),
        }
    }

    /// Copies all fragments into one contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        match self {
            Self::Single(bytes) => out.extend_from_slice(bytes),
            Self::Multiple(multiple) => {
                for fragment in &multiple.fragments {
                    out.extend_from_slice(fragment);
                }
            }
        }
        out
    }
}

impl From<Bytes> for Packet {
    fn from(bytes: Bytes) -> Self {
        Self::Single(bytes)
    }
}

impl From<&'static str> for Packet {
    fn from(s: &'static str) -> Self {
        Self::Single(Bytes::from_static(s.as_bytes()))
    }
}

/// The [`Buf`] view drives vectored socket writes: `chunks_vectored`
/// exposes every fragment, so `write_all_buf` turns one packet into one
/// writev call on capable transports.
impl Buf for Packet {
    fn remaining(&self) -> usize {
        self.size()
    }

    fn chunk(&self) -> &[u8] {
        match self {
            Self::Single(bytes) => bytes,
            Self::Multiple(multiple) => match multiple.fragments.front() {
                Some(bytes) => bytes,
                None => &[],
            },
        }
    }

    fn chunks_vectored<'a>(&'a self, dst: &mut [IoSlice<'a>]) -> usize {
        match self {
            Self::Single(bytes) => {
                if bytes.is_empty() || dst.is_empty() {
                    0
                } else {
                    dst[0] = IoSlice::new(bytes);
                    1
                }
            }
            Self::Multiple(multiple) => {
                let mut filled = 0;
                for fragment in &multiple.fragments {
                    if filled == dst.len() {
                        break;
                    }
                    if fragment.is_empty() {
                        continue;
                    }
                    dst[filled] = IoSlice::new(fragment);
                    filled += 1;
                }
                filled
            }
        }
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(cnt <= self.size(), "cannot advance past the end of the packet");
        match self {
            Self::Single(bytes) => bytes.advance(cnt),
            Self::Multiple(multiple) => {
                multiple.total -= cnt;
                while cnt > 0 {
                    let front = multiple.fragments.front_mut().expect("fragment total out of sync");
                    if cnt < front.len() {
                        front.advance(cnt);
                        break;
                    }
                    cnt -= front.len();
                    multiple.fragments.pop_front();
                }
            }
        }
    }
}
