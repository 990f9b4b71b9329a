//! Header collections with fixed slots for the common names.
//!
//! Every header name and value is a [`ByteStr`] view into the frozen read
//! buffer (or a static string), so the collections never copy header data.
//! The well-known names live in dedicated struct fields; everything else
//! goes to an ordered overflow map. Headers that may legally repeat
//! (Set-Cookie and friends) are kept in a separate appendable list.
//!
//! Lookup against the canonical table is ASCII-case-insensitive, so
//! `set("content-length", ..)` and `set("Content-Length", ..)` hit the same
//! slot. Unknown names keep their original spelling in the overflow map.

use std::collections::BTreeMap;

use crate::buffer::ByteStr;

macro_rules! header_collection {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($field:ident => $canonical:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            $($field: ByteStr,)+
            overflow: BTreeMap<ByteStr, ByteStr>,
            repeatable: Vec<(ByteStr, ByteStr)>,
        }

        impl $name {
            /// Number of fixed slots in this collection.
            pub const SLOT_COUNT: usize = [$($canonical,)+].len();

            pub fn new() -> Self {
                Self::default()
            }

            fn slot(&self, name: &str) -> Option<&ByteStr> {
                $(
                    if name.eq_ignore_ascii_case($canonical) {
                        return Some(&self.$field);
                    }
                )+
                None
            }

            fn slot_mut(&mut self, name: &str) -> Option<&mut ByteStr> {
                $(
                    if name.eq_ignore_ascii_case($canonical) {
                        return Some(&mut self.$field);
                    }
                )+
                None
            }

            /// Sets a header. A canonical name updates its slot, any other
            /// name is inserted (or replaced) in the overflow map.
            pub fn set(&mut self, name: impl Into<ByteStr>, value: impl Into<ByteStr>) {
                let name = name.into();
                let value = value.into();
                match self.slot_mut(&name) {
                    Some(slot) => *slot = value,
                    None => {
                        self.overflow.insert(name, value);
                    }
                }
            }

            /// Gets a header. Empty slots read as absent.
            pub fn get(&self, name: &str) -> Option<&ByteStr> {
                match self.slot(name) {
                    Some(slot) if !slot.is_empty() => Some(slot),
                    Some(_) => None,
                    None => self.overflow.get(name),
                }
            }

            /// Removes a header by clearing its slot or overflow entry.
            pub fn remove(&mut self, name: &str) {
                match self.slot_mut(name) {
                    Some(slot) => *slot = ByteStr::new(),
                    None => {
                        self.overflow.remove(name);
                    }
                }
            }

            /// Appends a header that may occur multiple times, e.g. Set-Cookie.
            pub fn add_repeatable(&mut self, name: impl Into<ByteStr>, value: impl Into<ByteStr>) {
                self.repeatable.push((name.into(), value.into()));
            }

            pub fn repeatable(&self) -> &[(ByteStr, ByteStr)] {
                &self.repeatable
            }

            /// Visits every present header: fixed slots in declaration order,
            /// then overflow entries, then repeatable entries.
            pub fn for_each<F>(&self, mut f: F)
            where
                F: FnMut(&str, &ByteStr),
            {
                $(
                    if !self.$field.is_empty() {
                        f($canonical, &self.$field);
                    }
                )+
                for (name, value) in &self.overflow {
                    f(name.as_str(), value);
                }
                for (name, value) in &self.repeatable {
                    f(name.as_str(), value);
                }
            }

            /// Upper bound of the entry count, used to pre-size serialization.
            pub fn max_size(&self) -> usize {
                Self::SLOT_COUNT + self.overflow.len() + self.repeatable.len()
            }

            /// Clears all slots, the overflow map and the repeatable list.
            pub fn clear(&mut self) {
                $(self.$field = ByteStr::new();)+
                self.overflow.clear();
                self.repeatable.clear();
            }

            $(
                pub fn $field(&self) -> &ByteStr {
                    &self.$field
                }
            )+
        }
    };
}

header_collection! {
    /// Headers of an incoming request.
    RequestHeaders {
        host => "Host",
        content_type => "Content-Type",
        content_length => "Content-Length",
        transfer_encoding => "Transfer-Encoding",
        connection => "Connection",
        user_agent => "User-Agent",
        accept => "Accept",
        accept_encoding => "Accept-Encoding",
        accept_language => "Accept-Language",
        cookie => "Cookie",
        referer => "Referer",
        expect => "Expect",
    }
}

header_collection! {
    /// Headers of an outgoing response.
    ResponseHeaders {
        date => "Date",
        content_type => "Content-Type",
        content_length => "Content-Length",
        content_encoding => "Content-Encoding",
        transfer_encoding => "Transfer-Encoding",
        connection => "Connection",
        server => "Server",
        vary => "Vary",
        etag => "ETag",
        cache_control => "Cache-Control",
        expires => "Expires",
        last_modified => "Last-Modified",
    }
}
