//! Immutable resolved endpoint values (SPEC_FULL.md §4.5).
//!
//! Mirrors the C `sock_addr` type: a `(family, socktype, name)` triple
//! where `name` is the raw bytes of a kernel `sockaddr`. Equality,
//! cloning, and (de)serialization all operate byte-wise over the three
//! fields; this type never interprets `name` except when converting to
//! or from a platform address (`to_socket_addr`, `to_unix_path`,
//! `from_socket_addr`, `unix`), which is the only place family-specific
//! layout knowledge lives.

pub mod normalize;

use std::{
    convert::TryInto,
    ffi::OsStr,
    mem, os::unix::ffi::OsStrExt,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    path::{Path, PathBuf},
};

pub use normalize::{normalize, normalize_to_string};

/// Raw platform socket family, e.g. `libc::AF_INET`.
pub type Family = libc::c_int;
/// Raw platform socket type, e.g. `libc::SOCK_STREAM`.
pub type SockType = libc::c_int;

/// An immutable, resolved socket endpoint (SPEC_FULL.md §4.5).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Address {
    family: Family,
    socktype: SockType,
    name: Vec<u8>,
}

/// Failure to interpret a byte buffer as an [`Address`] (`deserialize`).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address buffer truncated: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("address buffer declares a name length ({declared}) that does not match the remaining bytes ({remaining})")]
    LengthMismatch { declared: usize, remaining: usize },
}

/// Byte width of the two platform ints and the length prefix in the
/// wire layout described in SPEC_FULL.md §4.5. `family` and `socktype`
/// are serialized as native-endian `i32`; `namelen` as native-endian `u32`.
const HEADER_LEN: usize = mem::size_of::<i32>() * 2 + mem::size_of::<u32>();

impl Address {
    /// Constructs an address from its three raw fields directly. Mainly
    /// useful for tests and for collaborators that already have a
    /// platform sockaddr in hand.
    pub fn new(family: Family, socktype: SockType, name: Vec<u8>) -> Self {
        Address { family, socktype, name }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn socktype(&self) -> SockType {
        self.socktype
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Builds an address from a resolved `std` socket address.
    pub fn from_socket_addr(addr: SocketAddr, socktype: SockType) -> Self {
        match addr {
            SocketAddr::V4(v4) => {
                let sin = libc::sockaddr_in {
                    sin_family: libc::AF_INET as libc::sa_family_t,
                    sin_port: v4.port().to_be(),
                    sin_addr: libc::in_addr {
                        s_addr: u32::from_ne_bytes(v4.ip().octets()),
                    },
                    sin_zero: [0; 8],
                };
                Address {
                    family: libc::AF_INET,
                    socktype,
                    name: struct_bytes(&sin),
                }
            }
            SocketAddr::V6(v6) => {
                let sin6 = libc::sockaddr_in6 {
                    sin6_family: libc::AF_INET6 as libc::sa_family_t,
                    sin6_port: v6.port().to_be(),
                    sin6_flowinfo: v6.flowinfo(),
                    sin6_addr: libc::in6_addr {
                        s6_addr: v6.ip().octets(),
                    },
                    sin6_scope_id: v6.scope_id(),
                };
                Address {
                    family: libc::AF_INET6,
                    socktype,
                    name: struct_bytes(&sin6),
                }
            }
        }
    }

    /// Builds a UNIX-domain address from a filesystem path.
    ///
    /// Panics if `path` does not fit in `sun_path` (108 bytes on Linux,
    /// including the terminating NUL) -- the resolver is expected to
    /// have already rejected an over-long path before constructing one
    /// of these.
    pub fn unix<P: AsRef<Path>>(path: P) -> Self {
        let bytes = path.as_ref().as_os_str().as_bytes();
        let mut sun = libc::sockaddr_un {
            sun_family: libc::AF_UNIX as libc::sa_family_t,
            sun_path: [0; 108],
        };
        assert!(
            bytes.len() < sun.sun_path.len(),
            "unix socket path too long for sun_path"
        );
        for (dst, byte) in sun.sun_path.iter_mut().zip(bytes.iter()) {
            *dst = *byte as libc::c_char;
        }
        Address {
            family: libc::AF_UNIX,
            socktype: libc::SOCK_STREAM,
            name: struct_bytes(&sun),
        }
    }

    /// Recovers a `std` socket address, for `AF_INET`/`AF_INET6` addresses only.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self.family {
            libc::AF_INET => {
                let sin: libc::sockaddr_in = bytes_to_struct(&self.name)?;
                let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                let port = u16::from_be(sin.sin_port);
                Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
            }
            libc::AF_INET6 => {
                let sin6: libc::sockaddr_in6 = bytes_to_struct(&self.name)?;
                let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                let port = u16::from_be(sin6.sin6_port);
                Some(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    port,
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
            _ => None,
        }
    }

    /// Recovers a filesystem path, for `AF_UNIX` addresses only.
    pub fn to_unix_path(&self) -> Option<PathBuf> {
        if self.family != libc::AF_UNIX {
            return None;
        }
        let sun: libc::sockaddr_un = bytes_to_struct(&self.name)?;
        let raw: Vec<u8> = sun
            .sun_path
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as u8)
            .collect();
        Some(PathBuf::from(OsStr::from_bytes(&raw)))
    }

    /// Clones an ordered list of addresses, preserving order.
    ///
    /// The source's `clone_list`/`free_list` pair exists because its
    /// addresses are heap-allocated C structures with manual lifetimes.
    /// In Rust, `Vec<Address>` is `Clone`, and release is simply the
    /// list going out of scope -- there is no separate `free_list`
    /// operation to implement, only the ordinary `Drop` every `Vec`
    /// already gets for free.
    pub fn clone_list(list: &[Address]) -> Vec<Address> {
        list.to_vec()
    }

    /// Serializes to the layout documented in SPEC_FULL.md §4.5:
    /// native-endian `family` (i32), native-endian `socktype` (i32),
    /// native-endian `namelen` (u32), then `namelen` raw bytes. Used
    /// only for local IPC between processes on the same machine, so
    /// native endianness is the correct, and simplest, choice.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.name.len());
        buf.extend_from_slice(&self.family.to_ne_bytes());
        buf.extend_from_slice(&self.socktype.to_ne_bytes());
        buf.extend_from_slice(&(self.name.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&self.name);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() < HEADER_LEN {
            return Err(AddressError::Truncated {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }
        let family = i32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        let socktype = i32::from_ne_bytes(bytes[4..8].try_into().unwrap());
        let namelen = u32::from_ne_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let remaining = &bytes[HEADER_LEN..];
        if remaining.len() != namelen {
            return Err(AddressError::LengthMismatch {
                declared: namelen,
                remaining: remaining.len(),
            });
        }
        Ok(Address {
            family,
            socktype,
            name: remaining.to_vec(),
        })
    }

    /// Pretty-prints per the family-specific rules in SPEC_FULL.md §4.5.
    pub fn pretty(&self) -> String {
        match self.to_socket_addr() {
            Some(SocketAddr::V4(v4)) => format!("[{}]:{}", v4.ip(), v4.port()),
            Some(SocketAddr::V6(v6)) => format!("[{}]:{}", v6.ip(), v6.port()),
            None => match self.to_unix_path() {
                Some(path) => path.display().to_string(),
                None => "Unknown address".to_owned(),
            },
        }
    }
}

/// Returns the raw bytes of a `repr(C)` struct.
///
/// Safe because every caller passes a plain-old-data libc sockaddr
/// struct (no padding bytes are read as anything but opaque storage,
/// and the resulting `Vec` is only ever interpreted by `bytes_to_struct`
/// with the matching type).
fn struct_bytes<T: Copy>(value: &T) -> Vec<u8> {
    let bytes =
        unsafe { std::slice::from_raw_parts(value as *const T as *const u8, mem::size_of::<T>()) };
    bytes.to_vec()
}

/// The inverse of `struct_bytes`: reinterprets a byte slice as `T` if
/// the length matches exactly.
fn bytes_to_struct<T: Copy>(bytes: &[u8]) -> Option<T> {
    if bytes.len() != mem::size_of::<T>() {
        return None;
    }
    let mut value: T = unsafe { mem::zeroed() };
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), &mut value as *mut T as *mut u8, bytes.len());
    }
    Some(value)
}
