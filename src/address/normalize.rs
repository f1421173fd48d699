//! Address-string normalizer (SPEC_FULL.md §4.6).
//!
//! Purely lexical: turns a possibly port-less, possibly bracketed user
//! string into a canonical form suitable for handing to a resolver. It
//! does not validate that the result actually names a reachable host.

/// Normalizes `input` per the classification rules in SPEC_FULL.md §4.6.
///
/// The source's equivalent returns an allocated string and can fail with
/// `ResourceExhausted` if that allocation fails. Rust's `String`
/// allocator aborts the process on exhaustion rather than returning an
/// error, so there is no recoverable failure mode left to surface here;
/// this function is accordingly infallible, in contrast to the C
/// contract -- a deliberate, recorded translation (see DESIGN.md).
pub fn normalize(input: &str) -> String {
    if input.starts_with('/') {
        return input.to_owned();
    }

    let first_colon = match input.find(':') {
        None => return format!("{input}:0"),
        Some(idx) => idx,
    };
    let last_colon = input.rfind(':').expect("already found one colon");
    if first_colon == last_colon {
        // Exactly one colon: IPv4-with-port, already canonical.
        return input.to_owned();
    }

    // More than one colon: IPv6-shaped.
    match input.rfind(']') {
        None => format!("[{input}]:0"),
        Some(r) if r == input.len() - 1 => format!("{input}:0"),
        Some(_) => input.to_owned(),
    }
}

/// Alias kept for call sites that prefer a name mirroring the source
/// function's emphasis on "produces a string for the resolver".
pub fn normalize_to_string(input: &str) -> String {
    normalize(input)
}
