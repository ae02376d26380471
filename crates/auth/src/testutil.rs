//! Fixture keys and builders shared by this crate's tests and downstream
//! crates (enable the `testutil` feature).

use std::sync::Arc;

use chrono::Duration;

use crate::{KeyStore, MemoryKeySource, TokenCodec};

/// PKCS#8 RSA-2048 key.
pub const ALPHA_PEM: &str = include_str!("../testdata/keys/alpha.pem");
/// PKCS#8 RSA-2048 key.
pub const BRAVO_PEM: &str = include_str!("../testdata/keys/bravo.pem");
/// PKCS#1 RSA-2048 key.
pub const CHARLIE_PEM: &str = include_str!("../testdata/keys/charlie.pem");

pub const ISSUER: &str = "medisync-test";

/// Directory holding the fixture `.pem` files.
pub fn fixture_dir() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/keys")
}

/// Source with kids `alpha`, `bravo` and `charlie`.
pub fn fixture_source() -> MemoryKeySource {
    MemoryKeySource::new()
        .with_key("alpha", ALPHA_PEM)
        .with_key("bravo", BRAVO_PEM)
        .with_key("charlie", CHARLIE_PEM)
}

#[allow(clippy::expect_used)]
pub fn fixture_store(active_kid: &str) -> Arc<KeyStore> {
    Arc::new(KeyStore::load(&fixture_source(), active_kid).expect("fixture keys parse"))
}

/// Codec over the fixture keys with [`ISSUER`] and a one-hour TTL.
pub fn fixture_codec(active_kid: &str) -> TokenCodec {
    TokenCodec::new(fixture_store(active_kid), ISSUER, Duration::hours(1))
}
