//! Cookie-signing key stores and the signer built on them.
//!
//! A store hands out the current ordered key list: the first key signs new
//! cookies, every key is tried when verifying. Rotating means publishing a
//! new list with the fresh key in front and the retiring ones behind it.
//!
//! | Store | Rotation | Readers |
//! |---|---|---|
//! | [`SimpleSignedKeys`] | `&mut self` only, before sharing | no synchronization |
//! | [`RwLockSignedKeys`] | [`RotateKeys::set_keys`] | shared lock per read |
//! | [`AtomicSignedKeys`] | [`RotateKeys::set_keys`] | lock-free load |
//!
//! Every store swaps a whole `Arc<Vec<String>>`, so a reader holds either
//! the complete old list or the complete new one.

use std::sync::Arc;

use arc_swap::ArcSwap;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::RwLock;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Suffix of the companion cookie carrying a signature.
pub const SIGNED_COOKIE_SUFFIX: &str = ".sig";

/// Read access to the current signing keys.
pub trait SignedKeysGenerator: Send + Sync {
    fn get_keys(&self) -> Arc<Vec<String>>;
}

/// Key stores that can be rotated while shared across requests.
pub trait RotateKeys: SignedKeysGenerator {
    /// Replaces the whole key list at once.
    fn set_keys(&self, keys: Vec<String>);
}

// ── Stores ────────────────────────────────────────────────────────────────────

/// Keys fixed once the store is shared.
///
/// Rotation needs exclusive access, so it can only happen before the store
/// is handed to [`App::signed_keys`](crate::App::signed_keys) (or while the
/// caller otherwise owns it).
#[derive(Debug, Default)]
pub struct SimpleSignedKeys {
    keys: Arc<Vec<String>>,
}

impl SimpleSignedKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: Arc::new(keys) }
    }

    pub fn set_keys(&mut self, keys: Vec<String>) {
        self.keys = Arc::new(keys);
    }
}

impl SignedKeysGenerator for SimpleSignedKeys {
    fn get_keys(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.keys)
    }
}

/// Keys behind a read/write lock.
#[derive(Debug, Default)]
pub struct RwLockSignedKeys {
    keys: RwLock<Arc<Vec<String>>>,
}

impl RwLockSignedKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: RwLock::new(Arc::new(keys)) }
    }
}

impl SignedKeysGenerator for RwLockSignedKeys {
    fn get_keys(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.keys.read())
    }
}

impl RotateKeys for RwLockSignedKeys {
    fn set_keys(&self, keys: Vec<String>) {
        *self.keys.write() = Arc::new(keys);
    }
}

/// Copy-on-write keys published through an atomic pointer swap.
///
/// The recommended store for read-heavy, rotate-rarely workloads.
#[derive(Debug, Default)]
pub struct AtomicSignedKeys {
    keys: ArcSwap<Vec<String>>,
}

impl AtomicSignedKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys: ArcSwap::from_pointee(keys) }
    }
}

impl SignedKeysGenerator for AtomicSignedKeys {
    fn get_keys(&self) -> Arc<Vec<String>> {
        self.keys.load_full()
    }
}

impl RotateKeys for AtomicSignedKeys {
    fn set_keys(&self, keys: Vec<String>) {
        self.keys.store(Arc::new(keys));
    }
}

// ── Keygrip ───────────────────────────────────────────────────────────────────

/// Signs with the first key and verifies against all of them.
#[derive(Clone, Copy, Debug)]
pub struct Keygrip<'a> {
    keys: &'a [String],
}

impl<'a> Keygrip<'a> {
    pub fn new(keys: &'a [String]) -> Self {
        Self { keys }
    }

    /// The URL-safe base64 HMAC-SHA256 of `data` under the first key, or
    /// `None` when there are no keys.
    pub fn sign(&self, data: &[u8]) -> Option<String> {
        let key = self.keys.first()?;
        Some(URL_SAFE_NO_PAD.encode(hmac_sha256(key.as_bytes(), data)?))
    }

    /// Position of the first key whose signature of `data` equals `signature`.
    pub fn index(&self, data: &[u8], signature: &str) -> Option<usize> {
        let expected = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.keys
            .iter()
            .position(|key| {
                hmac_sha256(key.as_bytes(), data)
                    .is_some_and(|mac| constant_time_eq::constant_time_eq(&mac, &expected))
            })
    }

    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        self.index(data, signature).is_some()
    }
}

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], message: &[u8]) -> Option<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Some(out)
}
