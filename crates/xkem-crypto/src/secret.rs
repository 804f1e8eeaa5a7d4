//! Scoped secret containers for the KEM shared secret and the content key
//!
//! Both types overwrite their storage with zeros when dropped, so every exit
//! path of the owning operation (return, `?`, panic unwinding, or a cancelled
//! future being dropped) wipes them. The engine additionally calls [`wipe`]
//! at the exact point a secret stops being needed.
//!
//! Neither type is `Clone`, and `Debug` never prints the bytes.
//!
//! [`wipe`]: ContentKey::wipe

use zeroize::Zeroize;

use crate::KEY_SIZE;

macro_rules! secret_bytes {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            /// Copy `slice` in, failing if it is not exactly 32 bytes.
            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                let bytes: [u8; KEY_SIZE] = slice.try_into().ok()?;
                Some(Self { bytes })
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }

            /// Overwrite the backing storage with zeros.
            pub fn wipe(&mut self) {
                self.bytes.zeroize();
            }

            pub fn is_wiped(&self) -> bool {
                self.bytes.iter().all(|b| *b == 0)
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

secret_bytes!(
    /// 32-byte KEM shared secret. Lives only until the content key is derived.
    SharedSecret
);

secret_bytes!(
    /// 256-bit AES-GCM content-encryption key for one container.
    ContentKey
);
