// Каскад: цепочка шагов шифрования
//
// A cascade encrypts the caller's message under a one-time key, that key
// under the next one-time key, and so on, until the last (anchor) step
// encrypts under the caller's own keys:
//
//   layer 0          layer 1               layer n-1 (anchor)
//   ┌──────────┐     ┌──────────────┐      ┌──────────────────┐
//   │ message  │ K0  │ secret of K0 │ K1   │ secret of Kn-2   │ external keys
//   └──────────┘     └──────────────┘      └──────────────────┘
//
// Decryption peels the layers in reverse.

pub mod decryption;
pub mod encryption;
pub mod procedure;

pub use decryption::{decrypt_cascade, decrypt_layer};
pub use encryption::{encrypt_step, EncryptionPlan, PlannedStep};
pub use procedure::{EncryptSpec, OnetimeKey, Procedure, ResolvedSign, SignSpec, StepConfig};
