//! # veilmatch-ingress
//!
//! **Order Intake Plane**: turns opaque ledger commitments into staged,
//! revealed orders and freezes them into matching tasks.
//!
//! ## Architecture
//!
//! 1. **CommitmentFeed**: per-pool stream of new commitments (sequence numbered)
//! 2. **PayloadCipher**: opens `nonce || ciphertext` payloads (AES-256-GCM by default)
//! 3. **OrderIntake**: validates binding, amounts, pool, and epoch window
//! 4. **PendingPool**: per-pool staged orders awaiting the next task
//! 5. **TaskSealer**: freezes a pending set into an immutable `MatchingTask`
//!
//! ## Order Flow
//!
//! ```text
//! CommitmentFeed → OrderIntake.stage() → PendingPool.push()
//!     → TaskSealer.seal() → MatchingTask → MatchCore
//! ```
//!
//! A rejected commitment is never dropped silently: `stage` returns the
//! reason and the caller marks the commitment `Disputed`.

pub mod cipher;
pub mod feed;
pub mod intake;
pub mod pending_pool;
pub mod task_sealer;

pub use cipher::{AesGcmCipher, PayloadCipher};
pub use feed::CommitmentFeed;
pub use intake::{CarryOutcome, OrderIntake};
pub use pending_pool::PendingPool;
pub use task_sealer::TaskSealer;
