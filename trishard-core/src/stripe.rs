//! Rotating-parity block coding
//!
//! Implements the per-block transforms of the three-shard layout:
//! - a chunk of up to 2·B bytes becomes a primary, a secondary and a parity
//!   fragment of up to B bytes each
//! - any two fragments plus the tail padding reproduce the chunk
//! - the parity role rotates over the three shards, one step per block

use crate::error::{Result, TriShardError};
use crate::{BLOCK_SIZE, CHUNK_SIZE, SHARD_COUNT, STRIPE_SIZE};
use serde::Serialize;

/// Role a physical shard plays for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    /// First B bytes of the chunk
    Primary,
    /// Remaining bytes of the chunk, empty on a short final block
    Secondary,
    /// XOR of primary and secondary, sentinel complement past the secondary
    Parity,
}

impl Role {
    pub const ALL: [Role; SHARD_COUNT] = [Role::Primary, Role::Secondary, Role::Parity];

    /// Slot of this role inside a [`Stripe`]
    pub fn slot(self) -> usize {
        match self {
            Role::Primary => 0,
            Role::Secondary => 1,
            Role::Parity => 2,
        }
    }
}

/// Shard holding the parity for `block`
pub fn parity_shard(block: u64) -> usize {
    (block % SHARD_COUNT as u64) as usize
}

/// Physical shard index holding `role` for `block`
///
/// Shared by split and merge; the whole layout hinges on both sides
/// computing the same mapping from the block counter alone.
pub fn role_for(block: u64, role: Role) -> usize {
    let parity = parity_shard(block);
    match role {
        Role::Parity => parity,
        Role::Primary => (parity + 1) % SHARD_COUNT,
        Role::Secondary => (parity + 2) % SHARD_COUNT,
    }
}

/// Role held by `shard` for `block`
pub fn role_of(block: u64, shard: usize) -> Role {
    let parity = parity_shard(block);
    match (shard + SHARD_COUNT - parity) % SHARD_COUNT {
        0 => Role::Parity,
        1 => Role::Primary,
        _ => Role::Secondary,
    }
}

/// Working buffer for one block: three fragments of up to B bytes each,
/// stored at offsets 0, B and 2·B, indexed by [`Role`].
pub struct Stripe {
    data: Vec<u8>,
    lens: [usize; SHARD_COUNT],
}

impl Stripe {
    /// Allocate a zeroed stripe, reporting allocation failure instead of aborting
    pub fn allocate() -> Result<Self> {
        Ok(Self {
            data: allocate_buffer(STRIPE_SIZE)?,
            lens: [0; SHARD_COUNT],
        })
    }

    /// Declared length of a fragment
    pub fn len(&self, role: Role) -> usize {
        self.lens[role.slot()]
    }

    pub fn lens(&self) -> [usize; SHARD_COUNT] {
        self.lens
    }

    pub fn set_len(&mut self, role: Role, len: usize) {
        debug_assert!(len <= BLOCK_SIZE);
        self.lens[role.slot()] = len;
    }

    /// Fragment bytes up to the declared length
    pub fn fragment(&self, role: Role) -> &[u8] {
        let start = role.slot() * BLOCK_SIZE;
        &self.data[start..start + self.len(role)]
    }

    /// The full B-byte slot of a role, for filling it from a reader
    pub fn slot_mut(&mut self, role: Role) -> &mut [u8] {
        let start = role.slot() * BLOCK_SIZE;
        &mut self.data[start..start + BLOCK_SIZE]
    }

    /// Sum of the three fragment lengths
    pub fn total_len(&self) -> usize {
        self.lens.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn clear(&mut self) {
        self.lens = [0; SHARD_COUNT];
    }
}

/// Allocate a zeroed buffer of `len` bytes
pub fn allocate_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| TriShardError::OutOfMemory { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Split one chunk into primary, secondary and parity fragments.
///
/// Chunks longer than B put the first B bytes in the primary and the rest in
/// the secondary; parity is their XOR where both exist and the complement of
/// the primary where the secondary has no byte. Shorter chunks leave the
/// secondary empty.
///
/// # Panics
///
/// If `chunk` is longer than 2·B.
pub fn split_block(chunk: &[u8], stripe: &mut Stripe) {
    assert!(
        chunk.len() <= CHUNK_SIZE,
        "chunk of {} bytes exceeds {} byte limit",
        chunk.len(),
        CHUNK_SIZE
    );

    let primary_len = chunk.len().min(BLOCK_SIZE);
    let secondary_len = chunk.len() - primary_len;
    let (primary, rest) = stripe.data.split_at_mut(BLOCK_SIZE);
    let (secondary, parity) = rest.split_at_mut(BLOCK_SIZE);

    primary[..primary_len].copy_from_slice(&chunk[..primary_len]);
    secondary[..secondary_len].copy_from_slice(&chunk[primary_len..]);

    for i in 0..secondary_len {
        parity[i] = primary[i] ^ secondary[i];
    }
    for i in secondary_len..primary_len {
        parity[i] = !primary[i];
    }

    stripe.lens = [primary_len, secondary_len, primary_len];
}

/// Rebuild one chunk from a stripe into `out`, returning its length.
///
/// `parity` is the shard holding the parity role for this block and `dead`
/// the shard that must not be used. `missing` is the tail padding of the
/// final block and zero for every other block. `out` must hold 2·B bytes.
pub fn merge_block(
    stripe: &Stripe,
    parity: usize,
    dead: usize,
    missing: usize,
    out: &mut [u8],
) -> Option<usize> {
    if parity >= SHARD_COUNT || dead >= SHARD_COUNT || out.len() < CHUNK_SIZE {
        return None;
    }

    let primary = stripe.fragment(Role::Primary);
    let secondary = stripe.fragment(Role::Secondary);
    let parity_bytes = stripe.fragment(Role::Parity);

    if dead == parity {
        // Both data fragments survived
        out[..primary.len()].copy_from_slice(primary);
        out[primary.len()..primary.len() + secondary.len()].copy_from_slice(secondary);
        return Some(primary.len() + secondary.len());
    }

    if (dead + 1) % SHARD_COUNT == parity {
        // Secondary lost
        let recovered = primary.len().checked_sub(missing)?;
        if parity_bytes.len() < recovered {
            return None;
        }
        out[..primary.len()].copy_from_slice(primary);
        let tail = &mut out[primary.len()..primary.len() + recovered];
        for (i, byte) in tail.iter_mut().enumerate() {
            *byte = primary[i] ^ parity_bytes[i];
        }
        return Some(primary.len() + recovered);
    }

    // Only the primary-lost case remains: (dead + 2) % 3 == parity
    if secondary.len() > parity_bytes.len() {
        return None;
    }
    let primary_len = parity_bytes.len();
    for i in 0..secondary.len() {
        out[i] = secondary[i] ^ parity_bytes[i];
    }
    for i in secondary.len()..primary_len {
        out[i] = parity_bytes[i] ^ 0xFF;
    }
    out[primary_len..primary_len + secondary.len()].copy_from_slice(secondary);
    Some(primary_len + secondary.len())
}

/// Same as [`merge_block`], reporting an invalid combination as an error
pub fn merge_block_checked(
    stripe: &Stripe,
    block: u64,
    dead: usize,
    missing: usize,
    out: &mut [u8],
) -> Result<usize> {
    let parity = parity_shard(block);
    merge_block(stripe, parity, dead, missing, out)
        .ok_or(TriShardError::Reconstruction { block, dead, parity })
}

/// Check that the parity fragment matches the two data fragments
pub fn verify_parity(stripe: &Stripe) -> bool {
    let primary = stripe.fragment(Role::Primary);
    let secondary = stripe.fragment(Role::Secondary);
    let parity = stripe.fragment(Role::Parity);

    if parity.len() != primary.len() || secondary.len() > primary.len() {
        return false;
    }
    let (covered, uncovered) = primary.split_at(secondary.len());
    let xor_ok = covered
        .iter()
        .zip(secondary)
        .zip(parity)
        .all(|((p, s), x)| p ^ s == *x);
    let sentinel_ok = uncovered
        .iter()
        .zip(&parity[secondary.len()..])
        .all(|(p, x)| !p == *x);
    xor_ok && sentinel_ok
}
