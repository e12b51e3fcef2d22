//! Shared-memory command ring.
//!
//! A bounded multi-producer single-consumer queue over a file mapping
//! (default directory `/dev/shm`), keyed by a system-wide integer. The
//! header records who created the segment: a consumer opening an existing
//! ring must present the same owner tag, otherwise the open fails and the
//! engine aborts rather than scribble over a foreign process's memory.
//! Stale segment cleanup is a manual operator step (`rm /dev/shm/trader-cmd-*`).
//!
//! Layout:
//!
//! ```text
//! 0    u32  ring magic (layout version marker)
//! 4    u32  owner tag
//! 8    u32  element size
//! 12   u32  capacity (power of two)
//! 64   u64  head — consumer cursor
//! 128  u64  tail — producer cursor
//! 192  slots[capacity] of { seq: u64, data: [u8; element size] }
//! ```
//!
//! Head and tail sit on their own cache lines. Slots carry a sequence
//! number (bounded-queue discipline): a producer may claim slot `pos` when
//! `seq == pos`, publishes with `seq = pos + 1`, and the consumer returns
//! the slot with `seq = pos + capacity`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;
use thiserror::Error;

use crate::command::COMMAND_FRAME_LEN;

const RING_MAGIC: u32 = 0x5452_4351; // "TRCQ"
pub const DEFAULT_RING_CAPACITY: usize = 16384;

const HEAD_OFF: usize = 64;
const TAIL_OFF: usize = 128;
const SLOTS_OFF: usize = 192;
const SLOT_SEQ_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("segment is not a command ring (magic {found:#x})")]
    BadMagic { found: u32 },

    #[error("segment owned by tag {found}, expected {expected}")]
    OwnerMismatch { found: u32, expected: u32 },

    #[error("segment layout mismatch: element size {elem_size}, capacity {capacity}")]
    LayoutMismatch { elem_size: u32, capacity: u32 },

    #[error("segment truncated: {len} bytes, need {need}")]
    TruncatedSegment { len: usize, need: usize },

    #[error("capacity {0} is not a power of two")]
    BadCapacity(usize),

    #[error("ring is full")]
    Full,
}

#[derive(Debug)]
pub struct CommandRing {
    mmap: MmapMut,
    capacity: u64,
    elem_size: usize,
    path: PathBuf,
}

impl CommandRing {
    /// File name for a given channel key.
    pub fn path_for(dir: &Path, key: u32) -> PathBuf {
        dir.join(format!("trader-cmd-{key}"))
    }

    /// Create a fresh ring. Fails if the segment already exists.
    pub fn create(dir: &Path, key: u32, owner_tag: u32, capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::BadCapacity(capacity));
        }
        let path = Self::path_for(dir, key);
        let elem_size = COMMAND_FRAME_LEN;
        let slot_size = SLOT_SEQ_LEN + elem_size;
        let total = SLOTS_OFF + capacity * slot_size;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(total as u64)?;
        // SAFETY: the mapping is private to processes that agree on this
        // layout; all concurrent access below goes through atomics.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        mmap[0..4].copy_from_slice(&RING_MAGIC.to_le_bytes());
        mmap[4..8].copy_from_slice(&owner_tag.to_le_bytes());
        mmap[8..12].copy_from_slice(&(elem_size as u32).to_le_bytes());
        mmap[12..16].copy_from_slice(&(capacity as u32).to_le_bytes());

        let ring = Self {
            mmap,
            capacity: capacity as u64,
            elem_size,
            path,
        };
        for i in 0..capacity as u64 {
            ring.slot_seq(i).store(i, Ordering::Relaxed);
        }
        ring.head().store(0, Ordering::Relaxed);
        ring.tail().store(0, Ordering::Release);
        Ok(ring)
    }

    /// Attach to an existing ring, verifying creator identity and layout.
    pub fn open(dir: &Path, key: u32, owner_tag: u32) -> Result<Self, RingError> {
        let path = Self::path_for(dir, key);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        // SAFETY: see `create`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        if mmap.len() < SLOTS_OFF {
            return Err(RingError::TruncatedSegment {
                len: mmap.len(),
                need: SLOTS_OFF,
            });
        }
        let magic = u32::from_le_bytes(mmap[0..4].try_into().unwrap());
        if magic != RING_MAGIC {
            return Err(RingError::BadMagic { found: magic });
        }
        let found_tag = u32::from_le_bytes(mmap[4..8].try_into().unwrap());
        if found_tag != owner_tag {
            return Err(RingError::OwnerMismatch {
                found: found_tag,
                expected: owner_tag,
            });
        }
        let elem_size = u32::from_le_bytes(mmap[8..12].try_into().unwrap());
        let capacity = u32::from_le_bytes(mmap[12..16].try_into().unwrap());
        if elem_size as usize != COMMAND_FRAME_LEN
            || capacity == 0
            || !capacity.is_power_of_two()
        {
            return Err(RingError::LayoutMismatch {
                elem_size,
                capacity,
            });
        }
        let need = SLOTS_OFF + capacity as usize * (SLOT_SEQ_LEN + elem_size as usize);
        if mmap.len() < need {
            return Err(RingError::TruncatedSegment {
                len: mmap.len(),
                need,
            });
        }

        Ok(Self {
            mmap,
            capacity: capacity as u64,
            elem_size: elem_size as usize,
            path,
        })
    }

    /// Consumer attach path: open the segment, creating it on first use.
    /// Any ownership or layout conflict stays fatal.
    pub fn open_or_create(
        dir: &Path,
        key: u32,
        owner_tag: u32,
        capacity: usize,
    ) -> Result<Self, RingError> {
        match Self::open(dir, key, owner_tag) {
            Ok(ring) => Ok(ring),
            Err(RingError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::create(dir, key, owner_tag, capacity)
            }
            Err(e) => Err(e),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every entry currently in the ring. The consumer calls this once
    /// after attaching so stale commands from a previous run never execute.
    /// Draining slot by slot keeps the slot sequences consistent; jumping
    /// the head cursor would leave full markers behind and wedge producers
    /// after the first wraparound.
    pub fn reset(&mut self) -> usize {
        let mut dropped = 0;
        let mut scratch = [0u8; COMMAND_FRAME_LEN];
        while self.pop(&mut scratch) {
            dropped += 1;
        }
        dropped
    }

    /// Publish one frame. Lock-free; safe to call from multiple producer
    /// threads or processes concurrently.
    pub fn push(&self, frame: &[u8]) -> Result<(), RingError> {
        debug_assert_eq!(frame.len(), self.elem_size);
        let mask = self.capacity - 1;
        let tail = self.tail();
        loop {
            let pos = tail.load(Ordering::Relaxed);
            let seq = self.slot_seq(pos & mask).load(Ordering::Acquire);
            let diff = seq as i64 - pos as i64;
            if diff == 0 {
                if tail
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: the CAS above made this slot exclusively ours
                    // until the sequence store publishes it.
                    unsafe {
                        ptr::copy_nonoverlapping(
                            frame.as_ptr(),
                            self.slot_data_ptr(pos & mask),
                            self.elem_size,
                        );
                    }
                    self.slot_seq(pos & mask).store(pos + 1, Ordering::Release);
                    return Ok(());
                }
            } else if diff < 0 {
                return Err(RingError::Full);
            }
            // Another producer claimed this position first; retry.
        }
    }

    /// Pop one frame. Single consumer only (enforced by `&mut self`).
    pub fn pop(&mut self, out: &mut [u8]) -> bool {
        debug_assert_eq!(out.len(), self.elem_size);
        let mask = self.capacity - 1;
        let pos = self.head().load(Ordering::Relaxed);
        let seq = self.slot_seq(pos & mask).load(Ordering::Acquire);
        if seq != pos + 1 {
            // Empty, or a producer claimed the slot but has not published.
            return false;
        }
        // SAFETY: the Acquire load above synchronizes with the producer's
        // Release store, so the slot bytes are fully written.
        unsafe {
            ptr::copy_nonoverlapping(self.slot_data_ptr(pos & mask), out.as_mut_ptr(), self.elem_size);
        }
        self.slot_seq(pos & mask)
            .store(pos + self.capacity, Ordering::Release);
        self.head().store(pos + 1, Ordering::Release);
        true
    }

    fn head(&self) -> &AtomicU64 {
        self.atomic_at(HEAD_OFF)
    }

    fn tail(&self) -> &AtomicU64 {
        self.atomic_at(TAIL_OFF)
    }

    fn slot_seq(&self, idx: u64) -> &AtomicU64 {
        self.atomic_at(SLOTS_OFF + idx as usize * (SLOT_SEQ_LEN + self.elem_size))
    }

    fn slot_data_ptr(&self, idx: u64) -> *mut u8 {
        let off = SLOTS_OFF + idx as usize * (SLOT_SEQ_LEN + self.elem_size) + SLOT_SEQ_LEN;
        unsafe { self.mmap.as_ptr().add(off) as *mut u8 }
    }

    fn atomic_at(&self, off: usize) -> &AtomicU64 {
        debug_assert_eq!(off % 8, 0);
        // SAFETY: `off` is within the mapping (checked at open/create), is
        // 8-aligned relative to the page-aligned base, and all parties
        // access these words through atomics only.
        unsafe { &*(self.mmap.as_ptr().add(off) as *const AtomicU64) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandBody, StrategyId, TraderCommand};

    fn cancel_cmd(id: u64) -> [u8; COMMAND_FRAME_LEN] {
        TraderCommand {
            strategy_id: StrategyId::new("t"),
            body: CommandBody::CancelOrder {
                engine_order_id: id,
            },
        }
        .encode()
    }

    #[test]
    fn push_pop_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = CommandRing::create(dir.path(), 1, 100, 8).unwrap();

        ring.push(&cancel_cmd(1)).unwrap();
        ring.push(&cancel_cmd(2)).unwrap();

        let mut out = [0u8; COMMAND_FRAME_LEN];
        assert!(ring.pop(&mut out));
        assert_eq!(out, cancel_cmd(1));
        assert!(ring.pop(&mut out));
        assert_eq!(out, cancel_cmd(2));
        assert!(!ring.pop(&mut out));
    }

    #[test]
    fn full_ring_rejects_push() {
        let dir = tempfile::tempdir().unwrap();
        let ring = CommandRing::create(dir.path(), 2, 100, 4).unwrap();
        for i in 0..4 {
            ring.push(&cancel_cmd(i)).unwrap();
        }
        assert!(matches!(ring.push(&cancel_cmd(99)), Err(RingError::Full)));
    }

    #[test]
    fn survives_wraparound() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = CommandRing::create(dir.path(), 3, 100, 4).unwrap();
        let mut out = [0u8; COMMAND_FRAME_LEN];
        for round in 0..25u64 {
            ring.push(&cancel_cmd(round)).unwrap();
            assert!(ring.pop(&mut out));
            assert_eq!(out, cancel_cmd(round));
        }
        assert!(!ring.pop(&mut out));
    }

    #[test]
    fn owner_tag_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        CommandRing::create(dir.path(), 4, 100, 8).unwrap();
        match CommandRing::open(dir.path(), 4, 200) {
            Err(RingError::OwnerMismatch { found, expected }) => {
                assert_eq!(found, 100);
                assert_eq!(expected, 200);
            }
            other => panic!("expected owner mismatch, got {other:?}"),
        }
        // And open_or_create must not silently recreate it.
        assert!(CommandRing::open_or_create(dir.path(), 4, 200, 8).is_err());
    }

    #[test]
    fn garbage_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = CommandRing::path_for(dir.path(), 5);
        std::fs::write(&path, vec![0xABu8; 4096]).unwrap();
        assert!(matches!(
            CommandRing::open(dir.path(), 5, 100),
            Err(RingError::BadMagic { .. })
        ));
    }

    #[test]
    fn reset_drops_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ring = CommandRing::create(dir.path(), 6, 100, 8).unwrap();
            ring.push(&cancel_cmd(1)).unwrap();
            ring.push(&cancel_cmd(2)).unwrap();
        }
        // A new consumer attaches to the same segment and resets.
        let mut ring = CommandRing::open_or_create(dir.path(), 6, 100, 8).unwrap();
        assert_eq!(ring.reset(), 2);
        let mut out = [0u8; COMMAND_FRAME_LEN];
        assert!(!ring.pop(&mut out));
        // The ring stays usable after the drain.
        ring.push(&cancel_cmd(3)).unwrap();
        assert!(ring.pop(&mut out));
        assert_eq!(out, cancel_cmd(3));
    }

    #[test]
    fn concurrent_producers_deliver_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut ring = CommandRing::create(dir.path(), 7, 100, 1024).unwrap();
        let path = dir.path().to_path_buf();

        let handles: Vec<_> = (0..4u64)
            .map(|p| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let producer = CommandRing::open(&path, 7, 100).unwrap();
                    for i in 0..100u64 {
                        producer.push(&cancel_cmd(p * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        let mut out = [0u8; COMMAND_FRAME_LEN];
        while seen.len() < 400 {
            if ring.pop(&mut out) {
                match TraderCommand::decode(&out).unwrap().body {
                    CommandBody::CancelOrder { engine_order_id } => seen.push(engine_order_id),
                    other => panic!("unexpected body {other:?}"),
                }
            } else {
                std::thread::yield_now();
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 400);
    }
}
