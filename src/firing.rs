// SPDX-License-Identifier: Apache-2.0

//! Firing slot traversal order.
//!
//! The sensor does not fire lasers in row-major packet order. With modern
//! firmware the blocks form pairs (0,1), (2,3), ... (10,11) where each pair
//! captures the upper and lower bank of the same firing window: the laser
//! index is held while both blocks of the pair are visited, then advances.
//! Legacy firmware fires banks sequentially, one full block at a time.

use crate::packet::{LASERS_PER_BLOCK, PacketLayout, SLOTS_PER_PACKET};

/// One (block, laser) firing position within a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub block: usize,
    pub laser: usize,
}

/// Iterator over the 384 firing slots of one packet in hardware order.
///
/// Every slot is produced exactly once per packet; [`FiringSequence::restart`]
/// rewinds for the next packet.
#[derive(Clone, Debug)]
pub struct FiringSequence {
    layout: PacketLayout,
    idx: usize,
}

impl FiringSequence {
    pub fn new(layout: PacketLayout) -> Self {
        Self { layout, idx: 0 }
    }

    /// A sequence with no remaining slots; the owning stream starts here so
    /// its first read fetches a packet.
    pub fn exhausted(layout: PacketLayout) -> Self {
        Self {
            layout,
            idx: SLOTS_PER_PACKET,
        }
    }

    /// Rewind to the first slot of a fresh packet.
    pub fn restart(&mut self) {
        self.idx = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.idx >= SLOTS_PER_PACKET
    }

    fn slot_at(&self, idx: usize) -> Slot {
        match self.layout {
            PacketLayout::Modern => {
                // Pair-interleaved: (even, laser), (odd, laser) for each
                // laser before the pair advances.
                let pair = idx / (2 * LASERS_PER_BLOCK);
                let within = idx % (2 * LASERS_PER_BLOCK);
                Slot {
                    block: pair * 2 + within % 2,
                    laser: within / 2,
                }
            }
            PacketLayout::Legacy => Slot {
                block: idx / LASERS_PER_BLOCK,
                laser: idx % LASERS_PER_BLOCK,
            },
        }
    }
}

impl Iterator for FiringSequence {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.idx >= SLOTS_PER_PACKET {
            return None;
        }
        let slot = self.slot_at(self.idx);
        self.idx += 1;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::BLOCKS_PER_PACKET;

    #[test]
    fn test_modern_order_prefix() {
        // Reference ordering from the pairing rule: upper then lower bank of
        // the first pair for each laser, then the next pair.
        let mut seq = FiringSequence::new(PacketLayout::Modern);
        let expected = [
            (0, 0),
            (1, 0),
            (0, 1),
            (1, 1),
            (0, 2),
            (1, 2),
        ];
        for &(block, laser) in &expected {
            assert_eq!(seq.next(), Some(Slot { block, laser }));
        }

        // Slot 64 starts the second pair.
        let slots: Vec<_> = FiringSequence::new(PacketLayout::Modern).collect();
        assert_eq!(slots[63], Slot { block: 1, laser: 31 });
        assert_eq!(slots[64], Slot { block: 2, laser: 0 });
        assert_eq!(slots[383], Slot { block: 11, laser: 31 });
    }

    #[test]
    fn test_legacy_order_is_sequential() {
        let slots: Vec<_> = FiringSequence::new(PacketLayout::Legacy).collect();
        assert_eq!(slots[0], Slot { block: 0, laser: 0 });
        assert_eq!(slots[31], Slot { block: 0, laser: 31 });
        assert_eq!(slots[32], Slot { block: 1, laser: 0 });
        assert_eq!(slots[383], Slot { block: 11, laser: 31 });
    }

    #[test]
    fn test_each_slot_visited_exactly_once() {
        for layout in [PacketLayout::Modern, PacketLayout::Legacy] {
            let mut seen = [[false; LASERS_PER_BLOCK]; BLOCKS_PER_PACKET];
            let mut count = 0;
            for slot in FiringSequence::new(layout) {
                assert!(!seen[slot.block][slot.laser], "slot revisited: {:?}", slot);
                seen[slot.block][slot.laser] = true;
                count += 1;
            }
            assert_eq!(count, SLOTS_PER_PACKET);
        }
    }

    #[test]
    fn test_restart_and_exhausted() {
        let mut seq = FiringSequence::exhausted(PacketLayout::Modern);
        assert!(seq.is_exhausted());
        assert_eq!(seq.next(), None);

        seq.restart();
        assert!(!seq.is_exhausted());
        assert_eq!(seq.next(), Some(Slot { block: 0, laser: 0 }));
    }
}
