use crate::Cycle;

/// Bytes occupied by one limb (one RNS residue of a full vector): 64K
/// coefficients of 28 bits.
pub const LIMB_BYTES: usize = (64 * 1024 * 28) / 8; // 224 KiB

/// Bytes occupied by a scalar memory location: 2048 coefficients of 28 bits.
pub const SCALAR_BYTES: usize = (2048 * 28) / 8; // 7 KiB

/// Fixed operation latencies, in core cycles.
///
/// Everything here is derived from the vector depth and the element width
/// at construction; the table is shared read-only by every queue and unit.
#[derive(Clone, Copy, Debug)]
pub struct Latency {
    pub add: Cycle,
    pub mul: Cycle,
    pub evg: Cycle,
    pub modswitch: Cycle,
    pub resolve: Cycle,
    pub ntt_butterfly: Cycle,
    pub ntt_one_stage: Cycle,
    pub ntt: Cycle,
    pub transpose: Cycle,
    pub rot_one_stage: Cycle,
    pub rot: Cycle,
    pub bcu_read: Cycle,
    pub bcu_write: Cycle,
}

impl Latency {
    pub fn for_vec_depth(vec_depth: u64) -> Self {
        let add = 1;
        let mul = 5;

        let ntt_butterfly = 6;
        // One lane processes 256 elements per pass.
        let rot_one_stage = (256f64).log2() as Cycle;
        let ntt_one_stage = rot_one_stage * ntt_butterfly;
        let transpose = vec_depth + (vec_depth as f64).log2() as Cycle;

        // Base conversion reduces against 13 moduli via a multiply tree.
        let decomp_tree_depth = (13f64).log2().ceil() as Cycle;

        Self {
            add,
            mul,
            evg: 200,
            modswitch: 6 + vec_depth * 15,
            resolve: 9 + vec_depth * 15,
            ntt_butterfly,
            ntt_one_stage,
            ntt: ntt_one_stage + mul + transpose + ntt_one_stage,
            transpose,
            rot_one_stage,
            rot: 2 * (rot_one_stage + transpose),
            bcu_read: mul * decomp_tree_depth + vec_depth,
            bcu_write: 1,
        }
    }
}
