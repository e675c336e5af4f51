use rayon::prelude::*;

use crate::backend::Queue;

/// Elements per scan block; one block is one work unit of the multi-block
/// pass, matching the launch granularity of the association-map build.
pub(crate) const SCAN_BLOCK: usize = 1024;

/// Multi-block exclusive prefix scan: `output[0] = 0`,
/// `output[k + 1] = input[0] + ... + input[k]`.
///
/// The threaded path scans each block independently, scans the per-block
/// totals, then folds the carries back in. The serial path degenerates to a
/// running sum over the same block structure.
pub(crate) fn exclusive_scan_into(queue: &Queue, input: &[i32], output: &mut [i32]) {
    assert_eq!(output.len(), input.len() + 1);
    output[0] = 0;
    if input.is_empty() {
        return;
    }

    match queue {
        Queue::Serial => {
            let mut running = 0i32;
            for (slot, &value) in output[1..].iter_mut().zip(input) {
                running += value;
                *slot = running;
            }
        }
        Queue::Threaded(pool) => pool.install(|| {
            let n_blocks = input.len().div_ceil(SCAN_BLOCK);
            let mut block_sums = vec![0i32; n_blocks];

            output[1..]
                .par_chunks_mut(SCAN_BLOCK)
                .zip(input.par_chunks(SCAN_BLOCK))
                .zip(block_sums.par_iter_mut())
                .for_each(|((out_block, in_block), total)| {
                    let mut running = 0i32;
                    for (slot, &value) in out_block.iter_mut().zip(in_block) {
                        running += value;
                        *slot = running;
                    }
                    *total = running;
                });

            // Exclusive scan of the block totals; cheap, one entry per block.
            let mut carry = 0i32;
            for total in block_sums.iter_mut() {
                let sum = *total;
                *total = carry;
                carry += sum;
            }

            output[1..]
                .par_chunks_mut(SCAN_BLOCK)
                .zip(block_sums.par_iter())
                .for_each(|(out_block, &carry)| {
                    if carry != 0 {
                        for slot in out_block.iter_mut() {
                            *slot += carry;
                        }
                    }
                });
        }),
        Queue::Gpu(_) => unreachable!("host scan invoked on a GPU queue"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(input: &[i32]) -> Vec<i32> {
        let mut out = vec![0i32; input.len() + 1];
        for (i, &v) in input.iter().enumerate() {
            out[i + 1] = out[i] + v;
        }
        out
    }

    #[test]
    fn test_serial_scan_small() {
        let input = [3, 0, 5, 1, 2];
        let mut output = vec![0i32; input.len() + 1];
        exclusive_scan_into(&Queue::serial(), &input, &mut output);
        assert_eq!(output, reference(&input));
    }

    #[test]
    fn test_threaded_scan_matches_serial_across_block_boundary() {
        let input: Vec<i32> = (0..SCAN_BLOCK as i32 * 3 + 17).map(|i| i % 7).collect();
        let mut output = vec![0i32; input.len() + 1];
        let queue = Queue::threaded(4).unwrap();
        exclusive_scan_into(&queue, &input, &mut output);
        assert_eq!(output, reference(&input));
    }

    #[test]
    fn test_scan_empty() {
        let mut output = vec![0i32; 1];
        exclusive_scan_into(&Queue::serial(), &[], &mut output);
        assert_eq!(output, vec![0]);
    }
}
