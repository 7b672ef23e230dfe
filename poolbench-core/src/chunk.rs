//! Adaptive chunk sizing for batched dispatch.

/// Number of chunks the sizer aims for, independent of input size.
pub const DEFAULT_TARGET_CHUNKS: usize = 1000;

/// Most inputs a single task may carry. At 8 bytes per input, and at most 8
/// per result, one chunk and its reply each fit in a 16 MiB frame.
pub const MAX_CHUNK_LEN: usize = 1 << 20;

/// Chunk size that splits `total_items` into roughly `target_chunks` chunks.
///
/// Returns `ceil(total_items / target_chunks)` clamped into `[1, total_items]`,
/// and 1 for an empty input. A `target_chunks` of 0 is treated as 1.
///
/// ```
/// use poolbench_core::auto_chunk_size;
///
/// assert_eq!(auto_chunk_size(2500, 1000), 3);
/// assert_eq!(auto_chunk_size(5, 1000), 1);
/// ```
pub fn auto_chunk_size(total_items: usize, target_chunks: usize) -> usize {
    if total_items == 0 {
        return 1;
    }

    total_items
        .div_ceil(target_chunks.max(1))
        .clamp(1, total_items)
}

/// Chunk size used by chunked dispatch: [`auto_chunk_size`] capped at
/// [`MAX_CHUNK_LEN`].
pub fn dispatch_chunk_size(total_items: usize, target_chunks: usize) -> usize {
    auto_chunk_size(total_items, target_chunks).min(MAX_CHUNK_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::Output;
    use poolbench_ipc::{MAX_FRAME_SIZE, PoolCommand, TaskRequest, WorkerMessage, encode_payload};

    #[test]
    fn test_reference_values() {
        assert_eq!(auto_chunk_size(0, DEFAULT_TARGET_CHUNKS), 1);
        assert_eq!(auto_chunk_size(5, DEFAULT_TARGET_CHUNKS), 1);
        assert_eq!(auto_chunk_size(1000, DEFAULT_TARGET_CHUNKS), 1);
        assert_eq!(auto_chunk_size(1001, DEFAULT_TARGET_CHUNKS), 2);
        assert_eq!(auto_chunk_size(10_000_000, DEFAULT_TARGET_CHUNKS), 10_000);
    }

    #[test]
    fn test_result_stays_in_bounds() {
        for target in [1, 2, 7, 1000, 5000] {
            for total in 0..3000 {
                let size = auto_chunk_size(total, target);
                assert!(size >= 1, "total={total} target={target}");
                assert!(size <= total.max(1), "total={total} target={target}");
            }
        }
    }

    #[test]
    fn test_non_decreasing_in_total() {
        for target in [1, 3, 1000] {
            let mut previous = auto_chunk_size(0, target);
            for total in 1..5000 {
                let size = auto_chunk_size(total, target);
                assert!(size >= previous, "total={total} target={target}");
                previous = size;
            }
        }
    }

    #[test]
    fn test_zero_target_does_not_divide_by_zero() {
        assert_eq!(auto_chunk_size(42, 0), 42);
    }

    #[test]
    fn test_partition_of_2500_items() {
        let inputs: Vec<u64> = (1..=2500).collect();
        let size = auto_chunk_size(inputs.len(), DEFAULT_TARGET_CHUNKS);
        let chunks: Vec<&[u64]> = inputs.chunks(size).collect();

        assert_eq!(size, 3);
        assert_eq!(chunks.len(), 834);
        assert!(chunks[..833].iter().all(|c| c.len() == 3));
        assert_eq!(chunks[833], &[2500]);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 2500);
    }

    #[test]
    fn test_dispatch_chunk_size_is_capped() {
        assert_eq!(dispatch_chunk_size(2500, DEFAULT_TARGET_CHUNKS), 3);
        assert_eq!(dispatch_chunk_size(3_000_000, 1), MAX_CHUNK_LEN);
        assert_eq!(dispatch_chunk_size(MAX_CHUNK_LEN, 1), MAX_CHUNK_LEN);
        assert_eq!(dispatch_chunk_size(0, 0), 1);
    }

    #[test]
    fn test_largest_chunk_fits_in_a_frame() {
        let request = PoolCommand::Run(TaskRequest {
            task_id: u64::MAX,
            computation: "fibonacci".to_string(),
            offset: u64::MAX,
            values: vec![u64::MAX; MAX_CHUNK_LEN],
        });
        assert!(encode_payload(&request).unwrap().len() < MAX_FRAME_SIZE);

        let reply = WorkerMessage::Complete {
            task_id: u64::MAX,
            payload: u64::encode(vec![u64::MAX; MAX_CHUNK_LEN]).unwrap(),
        };
        assert!(encode_payload(&reply).unwrap().len() < MAX_FRAME_SIZE);
    }
}
