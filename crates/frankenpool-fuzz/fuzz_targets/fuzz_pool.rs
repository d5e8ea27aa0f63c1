#![no_main]
use frankenpool_core::{Loan, Pool, PoolConfig, PoolLogLevel};
use libfuzzer_sys::fuzz_target;

type Slot = [u64; 2];

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size, then 3-byte ops: [op, arg_lo, arg_hi].
    let Some((&chunk, ops)) = data.split_first() else {
        return;
    };
    let config = PoolConfig::new()
        .with_chunk_size(usize::from(chunk % 64) + 1)
        .with_log_level(PoolLogLevel::Off);
    let Ok(mut pool) = Pool::<Slot>::with_config(config) else {
        return;
    };
    let mut live: Vec<Loan<Slot>> = Vec::new();

    for op in ops.chunks_exact(3) {
        let arg = usize::from(u16::from_le_bytes([op[1], op[2]]));
        match op[0] % 4 {
            0 => {
                if let Ok(mut loan) = pool.allocate(arg % 80) {
                    let tag = loan.addr() as u64;
                    loan.init_with(|i| [tag, i as u64]);
                    live.push(loan);
                }
            }
            1 => {
                if let Ok(loan) = pool.allocate_or_system(arg % 160 + 1) {
                    live.push(loan);
                }
            }
            2 | 3 if !live.is_empty() => {
                let loan = live.swap_remove(arg % live.len());
                pool.deallocate(loan);
            }
            _ => {}
        }
        if let Err(violation) = pool.check_invariants() {
            panic!("free list corrupted: {violation}");
        }
    }

    for loan in live {
        pool.deallocate(loan);
    }
    assert_eq!(pool.stats().lent_elements, 0);
    let _ = pool.teardown();
});
