/*!
 * memtrack demo
 *
 * Walks through each allocation path against the process-wide tracker:
 * - Plain and tagged heap tracking
 * - Fixed-block pool usage
 * - Construction failure cleanup on the heap and pool paths
 * - A deliberate leak, reported at teardown
 */

use anyhow::{Context, Result};
use memtrack::memory::{self, AcquirePath, ConstructError, MemoryPool};
use memtrack::{init_tracing, install, MemoryConfig};
use tracing::{info, warn};

#[derive(Debug)]
struct Gadget {
    serial: u32,
}

impl Gadget {
    fn assemble(serial: u32) -> Result<Self, String> {
        if serial % 2 == 1 {
            return Err(format!("gadget {} failed inspection", serial));
        }
        Ok(Self { serial })
    }
}

fn basic_tracking() -> Result<()> {
    info!("== Basic tracking ==");
    let a = memory::acquire(256).context("plain acquisition")?;
    let b = memory::acquire_array(8, 32).context("array acquisition")?;
    info!(live_bytes = memory::total_live_bytes(), "Two allocations live");

    memory::release(a)?;
    memory::release(b)?;
    info!(live_bytes = memory::total_live_bytes(), "Both released");
    Ok(())
}

fn tagged_tracking() -> Result<()> {
    info!("== Tagged tracking ==");
    let tagged = memory::acquire_tagged(128, file!(), line!()).context("tagged acquisition")?;
    let here = memory::acquire_here(64).context("caller-tagged acquisition")?;
    info!(live_bytes = memory::total_live_bytes(), "Tagged allocations live");
    println!("{}", memory::leak_report());

    memory::release_tagged(tagged, file!(), line!())?;
    memory::release(here)?;
    Ok(())
}

fn pool_usage(config: &MemoryConfig) -> Result<()> {
    info!("== Memory pool ==");
    let pool = MemoryPool::new(64, 64 * 8).context("pool creation")?;

    let blocks = (0..5)
        .map(|_| memory::acquire_from_pool(&pool, 48))
        .collect::<Result<Vec<_>, _>>()?;
    let stats = pool.stats();
    info!(
        used = stats.used_bytes,
        free_blocks = stats.free_blocks,
        utilization = stats.utilization(),
        "Pool after five acquisitions"
    );

    if let Err(e) = memory::acquire_from_pool(&pool, 65) {
        warn!(error = %e, "Oversized pool request refused as expected");
    }

    for block in blocks {
        memory::release_to_pool(&pool, block)?;
    }
    let direct = pool.allocate()?;
    if let Err(e) = memory::release(direct) {
        warn!(error = %e, "Untracked block refused by the heap path as expected");
    }
    pool.deallocate(direct)?;

    let configured = MemoryPool::with_config(config).context("configured pool")?;
    info!(
        blocks = configured.block_count(),
        block_size = configured.block_size(),
        "Configured pool ready"
    );
    Ok(())
}

fn construction_failure() -> Result<()> {
    info!("== Construction failure ==");
    let before = memory::total_live_bytes();

    let heap_attempt = memory::construct(AcquirePath::here(), || Gadget::assemble(3));
    if let Err(ConstructError::Init(reason)) = &heap_attempt {
        info!(%reason, "Heap construction failed; storage returned");
    }

    let pool = MemoryPool::new(64, 64 * 4).context("pool creation")?;
    let pooled_attempt = memory::construct(AcquirePath::Pool(&pool), || Gadget::assemble(5));
    if let Err(e) = &pooled_attempt {
        info!(error = %e, pool_used = pool.used_bytes(), "Pool construction failed; block returned");
    }

    let gadget = memory::construct(AcquirePath::Pool(&pool), || Gadget::assemble(4))?;
    info!(serial = gadget.serial, address = gadget.address(), "Gadget assembled in pool");
    gadget.release()?;

    info!(
        before,
        after = memory::total_live_bytes(),
        "Live bytes unchanged across failed constructions"
    );
    Ok(())
}

fn intentional_leak() -> Result<()> {
    info!("== Intentional leak ==");
    let leaked = memory::acquire_tagged(100, file!(), line!())?;
    warn!(address = leaked.as_ptr() as usize, "Leaving 100 bytes unreleased");
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let teardown = install();
    let config = MemoryConfig::from_env();

    info!("memtrack demo starting");
    basic_tracking()?;
    tagged_tracking()?;
    pool_usage(&config)?;
    construction_failure()?;
    intentional_leak()?;
    info!("memtrack demo finished");

    if let Some(report) = teardown.finish() {
        println!("{}", report);
    }
    Ok(())
}
