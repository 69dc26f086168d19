//! Load a raw AArch64 shellcode buffer, list what rizin makes of it, and resolve a
//! few addresses inside it.
//!
//! Run with `RUST_LOG=rzview=debug` to see every engine command.

use anyhow::{Context, Result};
use rzview::logging::init_tracing;
use rzview::{ArchSpec, Session, SessionConfig, Source};

const ARM64_LINUX_SH: &str = "420002ca210080d2400080d2c81880d2010000d4e60300aa01020010020280d2\
681980d2010000d4410080d2420002cae00306aa080380d2010000d4210400f165ffff54e0000010420002ca\
210001caa81b80d2010000d4020004d27f0000012f62696e2f736800";

fn main() -> Result<()> {
    init_tracing();

    let code = hex::decode(ARM64_LINUX_SH).context("shellcode is not valid hex")?;
    let config = SessionConfig::default().with_arch(Some(ArchSpec::new("arm64", 64)));
    let session = Session::open(Source::Bytes(code), &config).context("failed to open rizin")?;

    println!("{}", session.cmd("o")?);
    println!("{}", session.cmd("pd 32")?);

    for (name, function) in session.functions()? {
        println!("{name} @ {:#x} ({} bytes)", function.offset, function.size);
    }
    for addr in [0x0u64, 0x14, 0x40] {
        match session.symbolize(addr) {
            Ok(symbolic) => println!("{addr:#06x} -> {symbolic}"),
            Err(e) => println!("{addr:#06x} -> unresolved ({e})"),
        }
    }

    session.close()?;
    Ok(())
}
