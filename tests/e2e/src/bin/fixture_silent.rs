//! Never reports its RPC address

use std::time::Duration;

fn main() -> anyhow::Result<()> {
    if e2e::metadata_requested() {
        return e2e::print_metadata(&e2e::misbehaving_metadata("fixture-silent"));
    }
    std::thread::sleep(Duration::from_secs(60));
    Ok(())
}
