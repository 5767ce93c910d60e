//! Dies before reporting its RPC address

fn main() -> anyhow::Result<()> {
    if e2e::metadata_requested() {
        return e2e::print_metadata(&e2e::misbehaving_metadata("fixture-crash"));
    }
    eprintln!("fixture-crash: giving up before the handshake");
    std::process::exit(e2e::CRASH_EXIT_CODE);
}
