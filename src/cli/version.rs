/// Display version information
pub fn execute() {
    println!("zkmpa {}", env!("CARGO_PKG_VERSION"));
    println!("Anonymous threshold approval for verifiable credentials");
}
